use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while},
    character::complete::{char, digit1, multispace1, satisfy},
    combinator::{consumed, map, map_opt, map_res, recognize, value},
    sequence::{delimited, pair},
    IResult,
};

use crate::ast::Span;

pub type Input<'a> = nom_locate::LocatedSpan<&'a str>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Sub,
    End,
    Call,
    Set,
    Repeat,
    Left,
    Right,
    Forward,
    Backward,
    PenUp,
    PenDown,
    Home,
    Color,
    If,
    Print,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Name(String),
    Num(i64),
    Str(String),
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Sub => "sub",
            TokenKind::End => "end",
            TokenKind::Call => "call",
            TokenKind::Set => "set",
            TokenKind::Repeat => "repeat",
            TokenKind::Left => "left",
            TokenKind::Right => "right",
            TokenKind::Forward => "forward",
            TokenKind::Backward => "backward",
            TokenKind::PenUp => "penup",
            TokenKind::PenDown => "pendown",
            TokenKind::Home => "home",
            TokenKind::Color => "color",
            TokenKind::If => "if",
            TokenKind::Print => "print",
            TokenKind::Eq => "=",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Caret => "^",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Name(name) => return write!(f, "`{name}`"),
            TokenKind::Num(x) => return write!(f, "{x}"),
            TokenKind::Str(s) => return write!(f, "\"{s}\""),
            TokenKind::Eof => return f.write_str("end of input"),
        };
        write!(f, "`{s}`")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TokenizerError {
    #[error("unexpected symbol on line {line}: {context}")]
    UnexpectedSymbol {
        line: u32,
        /// The rest of the offending line.
        context: String,
        span: Span,
    },
}

impl TokenizerError {
    fn unexpected(input: Input) -> TokenizerError {
        let context = input
            .fragment()
            .split('\n')
            .next()
            .unwrap_or_default()
            .trim_end_matches('\r');
        let start = input.location_offset();
        TokenizerError::UnexpectedSymbol {
            line: input.location_line(),
            context: context.to_owned(),
            span: Span::new(start, start + context.len()),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            TokenizerError::UnexpectedSymbol { span, .. } => *span,
        }
    }
}

/// A lexical rule. Rules that return `None` consume their input without producing a token.
type Lex = fn(Input<'_>) -> IResult<Input<'_>, Option<TokenKind>>;

#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    lex: Lex,
}

impl Rule {
    fn new(name: &'static str, lex: Lex) -> Rule {
        Rule { name, lex }
    }
}

fn comment(input: Input) -> IResult<Input, Option<TokenKind>> {
    value(None, pair(char(';'), take_till(|c: char| c == '\n')))(input)
}

fn whitespace(input: Input) -> IResult<Input, Option<TokenKind>> {
    value(None, multispace1)(input)
}

fn word(input: Input) -> IResult<Input, Input> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic()),
        take_while(|c: char| c.is_ascii_alphanumeric()),
    ))(input)
}

fn keyword_kind(word: &str) -> Option<TokenKind> {
    Some(match word.to_ascii_lowercase().as_str() {
        "sub" => TokenKind::Sub,
        "repeat" => TokenKind::Repeat,
        "end" => TokenKind::End,
        "call" => TokenKind::Call,
        "set" => TokenKind::Set,
        "left" => TokenKind::Left,
        "right" => TokenKind::Right,
        "forward" => TokenKind::Forward,
        "backward" => TokenKind::Backward,
        "penup" => TokenKind::PenUp,
        "pendown" => TokenKind::PenDown,
        "home" => TokenKind::Home,
        "color" => TokenKind::Color,
        "if" => TokenKind::If,
        "print" => TokenKind::Print,
        _ => return None,
    })
}

// Keywords consume a whole word, so `subway` is left for the identifier rule.
fn keyword(input: Input) -> IResult<Input, Option<TokenKind>> {
    map_opt(word, |w: Input| keyword_kind(w.fragment()).map(Some))(input)
}

fn comparison(input: Input) -> IResult<Input, Option<TokenKind>> {
    map(
        alt((
            value(TokenKind::NotEq, tag("!=")),
            value(TokenKind::Le, tag("<=")),
            value(TokenKind::Ge, tag(">=")),
            value(TokenKind::Eq, tag("=")),
            value(TokenKind::Lt, tag("<")),
            value(TokenKind::Gt, tag(">")),
        )),
        Some,
    )(input)
}

fn operator(input: Input) -> IResult<Input, Option<TokenKind>> {
    map(
        alt((
            value(TokenKind::Plus, char('+')),
            value(TokenKind::Minus, char('-')),
            value(TokenKind::Star, char('*')),
            value(TokenKind::Slash, char('/')),
            value(TokenKind::Caret, char('^')),
            value(TokenKind::LParen, char('(')),
            value(TokenKind::RParen, char(')')),
        )),
        Some,
    )(input)
}

fn string(input: Input) -> IResult<Input, Option<TokenKind>> {
    map(
        delimited(char('"'), take_till(|c: char| c == '"' || c == '\n'), char('"')),
        |s: Input| Some(TokenKind::Str(s.fragment().to_string())),
    )(input)
}

fn identifier(input: Input) -> IResult<Input, Option<TokenKind>> {
    map(word, |w: Input| Some(TokenKind::Name(w.fragment().to_string())))(input)
}

// A leading `-` never gets here: the operator rule claims it first.
fn number(input: Input) -> IResult<Input, Option<TokenKind>> {
    map_res(digit1, |d: Input| {
        d.fragment().parse::<i64>().map(|x| Some(TokenKind::Num(x)))
    })(input)
}

/// Splits source text into tokens.
///
/// The tokenizer owns an ordered table of lexical rules. At each position the rules are tried in
/// order and the first one that matches consumes its input.
pub struct Tokenizer {
    rules: Vec<Rule>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        let rule = Rule::new;
        Tokenizer {
            rules: vec![
                rule("comment", comment),
                rule("whitespace", whitespace),
                rule("keyword", keyword),
                rule("comparison", comparison),
                rule("operator", operator),
                rule("string", string),
                rule("identifier", identifier),
                rule("number", number),
            ],
        }
    }
}

impl Tokenizer {
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Tokenize `text`. On success the last token is always [`TokenKind::Eof`].
    pub fn tokenize(&self, text: &str) -> Result<Vec<Token>, TokenizerError> {
        let mut input = Input::new(text);
        let mut tokens = Vec::new();

        while !input.fragment().is_empty() {
            let Some((rest, (matched, kind))) = self
                .rules
                .iter()
                .find_map(|rule| consumed(rule.lex)(input).ok())
            else {
                return Err(TokenizerError::unexpected(input));
            };

            if let Some(kind) = kind {
                let token = Token {
                    kind,
                    span: matched.into(),
                };
                log::trace!("token {:?} at {:?}", token.kind, token.span);
                tokens.push(token);
            }
            input = rest;
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            span: Span::at(text.len()),
        });
        Ok(tokens)
    }
}

pub fn tokenize(text: &str) -> Result<Vec<Token>, TokenizerError> {
    Tokenizer::default().tokenize(text)
}
