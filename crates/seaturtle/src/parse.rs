use std::rc::Rc;

use crate::{
    ast::{
        BoolExpr, Cmp, Expr, ExprKind, Op, PrintArg, Span, Statement, StatementKind,
        StatementList, UnaryOp,
    },
    token::{Token, TokenKind},
};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{explanation} (found {})", .token.kind)]
pub struct ParseError {
    pub explanation: String,
    /// The token at which parsing failed. At end of input this is the `Eof` token.
    pub token: Token,
}

impl ParseError {
    pub fn span(&self) -> Span {
        self.token.span
    }
}

type ParseResult<T> = Result<T, ParseError>;

/// How deeply expressions and blocks may nest. Parentheses, negations, binary operators and
/// `sub`/`repeat`/`if` blocks each count as one level.
pub const MAX_NESTING: usize = 100;

/// A recursive-descent parser over a token stream.
pub struct Parser {
    // Invariant: this is non-empty and its last element is `Eof`.
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Parser {
        if tokens.last().map(|t| &t.kind) != Some(&TokenKind::Eof) {
            let end = tokens.last().map_or(0, |t| t.span.end);
            tokens.push(Token {
                kind: TokenKind::Eof,
                span: Span::at(end),
            });
        }
        Parser {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// Parse a whole program. Every token up to the end of input must belong to a statement.
    pub fn parse(mut self) -> ParseResult<StatementList> {
        let statements = self.statement_list()?;
        if self.peek() != &TokenKind::Eof {
            return Err(self.error("expected a statement"));
        }
        Ok(statements)
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek(&self) -> &TokenKind {
        &self.current().kind
    }

    /// Consume the current token. Never moves past `Eof`.
    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, explanation: impl Into<String>) -> ParseError {
        ParseError {
            explanation: explanation.into(),
            token: self.current().clone(),
        }
    }

    fn enter(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error("nested too deeply"));
        }
        Ok(())
    }

    fn expect(&mut self, kind: TokenKind, explanation: &str) -> ParseResult<Token> {
        if self.peek() == &kind {
            Ok(self.advance())
        } else {
            Err(self.error(explanation))
        }
    }

    fn name(&mut self, after: &Token) -> ParseResult<(String, Span)> {
        match self.peek() {
            TokenKind::Name(name) => {
                let name = name.clone();
                let span = self.advance().span;
                Ok((name, span))
            }
            _ => Err(self.error(format!("expected a name after {}", after.kind))),
        }
    }

    /// A number, a variable, a parenthesized expression or a negation.
    fn point(&mut self) -> ParseResult<Expr> {
        match self.peek().clone() {
            TokenKind::Num(x) => Ok(Expr {
                e: ExprKind::Num(x),
                span: self.advance().span,
            }),
            TokenKind::Name(name) => Ok(Expr {
                e: ExprKind::Var(name),
                span: self.advance().span,
            }),
            TokenKind::LParen => {
                let open = self.advance();
                self.enter()?;
                let inner = self.expression()?;
                let close = self.expect(TokenKind::RParen, "expected `)`")?;
                self.depth -= 1;
                Ok(Expr {
                    e: inner.e,
                    span: open.span.union(close.span),
                })
            }
            TokenKind::Minus => {
                let minus = self.advance();
                self.enter()?;
                let operand = self.point()?;
                self.depth -= 1;
                let span = minus.span.union(operand.span);
                Ok(Expr {
                    e: ExprKind::Unary(UnaryOp::Neg, Box::new(operand)),
                    span,
                })
            }
            _ => Err(self.error("expected a number, a variable, `(` or `-`")),
        }
    }

    fn binary(op: Op, lhs: Expr, rhs: Expr) -> Expr {
        let span = lhs.span.union(rhs.span);
        Expr {
            e: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
            span,
        }
    }

    // `^` is right-associative, so the right hand side recurses into `factor`.
    fn factor(&mut self) -> ParseResult<Expr> {
        let lhs = self.point()?;
        if self.peek() == &TokenKind::Caret {
            self.advance();
            self.enter()?;
            let rhs = self.factor()?;
            self.depth -= 1;
            return Ok(Self::binary(Op::Pow, lhs, rhs));
        }
        Ok(lhs)
    }

    // Left-associative chains build a tree as deep as the chain is long, so every operator
    // in the chain counts as a level of nesting.
    fn term(&mut self) -> ParseResult<Expr> {
        let depth = self.depth;
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => Op::Mul,
                TokenKind::Slash => Op::Div,
                _ => break,
            };
            self.advance();
            self.enter()?;
            let rhs = self.factor()?;
            lhs = Self::binary(op, lhs, rhs);
        }
        self.depth = depth;
        Ok(lhs)
    }

    pub(crate) fn expression(&mut self) -> ParseResult<Expr> {
        let depth = self.depth;
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => Op::Add,
                TokenKind::Minus => Op::Sub,
                _ => break,
            };
            self.advance();
            self.enter()?;
            let rhs = self.term()?;
            lhs = Self::binary(op, lhs, rhs);
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn bool_expr(&mut self) -> ParseResult<BoolExpr> {
        let lhs = self.expression()?;
        let op = match self.peek() {
            TokenKind::Eq => Cmp::Eq,
            TokenKind::NotEq => Cmp::NotEq,
            TokenKind::Lt => Cmp::Lt,
            TokenKind::Le => Cmp::Le,
            TokenKind::Gt => Cmp::Gt,
            TokenKind::Ge => Cmp::Ge,
            _ => return Err(self.error("expected a comparison (=, !=, <, <=, >, >=)")),
        };
        self.advance();
        let rhs = self.expression()?;
        let span = lhs.span.union(rhs.span);
        Ok(BoolExpr { op, lhs, rhs, span })
    }

    /// Parse the statements of a block and its closing `end`.
    fn block(&mut self, opener: &Token) -> ParseResult<(StatementList, Span)> {
        self.enter()?;
        let body = self.statement_list()?;
        let end = self.expect(
            TokenKind::End,
            &format!("expected `end` to close {}", opener.kind),
        )?;
        self.depth -= 1;
        Ok((body, end.span))
    }

    /// Parse one statement, or return `None` if the current token can't start one.
    fn statement(&mut self) -> ParseResult<Option<Statement>> {
        let start = self.current().clone();
        let (s, end) = match &start.kind {
            TokenKind::Sub => {
                self.advance();
                let (name, _) = self.name(&start)?;
                let (body, end) = self.block(&start)?;
                let body = Rc::new(body);
                (StatementKind::Sub { name, body }, end)
            }
            TokenKind::Call => {
                self.advance();
                let (name, end) = self.name(&start)?;
                (StatementKind::Call { name }, end)
            }
            TokenKind::Set => {
                self.advance();
                let (name, _) = self.name(&start)?;
                let value = self.expression()?;
                let end = value.span;
                (StatementKind::Set { name, value }, end)
            }
            TokenKind::Repeat => {
                self.advance();
                let times = self.expression()?;
                let (body, end) = self.block(&start)?;
                (StatementKind::Repeat { times, body }, end)
            }
            TokenKind::If => {
                self.advance();
                let cond = self.bool_expr()?;
                let (body, end) = self.block(&start)?;
                (StatementKind::If { cond, body }, end)
            }
            TokenKind::Left | TokenKind::Right => {
                let negate = start.kind == TokenKind::Right;
                self.advance();
                let angle = self.expression()?;
                let end = angle.span;
                (StatementKind::Turn { angle, negate }, end)
            }
            TokenKind::Forward | TokenKind::Backward => {
                let negate = start.kind == TokenKind::Backward;
                self.advance();
                let distance = self.expression()?;
                let end = distance.span;
                (StatementKind::Move { distance, negate }, end)
            }
            TokenKind::PenUp | TokenKind::PenDown => {
                let down = start.kind == TokenKind::PenDown;
                (StatementKind::Pen { down }, self.advance().span)
            }
            TokenKind::Home => (StatementKind::Home, self.advance().span),
            TokenKind::Color => {
                self.advance();
                let index = self.expression()?;
                let end = index.span;
                (StatementKind::Color { index }, end)
            }
            TokenKind::Print => {
                self.advance();
                if let TokenKind::Str(literal) = self.peek() {
                    let literal = literal.clone();
                    let end = self.advance().span;
                    (StatementKind::Print(PrintArg::Literal(literal)), end)
                } else {
                    let e = self.expression()?;
                    let end = e.span;
                    (StatementKind::Print(PrintArg::Expr(e)), end)
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(Statement {
            s,
            span: start.span.union(end),
        }))
    }

    fn statement_list(&mut self) -> ParseResult<StatementList> {
        let mut statements = Vec::new();
        while let Some(statement) = self.statement()? {
            statements.push(statement);
        }
        Ok(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ast::display_list, token::tokenize};

    fn parse(src: &str) -> ParseResult<StatementList> {
        Parser::new(tokenize(src).unwrap()).parse()
    }

    fn parse_expr(src: &str) -> Expr {
        let mut parser = Parser::new(tokenize(src).unwrap());
        let e = parser.expression().unwrap();
        assert_eq!(parser.peek(), &TokenKind::Eof);
        e
    }

    fn erase_expr(e: &mut Expr) {
        e.span = Span::default();
        match &mut e.e {
            ExprKind::Num(_) | ExprKind::Var(_) => {}
            ExprKind::Unary(_, operand) => erase_expr(operand),
            ExprKind::Binary(_, lhs, rhs) => {
                erase_expr(lhs);
                erase_expr(rhs);
            }
        }
    }

    fn erase(statements: &mut [Statement]) {
        for st in statements {
            st.span = Span::default();
            match &mut st.s {
                StatementKind::Sub { body, .. } => {
                    let mut inner = body.as_ref().clone();
                    erase(&mut inner);
                    *body = Rc::new(inner);
                }
                StatementKind::Repeat { times, body } => {
                    erase_expr(times);
                    erase(body);
                }
                StatementKind::If { cond, body } => {
                    cond.span = Span::default();
                    erase_expr(&mut cond.lhs);
                    erase_expr(&mut cond.rhs);
                    erase(body);
                }
                StatementKind::Turn { angle: e, .. }
                | StatementKind::Move { distance: e, .. }
                | StatementKind::Color { index: e }
                | StatementKind::Set { value: e, .. }
                | StatementKind::Print(PrintArg::Expr(e)) => erase_expr(e),
                StatementKind::Call { .. }
                | StatementKind::Home
                | StatementKind::Pen { .. }
                | StatementKind::Print(PrintArg::Literal(_)) => {}
            }
        }
    }

    fn num(x: i64) -> Expr {
        Expr {
            e: ExprKind::Num(x),
            span: Span::default(),
        }
    }

    fn stmt(s: StatementKind) -> Statement {
        Statement {
            s,
            span: Span::default(),
        }
    }

    #[test]
    fn forward_and_backward() {
        let mut prog = parse("forward 10 backward 10").unwrap();
        assert_eq!(prog[0].span, Span::new(0, 10));
        erase(&mut prog);
        assert_eq!(
            prog,
            vec![
                stmt(StatementKind::Move {
                    distance: num(10),
                    negate: false
                }),
                stmt(StatementKind::Move {
                    distance: num(10),
                    negate: true
                }),
            ]
        );
    }

    #[test]
    fn repeat_block() {
        let src = "repeat 3 forward 10 right 90 end";
        let mut prog = parse(src).unwrap();
        assert_eq!(prog.len(), 1);
        assert_eq!(prog[0].span, Span::new(0, src.len()));
        erase(&mut prog);
        assert_eq!(
            prog[0],
            stmt(StatementKind::Repeat {
                times: num(3),
                body: vec![
                    stmt(StatementKind::Move {
                        distance: num(10),
                        negate: false
                    }),
                    stmt(StatementKind::Turn {
                        angle: num(90),
                        negate: true
                    }),
                ],
            })
        );
    }

    #[test]
    fn precedence() {
        let e = parse_expr("1 + 2 * 3 ^ 2 ^ 2");
        assert_eq!(e.to_string(), "1 + (2 * (3 ^ (2 ^ 2)))");
        assert_eq!(e.span, Span::new(0, 17));

        let e = parse_expr("8 - 4 - 2");
        assert_eq!(e.to_string(), "(8 - 4) - 2");

        let e = parse_expr("-2 ^ 2");
        assert_eq!(e.to_string(), "-2 ^ 2");
        let ExprKind::Binary(Op::Pow, lhs, _) = &e.e else {
            panic!("expected a power, got {e:?}");
        };
        assert!(matches!(lhs.e, ExprKind::Unary(UnaryOp::Neg, _)));
    }

    #[test]
    fn parenthesized_span_includes_parens() {
        let e = parse_expr("(1 + 2) * x");
        let ExprKind::Binary(Op::Mul, lhs, rhs) = &e.e else {
            panic!("expected a product, got {e:?}");
        };
        assert_eq!(lhs.span, Span::new(0, 7));
        assert_eq!(rhs.span, Span::new(10, 11));
        assert_eq!(e.span, Span::new(0, 11));
    }

    #[test]
    fn sub_without_name() {
        let err = parse("sub").unwrap_err();
        assert_eq!(err.token.kind, TokenKind::Eof);
        assert_eq!(err.span(), Span::at(3));

        let err = parse("sub 5 forward 1 end").unwrap_err();
        assert_eq!(err.token.kind, TokenKind::Num(5));
    }

    #[test]
    fn call_and_set_need_names() {
        let err = parse("call forward").unwrap_err();
        assert_eq!(err.token.kind, TokenKind::Forward);
        let err = parse("set 3 4").unwrap_err();
        assert_eq!(err.token.kind, TokenKind::Num(3));
    }

    #[test]
    fn missing_end() {
        let err = parse("repeat 4 forward 10").unwrap_err();
        assert_eq!(err.token.kind, TokenKind::Eof);
        assert!(err.explanation.contains("`repeat`"));

        let err = parse("if x > 1 home").unwrap_err();
        assert_eq!(err.token.kind, TokenKind::Eof);
    }

    #[test]
    fn unmatched_paren() {
        let err = parse("forward (1 + 2").unwrap_err();
        assert_eq!(err.token.kind, TokenKind::Eof);
        let err = parse("forward 1 + 2)").unwrap_err();
        assert_eq!(err.token.kind, TokenKind::RParen);
    }

    #[test]
    fn missing_operand() {
        let err = parse("forward 1 +").unwrap_err();
        assert_eq!(err.token.kind, TokenKind::Eof);
        let err = parse("left * 3").unwrap_err();
        assert_eq!(err.token.kind, TokenKind::Star);
    }

    #[test]
    fn stray_end_is_an_error() {
        let err = parse("home end").unwrap_err();
        assert_eq!(err.token.kind, TokenKind::End);
        assert_eq!(err.span(), Span::new(5, 8));
    }

    #[test]
    fn comparisons_do_not_chain() {
        let err = parse("if 1 < 2 < 3 home end").unwrap_err();
        assert_eq!(err.token.kind, TokenKind::Lt);
        let err = parse("if 1 home end").unwrap_err();
        assert_eq!(err.token.kind, TokenKind::Home);
    }

    #[test]
    fn print_forms() {
        let mut prog = parse("print \"x is $x\" print x * 2").unwrap();
        erase(&mut prog);
        assert_eq!(
            prog[0].s,
            StatementKind::Print(PrintArg::Literal("x is $x".to_owned()))
        );
        assert!(matches!(
            prog[1].s,
            StatementKind::Print(PrintArg::Expr(Expr {
                e: ExprKind::Binary(Op::Mul, ..),
                ..
            }))
        ));
    }

    #[test]
    fn nested_spans() {
        let src = "sub SQ\n  repeat 4\n    forward 10\n  end\nend\ncall SQ";
        let prog = parse(src).unwrap();
        assert_eq!(prog[0].span.slice(src), &src[..src.find("\ncall").unwrap()]);
        assert_eq!(prog[1].span.slice(src), "call SQ");
        let StatementKind::Sub { body, .. } = &prog[0].s else {
            panic!("expected a sub");
        };
        assert_eq!(body[0].span.slice(src), "repeat 4\n    forward 10\n  end");
    }

    #[test]
    fn pretty_printed_source_reparses() {
        let src = "SUB square REPEAT 4 FORWARD (size + 2) * -3 RIGHT 90 END END \
                   set size 10 ^ 2 ^ 1 - 4 / 2 \
                   if size >= 3 call square penup home pendown color 2 end \
                   print \"size is $size\" print -(size) left 45 backward 1";
        let mut original = parse(src).unwrap();
        let printed = display_list(&original);
        let mut reparsed = parse(&printed).unwrap();
        erase(&mut original);
        erase(&mut reparsed);
        assert_eq!(original, reparsed);
    }

    fn assert_too_deep(src: &str) {
        let err = parse(src).unwrap_err();
        assert_eq!(err.explanation, "nested too deeply", "while parsing {src:.40}...");
    }

    #[test]
    fn deep_nesting_is_an_error() {
        let n = 50_000;
        assert_too_deep(&format!("forward {}1{}", "(".repeat(n), ")".repeat(n)));
        assert_too_deep(&format!("forward {}1", "-".repeat(n)));
        assert_too_deep(&format!("forward 2{}", " ^ 2".repeat(n)));
        assert_too_deep(&format!("forward 1{}", " + 1".repeat(n)));
        assert_too_deep(&format!("{}home{}", "repeat 1 ".repeat(n), " end".repeat(n)));
        assert_too_deep(&format!("{}home{}", "if 1 = 1 ".repeat(n), " end".repeat(n)));
    }

    #[test]
    fn nesting_up_to_the_limit() {
        let n = MAX_NESTING;
        parse(&format!("forward {}1{}", "(".repeat(n), ")".repeat(n))).unwrap();
        assert_too_deep(&format!("forward {}1{}", "(".repeat(n + 1), ")".repeat(n + 1)));

        parse(&format!("{}home{}", "repeat 1 ".repeat(n), " end".repeat(n))).unwrap();
        assert_too_deep(&format!("{}home{}", "repeat 1 ".repeat(n + 1), " end".repeat(n + 1)));

        // Siblings don't add up: only the depth of each one counts.
        let inner = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        parse(&format!("forward {inner} + {inner} * {inner}")).unwrap();
        let src = "repeat 1 home end\n".repeat(1000);
        assert_eq!(parse(&src).unwrap().len(), 1000);
    }

    #[test]
    fn missing_eof_is_added() {
        assert_eq!(Parser::new(vec![]).parse(), Ok(vec![]));

        let mut tokens = tokenize("sub").unwrap();
        assert_eq!(tokens.pop().map(|t| t.kind), Some(TokenKind::Eof));
        let err = Parser::new(tokens).parse().unwrap_err();
        assert_eq!(err.token.kind, TokenKind::Eof);
        assert_eq!(err.span(), Span::at(3));
    }
}
