//! A tokenizer, parser and tree-walking interpreter for SeaTurtle, a small language for turtle
//! graphics.
//!
//! ```text
//! sub square
//!   repeat 4 forward size right 90 end
//! end
//! set size 50
//! call square
//! print "size was $size"
//! ```
//!
//! Running a program sends a sequence of events (turns, moves, pen changes, ...) to a
//! [`TurtlePlayer`], which decides what to do with them.

pub mod ast;
pub mod interp;
pub mod parse;
pub mod token;

pub use ast::{Expr, Span, Statement, StatementList};
pub use interp::{interpret, Env, Event, Recorder, RuntimeError, TurtlePlayer};
pub use parse::{ParseError, Parser};
pub use token::{tokenize, Token, TokenKind, Tokenizer, TokenizerError};

/// Anything that can go wrong between reading a script and finishing its run.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Tokenize(#[from] TokenizerError),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
}

impl Error {
    /// The part of the source that the error is about.
    pub fn span(&self) -> Span {
        match self {
            Error::Tokenize(e) => e.span(),
            Error::Parse(e) => e.span(),
            Error::Runtime(e) => e.span(),
        }
    }

    /// The 1-based line and column at which the error starts.
    pub fn location(&self, source: &str) -> (u32, usize) {
        self.span().location(source)
    }
}

/// Tokenize and parse `source`.
pub fn parse(source: &str) -> Result<StatementList, Error> {
    let tokens = tokenize(source)?;
    Ok(Parser::new(tokens).parse()?)
}

/// Parse `source` and run it on `player`.
///
/// The player's environment is not cleared first.
pub fn run<P: TurtlePlayer + ?Sized>(source: &str, player: &mut P) -> Result<(), Error> {
    let program = parse(source)?;
    interpret(player, &program)?;
    Ok(())
}
