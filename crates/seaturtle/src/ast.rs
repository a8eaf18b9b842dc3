use std::{fmt, rc::Rc};

/// A half-open byte range into the source text.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Span {
        Span { start, end }
    }

    /// An empty span sitting at `offset`.
    pub fn at(offset: usize) -> Span {
        Span {
            start: offset,
            end: offset,
        }
    }

    pub fn union(&self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The text covered by this span, or the empty string if the span doesn't fit in `source`.
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }

    /// The 1-based line and column of the start of this span.
    pub fn location(&self, source: &str) -> (u32, usize) {
        let before = source.get(..self.start).unwrap_or(source);
        let line = before.matches('\n').count() as u32 + 1;
        let column = before.rfind('\n').map_or(before.len(), |nl| before.len() - nl - 1) + 1;
        (line, column)
    }

    pub fn line(&self, source: &str) -> u32 {
        self.location(source).0
    }
}

impl From<crate::token::Input<'_>> for Span {
    fn from(sp: crate::token::Input) -> Self {
        Span {
            start: sp.location_offset(),
            end: sp.location_offset() + sp.fragment().len(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Pow => "^",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    Neg,
}

/// The six comparisons allowed in an `if` condition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Cmp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cmp {
    pub fn name(&self) -> &'static str {
        match self {
            Cmp::Eq => "=",
            Cmp::NotEq => "!=",
            Cmp::Lt => "<",
            Cmp::Le => "<=",
            Cmp::Gt => ">",
            Cmp::Ge => ">=",
        }
    }

    pub fn apply(&self, lhs: i64, rhs: i64) -> bool {
        match self {
            Cmp::Eq => lhs == rhs,
            Cmp::NotEq => lhs != rhs,
            Cmp::Lt => lhs < rhs,
            Cmp::Le => lhs <= rhs,
            Cmp::Gt => lhs > rhs,
            Cmp::Ge => lhs >= rhs,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Num(i64),
    /// A bare identifier, referring to a variable.
    Var(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub e: ExprKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoolExpr {
    pub op: Cmp,
    pub lhs: Expr,
    pub rhs: Expr,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PrintArg {
    Expr(Expr),
    /// A quoted string, possibly containing `$name` interpolations.
    Literal(String),
}

pub type StatementList = Vec<Statement>;

#[derive(Clone, Debug, PartialEq)]
pub enum StatementKind {
    Sub {
        name: String,
        body: Rc<StatementList>,
    },
    Call {
        name: String,
    },
    Repeat {
        times: Expr,
        body: StatementList,
    },
    /// `left` has `negate == false`, `right` has `negate == true`.
    Turn {
        angle: Expr,
        negate: bool,
    },
    /// `forward` has `negate == false`, `backward` has `negate == true`.
    Move {
        distance: Expr,
        negate: bool,
    },
    Home,
    Pen {
        down: bool,
    },
    Color {
        index: Expr,
    },
    Set {
        name: String,
        value: Expr,
    },
    Print(PrintArg),
    If {
        cond: BoolExpr,
        body: StatementList,
    },
}

impl StatementKind {
    /// The keyword that introduces this kind of statement.
    pub fn keyword(&self) -> &'static str {
        match self {
            StatementKind::Sub { .. } => "sub",
            StatementKind::Call { .. } => "call",
            StatementKind::Repeat { .. } => "repeat",
            StatementKind::Turn { negate: false, .. } => "left",
            StatementKind::Turn { negate: true, .. } => "right",
            StatementKind::Move { negate: false, .. } => "forward",
            StatementKind::Move { negate: true, .. } => "backward",
            StatementKind::Home => "home",
            StatementKind::Pen { down: true } => "pendown",
            StatementKind::Pen { down: false } => "penup",
            StatementKind::Color { .. } => "color",
            StatementKind::Set { .. } => "set",
            StatementKind::Print(_) => "print",
            StatementKind::If { .. } => "if",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub s: StatementKind,
    pub span: Span,
}

impl Expr {
    fn is_binary(&self) -> bool {
        matches!(self.e, ExprKind::Binary(..))
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_binary() {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.e {
            ExprKind::Num(x) => write!(f, "{x}"),
            ExprKind::Var(name) => f.write_str(name),
            ExprKind::Unary(UnaryOp::Neg, operand) => {
                f.write_str("-")?;
                operand.fmt_operand(f)
            }
            ExprKind::Binary(op, lhs, rhs) => {
                lhs.fmt_operand(f)?;
                write!(f, " {} ", op.name())?;
                rhs.fmt_operand(f)
            }
        }
    }
}

impl fmt::Display for BoolExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op.name(), self.rhs)
    }
}

fn fmt_block(f: &mut fmt::Formatter<'_>, body: &[Statement]) -> fmt::Result {
    for statement in body {
        write!(f, " {statement}")?;
    }
    f.write_str(" end")
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.s {
            StatementKind::Sub { name, body } => {
                write!(f, "sub {name}")?;
                fmt_block(f, body)
            }
            StatementKind::Call { name } => write!(f, "call {name}"),
            StatementKind::Repeat { times, body } => {
                write!(f, "repeat {times}")?;
                fmt_block(f, body)
            }
            StatementKind::Turn { angle, negate } => {
                let dir = if *negate { "right" } else { "left" };
                write!(f, "{dir} {angle}")
            }
            StatementKind::Move { distance, negate } => {
                let dir = if *negate { "backward" } else { "forward" };
                write!(f, "{dir} {distance}")
            }
            StatementKind::Home => f.write_str("home"),
            StatementKind::Pen { down: true } => f.write_str("pendown"),
            StatementKind::Pen { down: false } => f.write_str("penup"),
            StatementKind::Color { index } => write!(f, "color {index}"),
            StatementKind::Set { name, value } => write!(f, "set {name} {value}"),
            StatementKind::Print(PrintArg::Expr(e)) => write!(f, "print {e}"),
            StatementKind::Print(PrintArg::Literal(s)) => write!(f, "print \"{s}\""),
            StatementKind::If { cond, body } => {
                write!(f, "if {cond}")?;
                fmt_block(f, body)
            }
        }
    }
}

/// Render a statement list as source text, one statement per line.
pub fn display_list(statements: &[Statement]) -> String {
    statements
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
