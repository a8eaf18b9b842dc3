use std::{collections::HashMap, rc::Rc};

use crate::ast::{
    BoolExpr, Expr, ExprKind, Op, PrintArg, Span, Statement, StatementKind, StatementList,
    UnaryOp,
};

/// How deeply subroutine calls may nest before evaluation gives up.
pub const MAX_CALL_DEPTH: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("I don't know how to {name}")]
    UndefinedSubroutine { name: String, span: Span },
    #[error("{name} has no value")]
    UndefinedVariable { name: String, span: Span },
    #[error("division by zero")]
    DivisionByZero { span: Span },
    #[error("number too big")]
    Overflow { span: Span },
    #[error("too many nested calls to {name}")]
    RecursionLimit { name: String, span: Span },
}

impl RuntimeError {
    pub fn span(&self) -> Span {
        match self {
            RuntimeError::UndefinedSubroutine { span, .. }
            | RuntimeError::UndefinedVariable { span, .. }
            | RuntimeError::DivisionByZero { span }
            | RuntimeError::Overflow { span }
            | RuntimeError::RecursionLimit { span, .. } => *span,
        }
    }
}

/// The variables and subroutines of a single run.
#[derive(Clone, Debug, Default)]
pub struct Env {
    vars: HashMap<String, i64>,
    subs: HashMap<String, Rc<StatementList>>,
}

impl Env {
    pub fn var(&self, name: &str) -> Option<i64> {
        self.vars.get(name).copied()
    }

    pub fn set_var(&mut self, name: &str, val: i64) {
        self.vars.insert(name.to_owned(), val);
    }

    pub fn vars(&self) -> &HashMap<String, i64> {
        &self.vars
    }

    pub fn sub(&self, name: &str) -> Option<Rc<StatementList>> {
        self.subs.get(name).cloned()
    }

    pub fn def_sub(&mut self, name: &str, body: Rc<StatementList>) {
        self.subs.insert(name.to_owned(), body);
    }

    pub fn clear(&mut self) {
        self.vars.clear();
        self.subs.clear();
    }

    pub fn eval(&self, expr: &Expr) -> Result<i64, RuntimeError> {
        let overflow = || RuntimeError::Overflow { span: expr.span };
        match &expr.e {
            ExprKind::Num(x) => Ok(*x),
            ExprKind::Var(name) => self.var(name).ok_or_else(|| RuntimeError::UndefinedVariable {
                name: name.clone(),
                span: expr.span,
            }),
            ExprKind::Unary(UnaryOp::Neg, operand) => {
                self.eval(operand)?.checked_neg().ok_or_else(overflow)
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                match op {
                    Op::Add => l.checked_add(r).ok_or_else(overflow),
                    Op::Sub => l.checked_sub(r).ok_or_else(overflow),
                    Op::Mul => l.checked_mul(r).ok_or_else(overflow),
                    Op::Div if r == 0 => Err(RuntimeError::DivisionByZero { span: expr.span }),
                    Op::Div => l.checked_div(r).ok_or_else(overflow),
                    // Computed in floating point and truncated; the cast saturates.
                    Op::Pow => Ok((l as f64).powf(r as f64) as i64),
                }
            }
        }
    }

    pub fn eval_bool(&self, expr: &BoolExpr) -> Result<bool, RuntimeError> {
        let lhs = self.eval(&expr.lhs)?;
        let rhs = self.eval(&expr.rhs)?;
        Ok(expr.op.apply(lhs, rhs))
    }

    /// Replace every `$name` in `text` by the value of the variable `name`.
    ///
    /// Unknown names and a `$` that isn't followed by a name are left alone.
    pub fn interpolate(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(dollar) = rest.find('$') {
            out.push_str(&rest[..dollar]);
            let after = &rest[dollar + 1..];
            let name_len = if after.starts_with(|c: char| c.is_ascii_alphabetic()) {
                after
                    .find(|c: char| !c.is_ascii_alphanumeric())
                    .unwrap_or(after.len())
            } else {
                0
            };
            let name = &after[..name_len];
            match self.var(name) {
                Some(val) if !name.is_empty() => out.push_str(&val.to_string()),
                _ => {
                    out.push('$');
                    out.push_str(name);
                }
            }
            rest = &after[name_len..];
        }
        out.push_str(rest);
        out
    }
}

/// Something that consumes the events produced by running a script.
///
/// Every event comes with the statement that produced it, so that players can highlight the
/// code that is currently running. The player also owns the [`Env`]; it is up to the player to
/// clear it between runs.
pub trait TurtlePlayer {
    fn env(&self) -> &Env;
    fn env_mut(&mut self) -> &mut Env;

    /// Turn counter-clockwise by `angle` degrees.
    fn add_turn(&mut self, angle: i64, source: &Statement);
    fn add_move(&mut self, distance: i64, source: &Statement);
    fn go_home(&mut self, source: &Statement);
    fn change_pen(&mut self, down: bool, source: &Statement);
    fn change_color(&mut self, index: i64, source: &Statement);
    fn variable_changed(&mut self, name: &str, value: i64, source: &Statement);
    fn log(&mut self, text: &str, source: &Statement);
}

struct Interpreter<'p, P: ?Sized> {
    player: &'p mut P,
    depth: usize,
}

impl<P: TurtlePlayer + ?Sized> Interpreter<'_, P> {
    fn eval(&self, expr: &Expr) -> Result<i64, RuntimeError> {
        self.player.env().eval(expr)
    }

    fn eval_signed(&self, expr: &Expr, negate: bool) -> Result<i64, RuntimeError> {
        let val = self.eval(expr)?;
        if negate {
            val.checked_neg()
                .ok_or(RuntimeError::Overflow { span: expr.span })
        } else {
            Ok(val)
        }
    }

    fn exec_list(&mut self, statements: &[Statement]) -> Result<(), RuntimeError> {
        for statement in statements {
            self.exec(statement)?;
        }
        Ok(())
    }

    fn exec(&mut self, st: &Statement) -> Result<(), RuntimeError> {
        log::debug!("{} at {}..{}", st.s.keyword(), st.span.start, st.span.end);
        match &st.s {
            StatementKind::Turn { angle, negate } => {
                let angle = self.eval_signed(angle, *negate)?;
                self.player.add_turn(angle, st);
            }
            StatementKind::Move { distance, negate } => {
                let distance = self.eval_signed(distance, *negate)?;
                self.player.add_move(distance, st);
            }
            StatementKind::Home => self.player.go_home(st),
            StatementKind::Pen { down } => self.player.change_pen(*down, st),
            StatementKind::Color { index } => {
                let index = self.eval(index)?;
                self.player.change_color(index, st);
            }
            StatementKind::Set { name, value } => {
                let value = self.eval(value)?;
                self.player.env_mut().set_var(name, value);
                self.player.variable_changed(name, value, st);
            }
            StatementKind::Print(PrintArg::Expr(e)) => {
                let text = self.eval(e)?.to_string();
                self.player.log(&text, st);
            }
            StatementKind::Print(PrintArg::Literal(s)) => {
                let text = self.player.env().interpolate(s);
                self.player.log(&text, st);
            }
            StatementKind::Sub { name, body } => {
                self.player.env_mut().def_sub(name, Rc::clone(body));
            }
            StatementKind::Call { name } => {
                let body = self.player.env().sub(name).ok_or_else(|| {
                    RuntimeError::UndefinedSubroutine {
                        name: name.clone(),
                        span: st.span,
                    }
                })?;
                if self.depth >= MAX_CALL_DEPTH {
                    return Err(RuntimeError::RecursionLimit {
                        name: name.clone(),
                        span: st.span,
                    });
                }
                self.depth += 1;
                let res = self.exec_list(&body);
                self.depth -= 1;
                res?;
            }
            StatementKind::Repeat { times, body } => {
                // The count is evaluated once, even if the body changes its variables.
                let times = self.eval(times)?;
                for _ in 0..times.max(0) {
                    self.exec_list(body)?;
                }
            }
            StatementKind::If { cond, body } => {
                if self.player.env().eval_bool(cond)? {
                    self.exec_list(body)?;
                }
            }
        }
        Ok(())
    }
}

/// Run `statements`, sending the resulting events to `player`.
///
/// Stops at the first runtime error; events emitted before the error have already been sent.
pub fn interpret<P: TurtlePlayer + ?Sized>(
    player: &mut P,
    statements: &[Statement],
) -> Result<(), RuntimeError> {
    Interpreter { player, depth: 0 }.exec_list(statements)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Turn(i64),
    Move(i64),
    Home,
    Pen(bool),
    Color(i64),
    Var(String, i64),
    Log(String),
}

/// A player that just remembers every event, along with the span of the statement that caused it.
#[derive(Debug, Default)]
pub struct Recorder {
    pub env: Env,
    pub events: Vec<(Event, Span)>,
}

impl Recorder {
    pub fn events(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events.iter().map(|(ev, _)| ev)
    }

    /// The text of every `print`, in order.
    pub fn output(&self) -> Vec<&str> {
        self.events()
            .filter_map(|ev| match ev {
                Event::Log(s) => Some(s.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.env.clear();
        self.events.clear();
    }

    fn push(&mut self, event: Event, source: &Statement) {
        self.events.push((event, source.span));
    }
}

impl TurtlePlayer for Recorder {
    fn env(&self) -> &Env {
        &self.env
    }

    fn env_mut(&mut self) -> &mut Env {
        &mut self.env
    }

    fn add_turn(&mut self, angle: i64, source: &Statement) {
        self.push(Event::Turn(angle), source);
    }

    fn add_move(&mut self, distance: i64, source: &Statement) {
        self.push(Event::Move(distance), source);
    }

    fn go_home(&mut self, source: &Statement) {
        self.push(Event::Home, source);
    }

    fn change_pen(&mut self, down: bool, source: &Statement) {
        self.push(Event::Pen(down), source);
    }

    fn change_color(&mut self, index: i64, source: &Statement) {
        self.push(Event::Color(index), source);
    }

    fn variable_changed(&mut self, name: &str, value: i64, source: &Statement) {
        self.push(Event::Var(name.to_owned(), value), source);
    }

    fn log(&mut self, text: &str, source: &Statement) {
        self.push(Event::Log(text.to_owned()), source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Result<Recorder, RuntimeError> {
        let prog = crate::parse(src).unwrap();
        let mut rec = Recorder::default();
        interpret(&mut rec, &prog)?;
        Ok(rec)
    }

    fn eval(src: &str) -> Result<i64, RuntimeError> {
        let rec = run(&format!("print {src}"))?;
        Ok(rec.output()[0].parse().unwrap())
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), 7);
        assert_eq!(eval("(1 + 2) * 3").unwrap(), 9);
        assert_eq!(eval("2 ^ 3 ^ 2").unwrap(), 512);
        assert_eq!(eval("-2 ^ 2").unwrap(), 4);
        assert_eq!(eval("- 3 * 2").unwrap(), -6);
        assert_eq!(eval("10 - 4 - 3").unwrap(), 3);
        assert_eq!(eval("100 / 10 / 5").unwrap(), 2);
        assert_eq!(eval("7 / 2").unwrap(), 3);
        assert_eq!(eval("-7 / 2").unwrap(), -3);
        assert_eq!(eval("2 ^ -1").unwrap(), 0);
        assert_eq!(
            eval("(5 - (1 ^ 4 - 3 * -(4 + 5) - 4 / (2 + 2) + 3) ^ 2 + 5) / 7").unwrap(),
            -127
        );
    }

    #[test]
    fn arithmetic_errors() {
        assert!(matches!(
            eval("1 / (2 - 2)"),
            Err(RuntimeError::DivisionByZero { .. })
        ));
        assert!(matches!(
            eval("9223372036854775807 + 1"),
            Err(RuntimeError::Overflow { .. })
        ));
        assert_eq!(eval("10 ^ 100").unwrap(), i64::MAX);
    }

    #[test]
    fn repeat_emits_body_in_order() {
        let rec = run("repeat 3 forward 10 right 90 end").unwrap();
        let events: Vec<_> = rec.events().cloned().collect();
        assert_eq!(events.len(), 6);
        for pair in events.chunks(2) {
            assert_eq!(pair, [Event::Move(10), Event::Turn(-90)]);
        }
    }

    #[test]
    fn loop_count_is_evaluated_once() {
        let rec = run("set n 3 repeat n set n n + 1 forward n end").unwrap();
        let moves: Vec<_> = rec
            .events()
            .filter_map(|ev| match ev {
                Event::Move(d) => Some(*d),
                _ => None,
            })
            .collect();
        assert_eq!(moves, [4, 5, 6]);
        assert_eq!(rec.env.var("n"), Some(6));
    }

    #[test]
    fn negative_repeat_count_runs_nothing() {
        let rec = run("repeat 0 - 2 home end").unwrap();
        assert_eq!(rec.events.len(), 0);
    }

    #[test]
    fn subroutines() {
        let rec = run("sub SQUARE forward 10 right 90 end").unwrap();
        assert!(rec.events.is_empty());
        assert!(rec.env.sub("SQUARE").is_some());

        let rec = run("sub SQUARE forward 10 right 90 end call SQUARE call SQUARE").unwrap();
        assert_eq!(rec.events.len(), 4);
    }

    #[test]
    fn recursive_subroutine() {
        let rec = run(
            "set n 3
             sub down
               if n > 0
                 forward n
                 set n n - 1
                 call down
               end
             end
             call down",
        )
        .unwrap();
        let moves: Vec<_> = rec
            .events()
            .filter(|ev| matches!(ev, Event::Move(_)))
            .cloned()
            .collect();
        assert_eq!(moves, [Event::Move(3), Event::Move(2), Event::Move(1)]);
    }

    #[test]
    fn runaway_recursion() {
        let err = run("sub f call f end call f").unwrap_err();
        assert_eq!(
            err,
            RuntimeError::RecursionLimit {
                name: "f".to_owned(),
                span: Span::new(6, 12),
            }
        );
    }

    #[test]
    fn undefined_names() {
        let err = run("forward 1 call nowhere").unwrap_err();
        assert_eq!(
            err,
            RuntimeError::UndefinedSubroutine {
                name: "nowhere".to_owned(),
                span: Span::new(10, 22),
            }
        );

        let err = run("set x 1 forward x + y").unwrap_err();
        assert_eq!(
            err,
            RuntimeError::UndefinedVariable {
                name: "y".to_owned(),
                span: Span::new(20, 21),
            }
        );
    }

    #[test]
    fn events_before_an_error_are_kept() {
        let prog = crate::parse("forward 1 left 2 forward 1 / 0").unwrap();
        let mut rec = Recorder::default();
        assert!(interpret(&mut rec, &prog).is_err());
        assert_eq!(rec.events.len(), 2);
    }

    #[test]
    fn interpolation() {
        let rec =
            run("set x 5 print \"value is $x!\" print \"$y\" print \"$ and $$x $x1\"").unwrap();
        assert_eq!(rec.output(), ["value is 5!", "$y", "$ and $5 $x1"]);
    }

    #[test]
    fn conditionals() {
        let rec = run(
            "set a 3
             if a = 3 print 1 end
             if a != 3 print 2 end
             if a < 4 print 3 end
             if a <= 2 print 4 end
             if a > 2 print 5 end
             if a >= 4 print 6 end",
        )
        .unwrap();
        assert_eq!(rec.output(), ["1", "3", "5"]);
    }

    #[test]
    fn controls_and_variables() {
        let rec = run("penup home color 1 + 1 pendown set v 7").unwrap();
        let events: Vec<_> = rec.events().cloned().collect();
        assert_eq!(
            events,
            [
                Event::Pen(false),
                Event::Home,
                Event::Color(2),
                Event::Pen(true),
                Event::Var("v".to_owned(), 7),
            ]
        );
        assert_eq!(rec.events[2].1, Span::new(11, 22));
    }

    #[test]
    fn clear_resets_the_run() {
        let mut rec = run("sub s home end set x 1 call s").unwrap();
        rec.clear();
        assert!(rec.events.is_empty());
        assert!(rec.env.var("x").is_none());
        assert!(rec.env.sub("s").is_none());
    }
}
