//! Template expression scanner and operator-precedence evaluator.
//!
//! Expressions are evaluated in a single left-to-right pass with two stacks
//! (shunting-yard); there is no AST.  Literals and operator runs alternate.
//! Variables are pushed as unresolved references and looked up only when an
//! operator consumes them.
//!
//! Operator precedence (lowest → highest):
//!   relational  →  logical  →  bitwise  →  `!`  →  `.`  →  additive  →
//!   multiplicative  →  `->`
//!
//! Every parenthesis level adds 20 to the priority of the operators inside
//! it.  Function-call arguments are split at top-level commas and each one is
//! evaluated by its own [`Evaluator`].

use std::cmp::Ordering;

use tracing::trace;

use super::adapter::{self, TypeRegistry};
use super::value::Value;
use crate::error::{Error, EvalError};

// ── EvalContext ───────────────────────────────────────────────────────────────

/// Dependency-injection interface used by the expression evaluator.
///
/// The template engine implements this over its environment, function
/// registry and type registry.
pub trait EvalContext {
    /// Look up a variable.  Unbound variables read as empty text.
    fn get_var(&self, name: &str) -> Option<Value>;

    /// Invoke a global function.  Unknown names should yield empty text.
    fn call_fn(&self, name: &str, args: &[Value]) -> Result<Value, String>;

    /// Field and method table for host objects without capabilities.
    fn types(&self) -> Option<&TypeRegistry> {
        None
    }
}

// ── Operators ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Xor,
    BitAnd,
    BitOr,
    BitXor,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    fn priority(self) -> u32 {
        match self {
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 0,
            BinOp::And | BinOp::Or | BinOp::Xor => 1,
            BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => 2,
            BinOp::Concat => 4,
            BinOp::Add | BinOp::Sub => 5,
            BinOp::Mul | BinOp::Div => 6,
        }
    }

    fn apply(self, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
        Ok(match self {
            BinOp::Eq => Value::Bool(lhs.compare(rhs)? == Ordering::Equal),
            BinOp::Ne => Value::Bool(lhs.compare(rhs)? != Ordering::Equal),
            BinOp::Lt => Value::Bool(lhs.compare(rhs)? == Ordering::Less),
            BinOp::Le => Value::Bool(lhs.compare(rhs)? != Ordering::Greater),
            BinOp::Gt => Value::Bool(lhs.compare(rhs)? == Ordering::Greater),
            BinOp::Ge => Value::Bool(lhs.compare(rhs)? != Ordering::Less),
            BinOp::And => Value::Bool(lhs.as_bool() && rhs.as_bool()),
            BinOp::Or => Value::Bool(lhs.as_bool() || rhs.as_bool()),
            BinOp::Xor => Value::Bool(lhs.as_bool() != rhs.as_bool()),
            BinOp::BitAnd => Value::Int(lhs.to_int()? & rhs.to_int()?),
            BinOp::BitOr => Value::Int(lhs.to_int()? | rhs.to_int()?),
            BinOp::BitXor => Value::Int(lhs.to_int()? ^ rhs.to_int()?),
            BinOp::Concat => lhs.concat(rhs),
            BinOp::Add => lhs.arith_add(rhs)?,
            BinOp::Sub => lhs.arith_sub(rhs)?,
            BinOp::Mul => lhs.arith_mul(rhs)?,
            BinOp::Div => lhs.arith_div(rhs)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    /// Unary, right-associative.
    Not,
    /// Member access; the right operand is a name, not a value.
    Deref,
    Binary(BinOp),
}

impl Op {
    fn priority(self) -> u32 {
        match self {
            Op::Not => 3,
            Op::Deref => 7,
            Op::Binary(b) => b.priority(),
        }
    }

    fn is_right_assoc(self) -> bool {
        self == Op::Not
    }
}

/// Two-character spellings come first so runs split by longest match.
const SPELLINGS: &[(&str, Op)] = &[
    ("==", Op::Binary(BinOp::Eq)),
    ("!=", Op::Binary(BinOp::Ne)),
    ("<>", Op::Binary(BinOp::Ne)),
    ("<=", Op::Binary(BinOp::Le)),
    (">=", Op::Binary(BinOp::Ge)),
    ("&&", Op::Binary(BinOp::And)),
    ("||", Op::Binary(BinOp::Or)),
    ("^^", Op::Binary(BinOp::Xor)),
    ("->", Op::Deref),
    ("<", Op::Binary(BinOp::Lt)),
    (">", Op::Binary(BinOp::Gt)),
    ("&", Op::Binary(BinOp::BitAnd)),
    ("|", Op::Binary(BinOp::BitOr)),
    ("^", Op::Binary(BinOp::BitXor)),
    ("!", Op::Not),
    (".", Op::Binary(BinOp::Concat)),
    ("+", Op::Binary(BinOp::Add)),
    ("-", Op::Binary(BinOp::Sub)),
    ("*", Op::Binary(BinOp::Mul)),
    ("/", Op::Binary(BinOp::Div)),
];

const GROUP_OFFSET: u32 = 20;

fn split_operators(run: &str) -> Result<Vec<Op>, EvalError> {
    let mut ops = Vec::new();
    let mut rest = run;
    while !rest.is_empty() {
        let (spelling, op) = SPELLINGS
            .iter()
            .find(|(s, _)| rest.starts_with(s))
            .ok_or_else(|| EvalError::UnknownOperator(run.to_owned()))?;
        ops.push(*op);
        rest = &rest[spelling.len()..];
    }
    Ok(ops)
}

// ── Scanner ───────────────────────────────────────────────────────────────────

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_operator_char(c: char) -> bool {
    !(is_word_char(c) || c.is_whitespace() || matches!(c, '"' | '(' | ')'))
}

/// `true` for a bare identifier: a letter or `_` followed by word characters.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(is_word_char)
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Cursor { src, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// A word, or a quoted span including both quotes.  Backslashes inside
    /// quotes are ordinary characters.
    fn literal(&mut self) -> Result<&'a str, EvalError> {
        let start = self.pos;
        if self.peek() == Some('"') {
            self.bump();
            loop {
                match self.bump() {
                    None => return Err(EvalError::UnterminatedString),
                    Some('"') => break,
                    Some(_) => {}
                }
            }
        } else {
            while self.peek().is_some_and(is_word_char) {
                self.bump();
            }
        }
        Ok(&self.src[start..self.pos])
    }

    fn operator_run(&mut self) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(is_operator_char) {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    /// Argument texts of a call; the cursor starts just past `(` and ends just
    /// past the matching `)`.
    fn call_args(&mut self) -> Result<Vec<&'a str>, EvalError> {
        let mut args = Vec::new();
        let mut depth = 0usize;
        let mut quoted = false;
        let mut start = self.pos;
        loop {
            let here = self.pos;
            match self.bump() {
                None if quoted => return Err(EvalError::UnterminatedString),
                None => return Err(EvalError::UnmatchedParen),
                Some('\\') => {
                    self.bump();
                }
                Some('"') => quoted = !quoted,
                Some(_) if quoted => {}
                Some('(') => depth += 1,
                Some(')') if depth > 0 => depth -= 1,
                Some(')') => {
                    args.push(&self.src[start..here]);
                    break;
                }
                Some(',') if depth == 0 => {
                    args.push(&self.src[start..here]);
                    start = self.pos;
                }
                Some(_) => {}
            }
        }
        if args.last().is_some_and(|a| a.trim().is_empty()) {
            args.pop();
        }
        Ok(args)
    }
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Operand {
    Value(Value),
    /// Resolved against the context when popped.
    Var(String),
}

fn classify(lit: &str) -> Result<Operand, EvalError> {
    if let Some(body) = lit.strip_prefix('"') {
        let body = body.strip_suffix('"').unwrap_or(body);
        return Ok(Operand::Value(Value::Str(body.to_owned())));
    }
    if lit.bytes().all(|b| b.is_ascii_digit()) {
        return lit
            .parse()
            .map(|n| Operand::Value(Value::Int(n)))
            .map_err(|_| EvalError::BadNumber(lit.to_owned()));
    }
    Ok(match lit {
        "true" => Operand::Value(Value::Bool(true)),
        "false" => Operand::Value(Value::Bool(false)),
        "null" => Operand::Value(Value::Null),
        _ => Operand::Var(lit.to_owned()),
    })
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    op: Op,
    priority: u32,
}

/// One evaluation: an operand stack, an operator stack and the current
/// parenthesis offset.  Single use.
pub struct Evaluator<'c, C: EvalContext + ?Sized> {
    ctx: &'c C,
    operands: Vec<Operand>,
    operators: Vec<Pending>,
    offset: u32,
    expect_operand: bool,
}

impl<'c, C: EvalContext + ?Sized> Evaluator<'c, C> {
    pub fn new(ctx: &'c C) -> Self {
        Evaluator {
            ctx,
            operands: Vec::new(),
            operators: Vec::new(),
            offset: 0,
            expect_operand: true,
        }
    }

    pub fn evaluate(mut self, expr: &str) -> Result<Value, EvalError> {
        let mut cursor = Cursor::new(expr);
        while let Some(c) = cursor.peek() {
            if c.is_whitespace() {
                cursor.bump();
                continue;
            }
            match c {
                '(' => {
                    cursor.bump();
                    self.open_group()?;
                }
                ')' => {
                    cursor.bump();
                    self.close_group()?;
                }
                c if is_word_char(c) || c == '"' => {
                    let lit = cursor.literal()?;
                    if cursor.peek() == Some('(') && is_identifier(lit) {
                        cursor.bump();
                        let args = cursor.call_args()?;
                        self.call(lit, &args)?;
                    } else {
                        self.push_literal(lit)?;
                    }
                }
                _ => {
                    let run = cursor.operator_run();
                    for op in split_operators(run)? {
                        self.push_operator(op)?;
                    }
                }
            }
        }
        self.finish()
    }

    fn open_group(&mut self) -> Result<(), EvalError> {
        if !self.expect_operand {
            return Err(EvalError::MissingOperator("(".into()));
        }
        self.offset += GROUP_OFFSET;
        Ok(())
    }

    fn close_group(&mut self) -> Result<(), EvalError> {
        if self.offset == 0 {
            return Err(EvalError::UnmatchedParen);
        }
        if self.expect_operand {
            return Err(EvalError::MissingOperand);
        }
        self.offset -= GROUP_OFFSET;
        Ok(())
    }

    fn push_literal(&mut self, lit: &str) -> Result<(), EvalError> {
        if !self.expect_operand {
            return Err(EvalError::MissingOperator(lit.to_owned()));
        }
        trace!(literal = lit, "operand");
        self.operands.push(classify(lit)?);
        self.expect_operand = false;
        Ok(())
    }

    fn push_operator(&mut self, op: Op) -> Result<(), EvalError> {
        let priority = op.priority() + self.offset;
        if op == Op::Not {
            // prefix: nothing to its left is complete yet
            if !self.expect_operand {
                return Err(EvalError::MissingOperator("!".into()));
            }
            self.operators.push(Pending { op, priority });
            return Ok(());
        }
        if self.expect_operand {
            return Err(EvalError::MissingOperand);
        }
        while let Some(top) = self.operators.last().copied() {
            let pops = top.priority > priority
                || (top.priority == priority && !top.op.is_right_assoc());
            if !pops {
                break;
            }
            self.operators.pop();
            self.apply(top.op)?;
        }
        self.operators.push(Pending { op, priority });
        self.expect_operand = true;
        Ok(())
    }

    fn call(&mut self, name: &str, args: &[&str]) -> Result<(), EvalError> {
        if !self.expect_operand {
            return Err(EvalError::MissingOperator(name.to_owned()));
        }
        let values = args
            .iter()
            .map(|arg| evaluate(arg, self.ctx).map_err(|e| EvalError::Nested(Box::new(e))))
            .collect::<Result<Vec<_>, _>>()?;

        let method_priority = Op::Deref.priority() + self.offset;
        let is_method = self
            .operators
            .last()
            .is_some_and(|p| p.op == Op::Deref && p.priority == method_priority);

        let result = if is_method {
            self.operators.pop();
            let receiver = self.pop_value()?;
            trace!(method = name, args = values.len(), "method call");
            adapter::call_method(&receiver, name, &values, self.ctx.types())
        } else {
            trace!(function = name, args = values.len(), "function call");
            self.ctx.call_fn(name, &values)
        }
        .map_err(|message| EvalError::Function {
            name: name.to_owned(),
            message,
        })?;

        self.operands.push(Operand::Value(result));
        self.expect_operand = false;
        Ok(())
    }

    fn pop_value(&mut self) -> Result<Value, EvalError> {
        match self.operands.pop().ok_or(EvalError::StackUnderflow)? {
            Operand::Value(v) => Ok(v),
            Operand::Var(name) => Ok(self.ctx.get_var(&name).unwrap_or_default()),
        }
    }

    fn apply(&mut self, op: Op) -> Result<(), EvalError> {
        trace!(?op, "apply");
        let result = match op {
            Op::Not => Value::Bool(!self.pop_value()?.as_bool()),
            Op::Deref => {
                let name = match self.operands.pop().ok_or(EvalError::StackUnderflow)? {
                    Operand::Var(name) => name,
                    Operand::Value(v) => v.to_string(),
                };
                let target = self.pop_value()?;
                adapter::get_property(&target, &name, self.ctx.types())
            }
            Op::Binary(bin) => {
                let rhs = self.pop_value()?;
                let lhs = self.pop_value()?;
                bin.apply(&lhs, &rhs)?
            }
        };
        self.operands.push(Operand::Value(result));
        Ok(())
    }

    fn finish(mut self) -> Result<Value, EvalError> {
        if self.offset != 0 {
            return Err(EvalError::UnmatchedParen);
        }
        if self.operands.is_empty() && self.operators.is_empty() {
            return Ok(Value::default());
        }
        if self.expect_operand {
            return Err(EvalError::MissingOperand);
        }
        while let Some(pending) = self.operators.pop() {
            self.apply(pending.op)?;
        }
        self.pop_value()
    }
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Evaluate `expr` with a fresh evaluator.
///
/// Any failure is reported as [`Error::Evaluation`] carrying `expr`.
pub fn evaluate<C: EvalContext + ?Sized>(expr: &str, ctx: &C) -> Result<Value, Error> {
    Evaluator::new(ctx)
        .evaluate(expr)
        .map_err(|cause| Error::evaluation(expr, cause))
}

pub fn evaluate_bool<C: EvalContext + ?Sized>(expr: &str, ctx: &C) -> Result<bool, Error> {
    Ok(evaluate(expr, ctx)?.as_bool())
}

pub fn evaluate_text<C: EvalContext + ?Sized>(expr: &str, ctx: &C) -> Result<String, Error> {
    Ok(evaluate(expr, ctx)?.to_string())
}

pub fn evaluate_int<C: EvalContext + ?Sized>(expr: &str, ctx: &C) -> Result<i64, Error> {
    evaluate(expr, ctx)?
        .to_int()
        .map_err(|cause| Error::evaluation(expr, cause))
}

pub fn evaluate_float<C: EvalContext + ?Sized>(expr: &str, ctx: &C) -> Result<f64, Error> {
    evaluate(expr, ctx)?
        .to_float()
        .map_err(|cause| Error::evaluation(expr, cause))
}

/// Evaluate the target of `SET` or `FOREACH`.
///
/// A bare identifier names itself; anything else is evaluated and its text
/// form is the name.
pub fn evaluate_name<C: EvalContext + ?Sized>(expr: &str, ctx: &C) -> Result<String, Error> {
    let expr = expr.trim();
    if is_identifier(expr) {
        return Ok(expr.to_owned());
    }
    evaluate_text(expr, ctx)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
