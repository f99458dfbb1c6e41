//! Runtime value type for template expressions.
//!
//! Values are loosely typed: every operator coerces its operands to the kind
//! it needs (integer, float, boolean or text) and reports a cast error when
//! the coercion is impossible.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use chrono::{NaiveDateTime, TimeDelta};
use indexmap::IndexMap;

use super::adapter::HostObject;
use crate::error::{ArithmeticError, EvalError};

/// A template runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    DateTime(NaiveDateTime),
    Duration(TimeDelta),
    /// An opaque host object, reached through its capabilities.
    Object(Rc<dyn HostObject>),
}

impl Default for Value {
    /// Unbound variables and failed lookups read as empty text.
    fn default() -> Self {
        Value::Str(String::new())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::Duration(d) => f.write_str(&format_duration(*d)),
            Value::Object(obj) => write!(f, "{obj}"),
        }
    }
}

/// `[-][d.]hh:mm:ss[.fff]`
pub(crate) fn format_duration(d: TimeDelta) -> String {
    let sign = if d < TimeDelta::zero() { "-" } else { "" };
    let d = d.abs();
    let days = d.num_days();
    let hours = d.num_hours() % 24;
    let minutes = d.num_minutes() % 60;
    let seconds = d.num_seconds() % 60;
    let millis = d.num_milliseconds() % 1000;

    let mut out = String::from(sign);
    if days > 0 {
        out.push_str(&format!("{days}."));
    }
    out.push_str(&format!("{hours:02}:{minutes:02}:{seconds:02}"));
    if millis > 0 {
        out.push_str(&format!(".{millis:03}"));
    }
    out
}

impl Value {
    /// Wrap a host object.
    pub fn object(obj: impl HostObject + 'static) -> Self {
        Value::Object(Rc::new(obj))
    }

    /// Name of the kind, as used in cast errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "text",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::DateTime(_) => "datetime",
            Value::Duration(_) => "duration",
            Value::Object(_) => "object",
        }
    }

    /// Null and empty text are interchangeable in comparisons.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Str(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Coerce to boolean: null, `0`, `""` and `"false"` are falsy.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::DateTime(_) | Value::Duration(_) | Value::Object(_) => true,
        }
    }

    /// Coerce to `i64`.  Floats round half to even; text must parse.
    pub fn to_int(&self) -> Result<i64, EvalError> {
        match self {
            Value::Null => Ok(0),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Int(n) => Ok(*n),
            Value::Float(x) => {
                let r = x.round_ties_even();
                if r.is_finite() && r >= i64::MIN as f64 && r < i64::MAX as f64 {
                    Ok(r as i64)
                } else {
                    Err(ArithmeticError::Overflow.into())
                }
            }
            Value::Str(s) => s.trim().parse().map_err(|_| self.cast_error("integer")),
            _ => Err(self.cast_error("integer")),
        }
    }

    /// Coerce to `f64`.
    pub fn to_float(&self) -> Result<f64, EvalError> {
        match self {
            Value::Null => Ok(0.0),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Int(n) => Ok(*n as f64),
            Value::Float(x) => Ok(*x),
            Value::Str(s) => s.trim().parse().map_err(|_| self.cast_error("float")),
            _ => Err(self.cast_error("float")),
        }
    }

    pub(crate) fn cast_error(&self, to: &'static str) -> EvalError {
        EvalError::Cast {
            from: self.type_name(),
            to,
        }
    }

    /// Elements for `FOREACH`, or `None` when the value is not iterable.
    ///
    /// Maps yield one `{Key, Value}` map per entry; text yields its characters.
    pub fn items(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(items.clone()),
            Value::Map(map) => Some(
                map.iter()
                    .map(|(k, v)| {
                        let mut pair = IndexMap::new();
                        pair.insert("Key".to_owned(), Value::Str(k.clone()));
                        pair.insert("Value".to_owned(), v.clone());
                        Value::Map(pair)
                    })
                    .collect(),
            ),
            Value::Str(s) => Some(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            Value::Object(obj) => obj.items(),
            _ => None,
        }
    }

    // ── Arithmetic helpers ────────────────────────────────────────────────────

    pub fn arith_add(&self, rhs: &Value) -> Result<Value, EvalError> {
        let (a, b) = (self.to_int()?, rhs.to_int()?);
        a.checked_add(b)
            .map(Value::Int)
            .ok_or(ArithmeticError::Overflow.into())
    }

    pub fn arith_sub(&self, rhs: &Value) -> Result<Value, EvalError> {
        let (a, b) = (self.to_int()?, rhs.to_int()?);
        a.checked_sub(b)
            .map(Value::Int)
            .ok_or(ArithmeticError::Overflow.into())
    }

    /// Multiplication is the one operator that promotes to float.
    pub fn arith_mul(&self, rhs: &Value) -> Result<Value, EvalError> {
        if matches!(self, Value::Float(_)) || matches!(rhs, Value::Float(_)) {
            return Ok(Value::Float(self.to_float()? * rhs.to_float()?));
        }
        let (a, b) = (self.to_int()?, rhs.to_int()?);
        a.checked_mul(b)
            .map(Value::Int)
            .ok_or(ArithmeticError::Overflow.into())
    }

    pub fn arith_div(&self, rhs: &Value) -> Result<Value, EvalError> {
        let (a, b) = (self.to_int()?, rhs.to_int()?);
        if b == 0 {
            return Err(ArithmeticError::DivisionByZero.into());
        }
        a.checked_div(b)
            .map(Value::Int)
            .ok_or(ArithmeticError::Overflow.into())
    }

    pub fn concat(&self, rhs: &Value) -> Value {
        Value::Str(format!("{self}{rhs}"))
    }

    /// Relational ordering shared by every comparison operator.
    ///
    /// Blank values (null, empty text) sort after everything else; a float on
    /// either side widens both to float; text on either side compares text
    /// forms; unorderable pairs report `Less`.
    pub fn compare(&self, rhs: &Value) -> Result<Ordering, EvalError> {
        match (self.is_blank(), rhs.is_blank()) {
            (true, true) => return Ok(Ordering::Equal),
            (true, false) => return Ok(Ordering::Greater),
            (false, true) => return Ok(Ordering::Less),
            (false, false) => {}
        }

        if matches!(self, Value::Float(_)) || matches!(rhs, Value::Float(_)) {
            let (a, b) = (self.to_float()?, rhs.to_float()?);
            return Ok(a.partial_cmp(&b).unwrap_or(Ordering::Less));
        }
        if matches!(self, Value::Str(_)) || matches!(rhs, Value::Str(_)) {
            return Ok(self.to_string().cmp(&rhs.to_string()));
        }

        Ok(match (self, rhs) {
            (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
                self.to_int()?.cmp(&rhs.to_int()?)
            }
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Duration(a), Value::Duration(b)) => a.cmp(b),
            (Value::Object(obj), _) => obj.compare(rhs).unwrap_or(Ordering::Less),
            (_, Value::Object(obj)) => obj
                .compare(self)
                .map(Ordering::reverse)
                .unwrap_or(Ordering::Less),
            _ => Ordering::Less,
        })
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

impl From<TimeDelta> for Value {
    fn from(d: TimeDelta) -> Self {
        Value::Duration(d)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
