//! Property and method access for the `->` operator.
//!
//! Built-in kinds are wrapped on demand in a [`Builtin`] adapter.  Host
//! objects reach the evaluator through [`HostObject`]: they may expose a full
//! [`Adapter`], a name-indexed [`Lookup`], or neither, in which case the
//! fields and methods registered for their Rust type in a [`TypeRegistry`]
//! are used.
//!
//! | Kind     | Properties | Methods |
//! |----------|------------|---------|
//! | integer  | `NumberFormat` | |
//! | float    | `NumberFormat`, `Ceiling`, `Floor`, `InvariantCulture` | `Round([digits])` |
//! | text     | `Length`, `HtmlEncoded`, `UrlEncoded`, `Nl2Br` | `ToUpper`, `ToLower`, `Trim`, `TrimStart`, `TrimEnd`, `Substring`, `Contains`, `Matches`, `Replace` |
//! | list     | `Count` | |
//! | datetime | `Year` … `Ticks`, `Date`, `TimeOfDay`, `LongDate`, … | |
//! | duration | `Days` … `Milliseconds`, `Total*`, `RoundForSeconds`, `Format` | |

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use regex::Regex;

use super::value::Value;

// ── Capabilities ──────────────────────────────────────────────────────────────

/// Named properties and methods over a value.
pub trait Adapter {
    /// Look up a property; `None` when the adapter has no such property.
    fn property(&self, name: &str) -> Option<Value>;

    /// Invoke a method; `Ok(None)` when the adapter has no such method.
    fn invoke(&self, _name: &str, _args: &[Value]) -> Result<Option<Value>, String> {
        Ok(None)
    }
}

/// A name-indexed container, the lighter alternative to [`Adapter`].
pub trait Lookup {
    fn lookup(&self, name: &str) -> Option<Value>;
}

/// An application object stored in a [`Value::Object`].
pub trait HostObject: fmt::Debug + fmt::Display + Any {
    fn as_any(&self) -> &dyn Any;

    fn adapter(&self) -> Option<&dyn Adapter> {
        None
    }

    fn lookup(&self) -> Option<&dyn Lookup> {
        None
    }

    /// Elements when the object is used as a `FOREACH` source.
    fn items(&self) -> Option<Vec<Value>> {
        None
    }

    /// Ordering against another value, when the object has one.
    fn compare(&self, _other: &Value) -> Option<Ordering> {
        None
    }
}

// ── Type registry ─────────────────────────────────────────────────────────────

type FieldFn = Box<dyn Fn(&dyn Any) -> Option<Value>>;
type MethodFn = Box<dyn Fn(&dyn Any, &[Value]) -> Option<Result<Value, String>>>;

/// Field accessors and method handlers registered per Rust type.
///
/// This is the last resort for host objects that implement neither
/// [`Adapter`] nor [`Lookup`].
#[derive(Default)]
pub struct TypeRegistry {
    fields: HashMap<(TypeId, String), FieldFn>,
    methods: HashMap<(TypeId, String), MethodFn>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("fields", &self.fields.len())
            .field("methods", &self.methods.len())
            .finish()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_field<T: Any>(&mut self, name: &str, get: impl Fn(&T) -> Value + 'static) {
        self.fields.insert(
            (TypeId::of::<T>(), name.to_owned()),
            Box::new(move |any: &dyn Any| any.downcast_ref::<T>().map(&get)),
        );
    }

    pub fn register_method<T: Any>(
        &mut self,
        name: &str,
        call: impl Fn(&T, &[Value]) -> Result<Value, String> + 'static,
    ) {
        self.methods.insert(
            (TypeId::of::<T>(), name.to_owned()),
            Box::new(move |any: &dyn Any, args: &[Value]| {
                any.downcast_ref::<T>().map(|t| call(t, args))
            }),
        );
    }

    pub fn field(&self, obj: &dyn HostObject, name: &str) -> Option<Value> {
        let any = obj.as_any();
        let get = self.fields.get(&((*any).type_id(), name.to_owned()))?;
        get(any)
    }

    pub fn method(
        &self,
        obj: &dyn HostObject,
        name: &str,
        args: &[Value],
    ) -> Option<Result<Value, String>> {
        let any = obj.as_any();
        let call = self.methods.get(&((*any).type_id(), name.to_owned()))?;
        call(any, args)
    }
}

// ── Dereference entry points ──────────────────────────────────────────────────

/// Resolve `value->name`.
///
/// Adapter misses read as null; host objects without a matching capability
/// or registered field read as empty text.
pub fn get_property(value: &Value, name: &str, types: Option<&TypeRegistry>) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Map(map) => map.get(name).cloned().unwrap_or(Value::Null),
        Value::Object(obj) => {
            if let Some(adapter) = obj.adapter() {
                return adapter.property(name).unwrap_or(Value::Null);
            }
            if let Some(lookup) = obj.lookup() {
                return lookup.lookup(name).unwrap_or(Value::Null);
            }
            types
                .and_then(|t| t.field(obj.as_ref(), name))
                .unwrap_or_default()
        }
        other => match Builtin::wrap(other) {
            Some(adapter) => adapter.property(name).unwrap_or(Value::Null),
            None => Value::default(),
        },
    }
}

/// Resolve `value->name(args…)`.
pub fn call_method(
    value: &Value,
    name: &str,
    args: &[Value],
    types: Option<&TypeRegistry>,
) -> Result<Value, String> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Object(obj) => {
            if let Some(adapter) = obj.adapter() {
                return Ok(adapter.invoke(name, args)?.unwrap_or(Value::Null));
            }
            Ok(types
                .and_then(|t| t.method(obj.as_ref(), name, args))
                .transpose()?
                .unwrap_or_default())
        }
        other => match Builtin::wrap(other) {
            Some(adapter) => Ok(adapter.invoke(name, args)?.unwrap_or(Value::Null)),
            None => Ok(Value::default()),
        },
    }
}

// ── Built-in adapters ─────────────────────────────────────────────────────────

/// Adapter over a built-in value kind.
#[derive(Debug, Clone, Copy)]
pub enum Builtin<'a> {
    Int(i64),
    Float(f64),
    Text(&'a str),
    List(&'a [Value]),
    DateTime(NaiveDateTime),
    Duration(TimeDelta),
}

impl<'a> Builtin<'a> {
    /// Wrap `value`, or `None` for kinds without a built-in adapter.
    pub fn wrap(value: &'a Value) -> Option<Self> {
        match value {
            Value::Int(n) => Some(Builtin::Int(*n)),
            Value::Float(x) => Some(Builtin::Float(*x)),
            Value::Str(s) => Some(Builtin::Text(s)),
            Value::List(items) => Some(Builtin::List(items)),
            Value::DateTime(dt) => Some(Builtin::DateTime(*dt)),
            Value::Duration(d) => Some(Builtin::Duration(*d)),
            Value::Null | Value::Bool(_) | Value::Map(_) | Value::Object(_) => None,
        }
    }
}

impl Adapter for Builtin<'_> {
    fn property(&self, name: &str) -> Option<Value> {
        match *self {
            Builtin::Int(n) => match name {
                "NumberFormat" => Some(Value::Str(group_thousands(n))),
                _ => None,
            },
            Builtin::Float(x) => float_property(x, name),
            Builtin::Text(s) => text_property(s, name),
            Builtin::List(items) => match name {
                "Count" => Some(Value::Int(items.len() as i64)),
                _ => None,
            },
            Builtin::DateTime(dt) => datetime_property(dt, name),
            Builtin::Duration(d) => duration_property(d, name),
        }
    }

    fn invoke(&self, name: &str, args: &[Value]) -> Result<Option<Value>, String> {
        match *self {
            Builtin::Float(x) => float_method(x, name, args),
            Builtin::Text(s) => text_method(s, name, args),
            Builtin::Int(_) | Builtin::List(_) | Builtin::DateTime(_) | Builtin::Duration(_) => {
                Ok(None)
            }
        }
    }
}

fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn float_property(x: f64, name: &str) -> Option<Value> {
    Some(match name {
        "NumberFormat" => {
            let r = x.round();
            if r.is_finite() && r.abs() < i64::MAX as f64 {
                Value::Str(group_thousands(r as i64))
            } else {
                Value::Str(x.to_string())
            }
        }
        "Ceiling" => Value::Float(x.ceil()),
        "Floor" => Value::Float(x.floor()),
        "InvariantCulture" => Value::Str(x.to_string()),
        _ => return None,
    })
}

fn float_method(x: f64, name: &str, args: &[Value]) -> Result<Option<Value>, String> {
    match name {
        "Round" => match args {
            [] => Ok(Some(Value::Float(x.round_ties_even()))),
            [digits] => {
                let digits = digits.to_int().map_err(|e| format!("Round: {e}"))?;
                let digits = i32::try_from(digits)
                    .ok()
                    .filter(|d| (0..=15).contains(d))
                    .ok_or_else(|| format!("Round: digits out of range: {digits}"))?;
                let scale = 10f64.powi(digits);
                Ok(Some(Value::Float((x * scale).round_ties_even() / scale)))
            }
            _ => Err(format!("Round: expected at most 1 argument, got {}", args.len())),
        },
        _ => Ok(None),
    }
}

fn text_property(s: &str, name: &str) -> Option<Value> {
    Some(match name {
        "Length" => Value::Int(s.chars().count() as i64),
        "HtmlEncoded" => Value::Str(html_encode(s)),
        "UrlEncoded" => Value::Str(url_encode(s)),
        "Nl2Br" => Value::Str(s.replace("\r\n", "\n").replace('\n', "<br />\n")),
        _ => return None,
    })
}

fn text_method(s: &str, name: &str, args: &[Value]) -> Result<Option<Value>, String> {
    let arg_str = |i: usize| -> Result<String, String> {
        args.get(i)
            .map(Value::to_string)
            .ok_or_else(|| format!("{name}: missing argument {}", i + 1))
    };
    let arg_int = |i: usize| -> Result<i64, String> {
        args.get(i)
            .ok_or_else(|| format!("{name}: missing argument {}", i + 1))?
            .to_int()
            .map_err(|e| format!("{name}: {e}"))
    };

    Ok(Some(match name {
        "ToUpper" => Value::Str(s.to_uppercase()),
        "ToLower" => Value::Str(s.to_lowercase()),
        "Trim" => Value::Str(s.trim().to_owned()),
        "TrimStart" => Value::Str(s.trim_start().to_owned()),
        "TrimEnd" => Value::Str(s.trim_end().to_owned()),
        "Substring" => {
            let chars: Vec<char> = s.chars().collect();
            let count = chars.len() as i64;
            let start = arg_int(0)?;
            let len = if args.len() > 1 {
                arg_int(1)?
            } else {
                count.saturating_sub(start)
            };
            let end = Some(start)
                .filter(|&st| st >= 0 && len >= 0)
                .and_then(|st| st.checked_add(len))
                .filter(|&e| e <= count);
            let Some(end) = end else {
                return Err(format!(
                    "Substring: range {start}+{len} out of bounds for length {count}"
                ));
            };
            Value::Str(chars[start as usize..end as usize].iter().collect())
        }
        "Contains" => Value::Bool(s.contains(arg_str(0)?.as_str())),
        "Matches" => {
            let re = Regex::new(&arg_str(0)?).map_err(|e| format!("Matches: {e}"))?;
            Value::Bool(re.is_match(s))
        }
        "Replace" => {
            let re = Regex::new(&arg_str(0)?).map_err(|e| format!("Replace: {e}"))?;
            let replacement = arg_str(1)?;
            Value::Str(re.replace_all(s, replacement.as_str()).into_owned())
        }
        _ => return Ok(None),
    }))
}

fn html_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Form encoding: space becomes `+`, unreserved bytes pass through.
fn url_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'!' | b'*' | b'('
            | b')' => out.push(b as char),
            b' ' => out.push('+'),
            b => out.push_str(&format!("%{b:02x}")),
        }
    }
    out
}

fn datetime_property(dt: NaiveDateTime, name: &str) -> Option<Value> {
    Some(match name {
        "Year" => Value::Int(i64::from(dt.year())),
        "Month" => Value::Int(i64::from(dt.month())),
        "Day" => Value::Int(i64::from(dt.day())),
        "Hour" => Value::Int(i64::from(dt.hour())),
        "Minute" => Value::Int(i64::from(dt.minute())),
        "Second" => Value::Int(i64::from(dt.second())),
        "Millisecond" => Value::Int(i64::from(dt.nanosecond().min(999_999_999) / 1_000_000)),
        "DayOfYear" => Value::Int(i64::from(dt.ordinal())),
        "DayOfWeek" => Value::Str(dt.format("%A").to_string()),
        "Date" => Value::DateTime(dt.date().and_time(NaiveTime::MIN)),
        "TimeOfDay" => Value::Duration(dt.time().signed_duration_since(NaiveTime::MIN)),
        "Ticks" => {
            // 100ns ticks since 0001-01-01T00:00:00
            let base = NaiveDate::from_ymd_opt(1, 1, 1)?.and_time(NaiveTime::MIN);
            let micros = dt.signed_duration_since(base).num_microseconds()?;
            Value::Int(micros.checked_mul(10)?)
        }
        "LongTime" => Value::Str(dt.format("%H:%M:%S").to_string()),
        "ShortTime" => Value::Str(dt.format("%H:%M").to_string()),
        "LongDate" => Value::Str(dt.format("%A, %B %-d, %Y").to_string()),
        "ShortDate" => Value::Str(dt.format("%m/%d/%Y").to_string()),
        _ => return None,
    })
}

fn total_seconds(d: TimeDelta) -> f64 {
    d.num_seconds() as f64 + f64::from(d.subsec_nanos()) / 1e9
}

fn duration_property(d: TimeDelta, name: &str) -> Option<Value> {
    Some(match name {
        "Days" => Value::Int(d.num_days()),
        "Hours" => Value::Int(d.num_hours() % 24),
        "Minutes" => Value::Int(d.num_minutes() % 60),
        "Seconds" => Value::Int(d.num_seconds() % 60),
        "Milliseconds" => Value::Int(d.num_milliseconds() % 1000),
        "TotalHours" => Value::Float(total_seconds(d) / 3600.0),
        "TotalMinutes" => Value::Float(total_seconds(d) / 60.0),
        "TotalSeconds" => Value::Float(total_seconds(d)),
        "TotalMilliseconds" => Value::Float(total_seconds(d) * 1000.0),
        "RoundForSeconds" => Value::Duration(TimeDelta::try_seconds(total_seconds(d).round() as i64)?),
        "Format" => Value::Str(humanize_duration(d)),
        _ => return None,
    })
}

/// `1d 2h 3m 4s`, omitting zero units (`0s` for an empty span).
fn humanize_duration(d: TimeDelta) -> String {
    let sign = if d < TimeDelta::zero() { "-" } else { "" };
    let d = d.abs();
    let parts = [
        (d.num_days(), "d"),
        (d.num_hours() % 24, "h"),
        (d.num_minutes() % 60, "m"),
        (d.num_seconds() % 60, "s"),
    ];
    let body: Vec<String> = parts
        .iter()
        .filter(|(n, _)| *n != 0)
        .map(|(n, unit)| format!("{n}{unit}"))
        .collect();
    if body.is_empty() {
        "0s".to_owned()
    } else {
        format!("{sign}{}", body.join(" "))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
