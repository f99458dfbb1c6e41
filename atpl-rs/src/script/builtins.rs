//! Global function registry.
//!
//! Each function receives a slice of already-evaluated arguments and returns
//! `Result<Value, String>`.  Host-registered functions shadow the built-ins;
//! names found in neither resolve to empty text.

use std::collections::HashMap;
use std::fmt;

use chrono::{Local, NaiveDate, TimeDelta};

use super::value::Value;

pub type NativeFn = Box<dyn Fn(&[Value]) -> Result<Value, String>>;

const BUILTINS: &[&str] = &[
    "strlen", "toupper", "tolower", "substr", "strcat", "replace", "abs", "min", "max", "range",
    "list", "date", "seconds", "now",
];

/// Named functions callable from expressions as `name(arg, …)`.
#[derive(Default)]
pub struct Functions {
    table: HashMap<String, NativeFn>,
    builtins: bool,
}

impl fmt::Debug for Functions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.table.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Functions")
            .field("registered", &names)
            .field("builtins", &self.builtins)
            .finish()
    }
}

impl Functions {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the default function set.
    pub fn with_builtins() -> Self {
        Functions {
            table: HashMap::new(),
            builtins: true,
        }
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> Result<Value, String> + 'static,
    ) {
        self.table.insert(name.into(), Box::new(f));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name) || (self.builtins && BUILTINS.contains(&name))
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, String> {
        if let Some(f) = self.table.get(name) {
            return f(args);
        }
        if self.builtins {
            if let Some(result) = call_builtin(name, args) {
                return result;
            }
        }
        Ok(Value::default())
    }
}

/// Dispatch a built-in function call.
///
/// Returns `None` if the function name is not a built-in.
pub fn call_builtin(name: &str, args: &[Value]) -> Option<Result<Value, String>> {
    fn inner(name: &str, args: &[Value]) -> Result<Option<Value>, String> {
        Ok(Some(match name {
            // ── Text ─────────────────────────────────────────────────────────
            "strlen" => Value::Int(get_str(args, 0, name)?.chars().count() as i64),
            "toupper" => Value::Str(get_str(args, 0, name)?.to_uppercase()),
            "tolower" => Value::Str(get_str(args, 0, name)?.to_lowercase()),
            "strcat" => Value::Str(args.iter().map(Value::to_string).collect()),
            "substr" => {
                let s = get_str(args, 0, name)?;
                let chars: Vec<char> = s.chars().collect();
                let start = (get_int(args, 1, name)?.max(0) as usize).min(chars.len());
                let end = match args.get(2) {
                    Some(_) => {
                        let len = get_int(args, 2, name)?.max(0) as usize;
                        start.saturating_add(len).min(chars.len())
                    }
                    None => chars.len(),
                };
                Value::Str(chars[start..end].iter().collect())
            }
            "replace" => {
                let haystack = get_str(args, 0, name)?;
                let needle = get_str(args, 1, name)?;
                let repl = get_str(args, 2, name)?;
                if needle.is_empty() {
                    Value::Str(haystack)
                } else {
                    Value::Str(haystack.replace(&needle, &repl))
                }
            }

            // ── Numbers ──────────────────────────────────────────────────────
            "abs" => match args.first() {
                Some(Value::Float(x)) => Value::Float(x.abs()),
                Some(_) => Value::Int(
                    get_int(args, 0, name)?
                        .checked_abs()
                        .ok_or_else(|| format!("{name}: integer overflow"))?,
                ),
                None => return Err(format!("{name}: argument 0 missing")),
            },
            "min" | "max" => {
                if args.is_empty() {
                    return Err(format!("{name}: too few args"));
                }
                let want = if name == "min" {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Greater
                };
                let mut best = &args[0];
                for arg in &args[1..] {
                    if arg.compare(best).map_err(|e| format!("{name}: {e}"))? == want {
                        best = arg;
                    }
                }
                best.clone()
            }
            "range" => {
                let start = get_int(args, 0, name)?;
                let end = get_int(args, 1, name)?;
                Value::List((start..end).map(Value::Int).collect())
            }
            "list" => Value::List(args.to_vec()),

            // ── Time ─────────────────────────────────────────────────────────
            "date" => {
                let part = |i: usize| -> Result<u32, String> {
                    let n = get_int(args, i, name)?;
                    u32::try_from(n).map_err(|_| format!("{name}: argument {i} out of range"))
                };
                let year = get_int(args, 0, name)?;
                let year = i32::try_from(year).map_err(|_| format!("{name}: year out of range"))?;
                let (month, day) = (part(1)?, part(2)?);
                let (hour, minute, second) = if args.len() > 3 {
                    (part(3)?, part(4)?, part(5)?)
                } else {
                    (0, 0, 0)
                };
                let dt = NaiveDate::from_ymd_opt(year, month, day)
                    .and_then(|d| d.and_hms_opt(hour, minute, second))
                    .ok_or_else(|| format!("{name}: invalid date"))?;
                Value::DateTime(dt)
            }
            "seconds" => {
                let n = get_int(args, 0, name)?;
                Value::Duration(
                    TimeDelta::try_seconds(n).ok_or_else(|| format!("{name}: out of range"))?,
                )
            }
            "now" => Value::DateTime(Local::now().naive_local()),

            _ => return Ok(None),
        }))
    }
    inner(name, args).transpose()
}

// ── Argument accessors ────────────────────────────────────────────────────────

fn get_str(args: &[Value], idx: usize, name: &str) -> Result<String, String> {
    args.get(idx)
        .map(Value::to_string)
        .ok_or_else(|| format!("{name}: argument {idx} missing"))
}

fn get_int(args: &[Value], idx: usize, name: &str) -> Result<i64, String> {
    args.get(idx)
        .ok_or_else(|| format!("{name}: argument {idx} missing"))?
        .to_int()
        .map_err(|e| format!("{name}: {e}"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
