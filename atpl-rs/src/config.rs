//! Variables file parser.
//!
//! Seeds the render environment from a variables file (`~/.atplrc` by default):
//!
//! | Line | Action |
//! |------|--------|
//! | `/set <name>=<expr>` or `/set <name> <expr>` | evaluate `<expr>` and bind `<name>` |
//! | `/unset <name>` | remove a binding |
//! | Lines starting with `;` | comment, ignored |
//! | Any other `/command` | silently skipped |
//!
//! Expressions see the variables set on earlier lines.

use std::path::Path;

use crate::script::expr::is_identifier;
use crate::script::{Engine, Environment};

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a variables file.
#[derive(Debug)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Variables loaded from a file.
#[derive(Debug, Default)]
pub struct Config {
    pub vars: Environment,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a variables file with the default engine.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        Self::load_with(&Engine::new(), s)
    }

    /// Parse a variables file, evaluating expressions with `engine`.
    ///
    /// Returns the config and a list of any errors on recognised lines; a bad
    /// line does not stop loading.
    pub fn load_with(engine: &Engine, s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            // blank lines and comments (`;` or `;;` prefix)
            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            let Some(rest) = line.strip_prefix('/') else {
                continue;
            };

            let (cmd, args) = rest
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((rest, ""));
            let args = args.trim();

            let result = match cmd {
                "set" => parse_set(engine, args, &mut config.vars),
                "unset" => parse_unset(args, &mut config.vars),
                _ => Ok(()),
            };
            if let Err(message) = result {
                errors.push(ConfigError {
                    line: lineno,
                    message,
                });
            }
        }

        (config, errors)
    }

    /// Read and parse a variables file from disk.
    pub fn load_file(engine: &Engine, path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_with(engine, &s))
    }
}

// ── /set ─────────────────────────────────────────────────────────────────────

/// Parse `/set <name>=<expr>` or `/set <name> <expr>`.
fn parse_set(engine: &Engine, args: &str, vars: &mut Environment) -> Result<(), String> {
    if args.is_empty() {
        return Err("/set: requires an argument".into());
    }

    let name_end = args
        .find(|c: char| c == '=' || c.is_ascii_whitespace())
        .ok_or_else(|| format!("/set: missing value for '{args}'"))?;
    let name = &args[..name_end];
    let rest = args[name_end..].trim_start();
    let expr = rest.strip_prefix('=').unwrap_or(rest);
    if !is_identifier(name) {
        return Err(format!("/set: invalid variable name '{name}'"));
    }

    let value = engine.evaluate(expr, vars).map_err(|e| e.to_string())?;
    vars.set(name, value);
    Ok(())
}

fn parse_unset(args: &str, vars: &mut Environment) -> Result<(), String> {
    if args.is_empty() {
        return Err("/unset: requires a variable name".into());
    }
    vars.unset(args);
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
