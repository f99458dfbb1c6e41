//! Command-line argument parsing.
//!
//! Usage:
//!   atpl [-f[<vars>]] [-D<name>=<expr>]… [-o<out>] [-d] [<template>|-]

use std::path::PathBuf;

pub const USAGE: &str = "Usage: atpl [-f[<vars>]] [-D<name>=<expr>]... [-o<out>] [-d] [<template>|-]";

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Variables-file specification.
    pub vars_file: VarsFile,
    /// `-D<name>=<expr>` definitions, in command-line order.
    pub defines: Vec<(String, String)>,
    /// Output file (`-o<out>`); stdout when absent.
    pub output: Option<PathBuf>,
    /// Debug logging (`-d`).
    pub debug: bool,
    /// Template source.
    pub template: Input,
}

/// How to choose the variables file.
#[derive(Debug, Default)]
pub enum VarsFile {
    /// Search `~/.atplrc`, `./.atplrc` in order (default).
    #[default]
    Search,
    /// `-f` with no file argument: load no variables file.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

/// Where the template comes from.
#[derive(Debug, Default, PartialEq)]
pub enum Input {
    /// No positional argument, or `-`.
    #[default]
    Stdin,
    Path(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            i += 1;
            positional.extend(argv[i..].iter().cloned());
            break;
        }

        // Non-flag argument (`-` alone means stdin).
        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        // Flag argument: iterate over characters after the leading `-`.
        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = true,

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.vars_file = VarsFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else if i + 1 < argv.len() && !argv[i + 1].starts_with('-') && i + 2 < argv.len() {
                        // Separate `-f <file>` only when a template argument follows.
                        i += 1;
                        args.vars_file = VarsFile::Explicit(PathBuf::from(&argv[i]));
                    } else {
                        args.vars_file = VarsFile::Skip;
                    }
                }

                // -D<name>=<expr>
                'D' => {
                    let def = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-D requires a name=expr argument".to_owned());
                    };
                    let (name, expr) = def
                        .split_once('=')
                        .ok_or_else(|| format!("-D{def}: expected name=expr"))?;
                    if name.is_empty() {
                        return Err(format!("-D{def}: variable name cannot be empty"));
                    }
                    args.defines.push((name.to_owned(), expr.to_owned()));
                }

                // -o<file>
                'o' => {
                    let out = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-o requires a file argument".to_owned());
                    };
                    args.output = Some(PathBuf::from(out));
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    // Positional argument → template source.
    match positional.len() {
        0 => {}
        1 => {
            let path = positional.remove(0);
            if path != "-" {
                args.template = Input::Path(PathBuf::from(path));
            }
        }
        n => return Err(format!("too many arguments ({n})")),
    }

    Ok(args)
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Search for the user variables file in the standard locations.
/// Returns the first path that exists, or `None`.
pub fn find_user_config() -> Option<PathBuf> {
    let home = std::env::var("HOME").unwrap_or_default();
    [format!("{home}/.atplrc"), "./.atplrc".to_owned()]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
