//! Template scripting: values, expressions and the directive interpreter.
//!
//! - Expression evaluation with operator precedence and late-bound variables
//! - Property and method access on values (`text->Length`, `d->Year`)
//! - Control flow: `@[IF:…]` … `@[ELSE]` … `@[ENDIF]`, `@[WHILE:…]`,
//!   `@[FOREACH:x IN …]`
//! - `@[SET:name=…]`, `@[=expr]`, `@[LIST]`
//! - A registry of global functions and a hook for unknown directives
//!
//! # Quick start
//!
//! ```rust
//! use atpl::script::{Engine, Environment};
//!
//! let engine = Engine::new();
//! let mut env = Environment::new();
//! let out = engine.render("@[SET:x=6]@[=x * 7]", &mut env).unwrap();
//! assert_eq!(out, "42");
//! ```

pub mod adapter;
pub mod builtins;
pub mod env;
pub mod expr;
pub mod hook;
pub mod template;
pub mod value;

// Re-exports for convenience.
pub use adapter::{Adapter, HostObject, Lookup, TypeRegistry};
pub use builtins::Functions;
pub use env::Environment;
pub use expr::EvalContext;
pub use hook::{DirectiveHook, IgnoreUnknown};
pub use template::Engine;
pub use value::Value;
