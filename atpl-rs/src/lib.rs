//! Embedded micro-templating engine.
//!
//! Templates interleave literal text with `@[…]` directives whose bodies are
//! expressions in a small operator-precedence language.  See [`script`] for
//! the directive set and [`Engine`] for the entry points.

pub mod cli;
pub mod config;
pub mod error;
pub mod script;

use std::sync::Once;

pub use error::{ArithmeticError, Error, EvalError, StructuralError};
pub use script::{
    Adapter, DirectiveHook, Engine, Environment, Functions, HostObject, Lookup, TypeRegistry,
    Value,
};

static TRACING_INIT: Once = Once::new();

/// Install a `fmt` subscriber for diagnostics on stderr.
///
/// `RUST_LOG` wins when set; otherwise the filter is `atpl=debug` with
/// `debug` and `warn` without.  Safe to call more than once.
pub fn init_tracing(debug: bool) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let default = if debug { "atpl=debug" } else { "warn" };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        // another subscriber may already be installed by the host
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .try_init();
    });
}
