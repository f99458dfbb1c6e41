//! External directive hook.
//!
//! Directives the engine does not handle itself (`@[include:header]`,
//! `@[t:greeting]`, …) are handed to a [`DirectiveHook`] together with the
//! byte offset just past the directive.  The returned text is emitted in
//! place of the directive.

use tracing::debug;

use super::env::Environment;

/// Handler for directives outside the built-in set.
pub trait DirectiveHook {
    /// `directive` is the raw body between `@[` and `]`.  An `Err` aborts the
    /// render.
    fn handle(
        &mut self,
        directive: &str,
        end_offset: usize,
        env: &mut Environment,
    ) -> Result<String, String>;
}

impl<F> DirectiveHook for F
where
    F: FnMut(&str, usize, &mut Environment) -> Result<String, String>,
{
    fn handle(
        &mut self,
        directive: &str,
        end_offset: usize,
        env: &mut Environment,
    ) -> Result<String, String> {
        self(directive, end_offset, env)
    }
}

/// Unknown directives emit nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreUnknown;

impl DirectiveHook for IgnoreUnknown {
    fn handle(&mut self, directive: &str, _: usize, _: &mut Environment) -> Result<String, String> {
        debug!(directive, "unknown directive ignored");
        Ok(String::new())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_hook() {
        let mut seen = Vec::new();
        let mut hook = |d: &str, end: usize, env: &mut Environment| -> Result<String, String> {
            seen.push((d.to_owned(), end));
            env.set("hooked", true);
            Ok(d.to_uppercase())
        };
        let mut env = Environment::new();
        assert_eq!(hook.handle("include:nav", 14, &mut env).unwrap(), "INCLUDE:NAV");
        assert!(env.contains("hooked"));
        drop(hook);
        assert_eq!(seen, vec![("include:nav".to_owned(), 14)]);
    }

    #[test]
    fn ignore_unknown() {
        let mut env = Environment::new();
        assert_eq!(IgnoreUnknown.handle("anything", 0, &mut env).unwrap(), "");
        assert!(env.is_empty());
    }
}
