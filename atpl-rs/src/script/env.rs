//! Variable environment shared by every evaluator of one render.
//!
//! A flat name → value table.  Insertion order is kept so that `@[LIST]`
//! output is deterministic.

use indexmap::IndexMap;

use super::value::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    vars: IndexMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or overwrite) a variable.  Overwriting keeps the original position.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Remove a variable, returning its value if it was bound.
    pub fn unset(&mut self, name: &str) -> Option<Value> {
        self.vars.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Iterate over all bindings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// `name: value` pairs joined by `, `.
    pub fn list(&self) -> String {
        self.vars
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = Environment::new();
        env.extend(iter);
        env
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for Environment {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.set(k, v);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let mut env = Environment::new();
        env.set("title", "Home");
        assert_eq!(env.get("title"), Some(&Value::from("Home")));
        assert!(env.contains("title"));
        assert!(!env.contains("other"));
    }

    #[test]
    fn overwrite_keeps_position() {
        let mut env = Environment::new();
        env.set("a", 1);
        env.set("b", 2);
        env.set("a", 3);
        assert_eq!(env.len(), 2);
        assert_eq!(env.list(), "a: 3, b: 2");
    }

    #[test]
    fn unset() {
        let mut env: Environment = [("a", 1), ("b", 2), ("c", 3)].into_iter().collect();
        assert_eq!(env.unset("b"), Some(Value::Int(2)));
        assert_eq!(env.unset("b"), None);
        assert_eq!(env.list(), "a: 1, c: 3");
    }

    #[test]
    fn empty() {
        let env = Environment::new();
        assert!(env.is_empty());
        assert_eq!(env.list(), "");
    }

    #[test]
    fn clone_is_independent() {
        let mut env = Environment::new();
        env.set("x", 1);
        let mut copy = env.clone();
        copy.set("x", 2);
        assert_eq!(env.get("x"), Some(&Value::Int(1)));
        assert_eq!(copy.get("x"), Some(&Value::Int(2)));
    }
}
