//! # Named-callable registry.
//!
//! Worker threads begin with no inherited state, so there is no ambient way
//! to execute "the function called `strlen`". The [`Registry`] replaces
//! language-level name resolution with an explicit, testable table: callers
//! register `(name, handler)` pairs up front, and
//! [`Dispatcher::call`](crate::Dispatcher::call) packages the name plus
//! positional arguments for worker-side lookup.
//!
//! The table is shared between the submitting side (which validates names at
//! submit time) and every worker thread (which resolves them at execution
//! time), hence the concurrent map.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

/// Worker-side handler for a registered callable.
pub(crate) type Handler = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// Concurrent name → handler table.
pub struct Registry {
    handlers: DashMap<String, Handler>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Registers a callable under `name`, replacing any previous handler.
    ///
    /// The handler receives the positional arguments of the call and returns
    /// the task's value, or an error description that settles the promise
    /// with [`TaskError::Failed`](crate::TaskError::Failed).
    pub fn register<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    /// True if a callable is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Looks up the handler for `name`.
    pub(crate) fn get(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).map(|entry| Arc::clone(entry.value()))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_dispatch() {
        let registry = Registry::new();
        registry.register("double", |args| {
            let n = args
                .first()
                .and_then(Value::as_i64)
                .ok_or("double: expected an integer")?;
            Ok(Value::from(n * 2))
        });

        assert!(registry.contains("double"));
        assert!(!registry.contains("triple"));

        let handler = registry.get("double").unwrap();
        assert_eq!(handler(&[Value::from(21)]).unwrap(), Value::from(42));
        assert!(handler(&[Value::from("x")]).is_err());
    }

    #[test]
    fn re_register_replaces_handler() {
        let registry = Registry::new();
        registry.register("answer", |_| Ok(Value::from(1)));
        registry.register("answer", |_| Ok(Value::from(42)));
        let handler = registry.get("answer").unwrap();
        assert_eq!(handler(&[]).unwrap(), Value::from(42));
    }
}
