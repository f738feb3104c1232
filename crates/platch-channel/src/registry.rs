//! Named channel registry shared by one host.
//!
//! Channel names are free-form UTF-8; by convention they are
//! reverse-domain scoped ("metrics.example/counter") so independent
//! feature areas never collide. A name is bound to exactly one handler
//! of exactly one kind. Re-registering the same handler under the same
//! name is idempotent; anything else is a [`ChannelError::DuplicateChannel`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use tracing::debug;

use crate::error::{ChannelError, Result};
use crate::event::StreamHandler;
use crate::method::MethodHandler;
use crate::sync::lock;

/// Which messaging style a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Method,
    Event,
}

/// A registered handler for one channel name.
#[derive(Clone)]
pub enum Handler {
    Method(Arc<dyn MethodHandler>),
    Event(Arc<dyn StreamHandler>),
}

impl Handler {
    pub fn kind(&self) -> ChannelKind {
        match self {
            Handler::Method(_) => ChannelKind::Method,
            Handler::Event(_) => ChannelKind::Event,
        }
    }

    fn same_handler(&self, other: &Handler) -> bool {
        match (self, other) {
            (Handler::Method(a), Handler::Method(b)) => Arc::ptr_eq(a, b),
            (Handler::Event(a), Handler::Event(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Thread-safe map from channel name to handler.
#[derive(Default)]
pub struct ChannelRegistry {
    entries: Mutex<HashMap<String, Handler>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` under `name`.
    ///
    /// Registering the identical handler (same allocation) under the
    /// same name again succeeds without effect.
    pub fn register(&self, name: &str, handler: Handler) -> Result<()> {
        let mut entries = lock(&self.entries);
        if let Some(existing) = entries.get(name) {
            if existing.same_handler(&handler) {
                return Ok(());
            }
            return Err(ChannelError::DuplicateChannel {
                name: name.to_string(),
            });
        }
        debug!(channel = name, kind = ?handler.kind(), "channel registered");
        entries.insert(name.to_string(), handler);
        Ok(())
    }

    /// Remove the binding for `name`, if any. Unknown names are a no-op.
    pub fn unregister(&self, name: &str) -> Option<Handler> {
        let removed = lock(&self.entries).remove(name);
        if removed.is_some() {
            debug!(channel = name, "channel unregistered");
        }
        removed
    }

    pub fn lookup(&self, name: &str) -> Option<Handler> {
        lock(&self.entries).get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        lock(&self.entries).contains_key(name)
    }

    /// Drop every binding. Used at host teardown so handlers that
    /// hold a host handle do not keep the core alive in a cycle.
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.entries).keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MethodCall, MethodResult};

    struct Echo;

    impl MethodHandler for Echo {
        fn on_call(&self, call: MethodCall) -> MethodResult {
            MethodResult::Success(call.arguments)
        }
    }

    #[test]
    fn register_and_lookup() {
        let registry = ChannelRegistry::new();
        let handler = Arc::new(Echo);
        registry
            .register("util.example/echo", Handler::Method(handler))
            .unwrap();
        assert!(registry.contains("util.example/echo"));
        assert!(matches!(
            registry.lookup("util.example/echo"),
            Some(Handler::Method(_))
        ));
        assert!(registry.lookup("util.example/missing").is_none());
    }

    #[test]
    fn identical_reregistration_is_idempotent() {
        let registry = ChannelRegistry::new();
        let handler: Arc<dyn MethodHandler> = Arc::new(Echo);
        registry
            .register("util.example/echo", Handler::Method(handler.clone()))
            .unwrap();
        registry
            .register("util.example/echo", Handler::Method(handler))
            .unwrap();
    }

    #[test]
    fn different_handler_same_name_rejected() {
        let registry = ChannelRegistry::new();
        registry
            .register("util.example/echo", Handler::Method(Arc::new(Echo)))
            .unwrap();
        let err = registry
            .register("util.example/echo", Handler::Method(Arc::new(Echo)))
            .unwrap_err();
        assert!(matches!(err, ChannelError::DuplicateChannel { name } if name == "util.example/echo"));
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let registry = ChannelRegistry::new();
        assert!(registry.unregister("util.example/none").is_none());
    }

    #[test]
    fn names_are_sorted() {
        let registry = ChannelRegistry::new();
        registry
            .register("b.example/two", Handler::Method(Arc::new(Echo)))
            .unwrap();
        registry
            .register("a.example/one", Handler::Method(Arc::new(Echo)))
            .unwrap();
        assert_eq!(registry.names(), vec!["a.example/one", "b.example/two"]);
    }
}
