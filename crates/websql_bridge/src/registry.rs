//! Pending-continuation table keyed by callback id.

use crate::error::BridgeError;
use crate::port::Callbacks;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Table of submissions that are waiting for their continuation.
///
/// Ids are `<service><counter>` and never reused within one registry.
/// Every resolution removes its entry before the continuation runs, so a
/// late or duplicate resolution for the same id finds nothing and is dropped.
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    next_id: AtomicU64,
    pending: Mutex<HashMap<String, Callbacks>>,
}

impl CallbackRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers callbacks and returns their id.
    pub fn register(&self, service: &str, callbacks: Callbacks) -> String {
        let id = format!("{service}{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.pending.lock().insert(id.clone(), callbacks);
        id
    }

    /// Runs the success continuation registered under `id`.
    ///
    /// Returns `false` if nothing is registered under `id`.
    pub fn resolve_success(&self, id: &str, value: Value) -> bool {
        match self.take(id) {
            Some(callbacks) => {
                callbacks.succeed(value);
                true
            }
            None => {
                tracing::debug!(callback = id, "dropping success for unknown callback");
                false
            }
        }
    }

    /// Runs the error continuation registered under `id`.
    ///
    /// Returns `false` if nothing is registered under `id`.
    pub fn resolve_error(&self, id: &str, error: BridgeError) -> bool {
        match self.take(id) {
            Some(callbacks) => {
                callbacks.fail(error);
                true
            }
            None => {
                tracing::debug!(callback = id, %error, "dropping error for unknown callback");
                false
            }
        }
    }

    /// Removes `id` without running anything.
    pub fn cancel(&self, id: &str) -> bool {
        self.take(id).is_some()
    }

    /// Returns true if `id` is still waiting.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.pending.lock().contains_key(id)
    }

    /// Number of submissions still waiting.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    // The lock is released before the caller runs the continuation.
    fn take(&self, id: &str) -> Option<Callbacks> {
        self.pending.lock().remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn counting(counter: &Arc<AtomicU64>) -> Callbacks {
        let (s, e) = (Arc::clone(counter), Arc::clone(counter));
        Callbacks::new(
            move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            },
            move |_| {
                e.fetch_add(100, Ordering::SeqCst);
            },
        )
    }

    #[test]
    fn ids_are_prefixed_and_unique() {
        let registry = CallbackRegistry::new();
        let a = registry.register("WebSql", Callbacks::none());
        let b = registry.register("WebSql", Callbacks::none());
        assert!(a.starts_with("WebSql"));
        assert_ne!(a, b);
        assert_eq!(registry.pending_count(), 2);
    }

    #[test]
    fn resolution_fires_once() {
        let registry = CallbackRegistry::new();
        let counter = Arc::new(AtomicU64::new(0));
        let id = registry.register("WebSql", counting(&counter));

        assert!(registry.resolve_success(&id, json!([])));
        assert!(!registry.resolve_success(&id, json!([])));
        assert!(!registry.resolve_error(&id, BridgeError::Native("late".into())));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!registry.contains(&id));
    }

    #[test]
    fn cancel_drops_without_running() {
        let registry = CallbackRegistry::new();
        let counter = Arc::new(AtomicU64::new(0));
        let id = registry.register("WebSql", counting(&counter));

        assert!(registry.cancel(&id));
        assert!(!registry.resolve_error(&id, BridgeError::Native("x".into())));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn continuation_may_reenter_registry() {
        let registry = Arc::new(CallbackRegistry::new());
        let inner = Arc::clone(&registry);
        let id = registry.register(
            "WebSql",
            Callbacks::new(
                move |_| {
                    inner.register("WebSql", Callbacks::none());
                },
                |_| {},
            ),
        );
        assert!(registry.resolve_success(&id, json!(null)));
        assert_eq!(registry.pending_count(), 1);
    }
}
