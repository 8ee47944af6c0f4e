//! Bridge port trait definition.

use crate::error::{BridgeError, BridgeResult};
use crate::status::ImmediateResult;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Success continuation of a bridge call.
pub type SuccessFn = Box<dyn FnOnce(Value) + Send>;

/// Error continuation of a bridge call.
pub type ErrorFn = Box<dyn FnOnce(BridgeError) + Send>;

/// One command submitted through a bridge port.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Service name (for example `WebSql`).
    pub service: String,
    /// Action within the service (for example `executeSql`).
    pub action: String,
    /// Ordered JSON arguments.
    pub args: Vec<Value>,
}

impl Invocation {
    /// Creates a new invocation.
    pub fn new(service: impl Into<String>, action: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            service: service.into(),
            action: action.into(),
            args,
        }
    }

    /// Serializes the arguments as a JSON array.
    pub fn args_json(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string(&self.args)?)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service, self.action)
    }
}

/// The pair of continuations attached to one submission.
///
/// Resolving consumes the value, so at most one continuation ever runs.
#[derive(Default)]
pub struct Callbacks {
    on_success: Option<SuccessFn>,
    on_error: Option<ErrorFn>,
}

impl Callbacks {
    /// Creates callbacks from a success and an error closure.
    pub fn new<S, E>(on_success: S, on_error: E) -> Self
    where
        S: FnOnce(Value) + Send + 'static,
        E: FnOnce(BridgeError) + Send + 'static,
    {
        Self {
            on_success: Some(Box::new(on_success)),
            on_error: Some(Box::new(on_error)),
        }
    }

    /// Callbacks that ignore the outcome.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Runs the success continuation, if any.
    pub fn succeed(self, value: Value) {
        if let Some(f) = self.on_success {
            f(value);
        }
    }

    /// Runs the error continuation, if any.
    pub fn fail(self, error: BridgeError) {
        if let Some(f) = self.on_error {
            f(error);
        }
    }

    /// Runs the continuation matching `result`.
    pub fn resolve(self, result: BridgeResult<Value>) {
        match result {
            Ok(value) => self.succeed(value),
            Err(error) => self.fail(error),
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// The asynchronous command primitive the coordinator runs on.
///
/// # Contract
///
/// - Exactly one of the two continuations in `callbacks` runs, at most once,
///   unless the backend hangs (then neither runs).
/// - The continuation may run synchronously, before `invoke` returns, or
///   later from any thread.
/// - Callers must not hold locks across `invoke`.
///
/// # Implementors
///
/// - [`super::Exec`] - plugin-first dispatcher with a native fallback
/// - [`super::ScriptedBridge`] - scripted backend for tests and tooling
pub trait BridgePort: Send + Sync {
    /// Submits one command.
    fn invoke(&self, invocation: Invocation, callbacks: Callbacks) -> ImmediateResult;
}

impl<T: BridgePort + ?Sized> BridgePort for Arc<T> {
    fn invoke(&self, invocation: Invocation, callbacks: Callbacks) -> ImmediateResult {
        (**self).invoke(invocation, callbacks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn succeed_runs_success_only() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (s, e) = (Arc::clone(&seen), Arc::clone(&seen));
        let callbacks = Callbacks::new(
            move |v| s.lock().push(format!("ok {v}")),
            move |err| e.lock().push(format!("err {err}")),
        );
        callbacks.succeed(json!(1));
        assert_eq!(*seen.lock(), vec!["ok 1".to_string()]);
    }

    #[test]
    fn resolve_error_runs_error_only() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (s, e) = (Arc::clone(&seen), Arc::clone(&seen));
        let callbacks = Callbacks::new(
            move |_| s.lock().push("ok"),
            move |_| e.lock().push("err"),
        );
        callbacks.resolve(Err(BridgeError::Native("boom".into())));
        assert_eq!(*seen.lock(), vec!["err"]);
    }

    #[test]
    fn none_is_silent() {
        Callbacks::none().succeed(json!(null));
        Callbacks::none().fail(BridgeError::Native("ignored".into()));
    }

    #[test]
    fn invocation_args_json() {
        let inv = Invocation::new("WebSql", "connect", vec![json!("db")]);
        assert_eq!(inv.args_json().unwrap(), r#"["db"]"#);
        assert_eq!(inv.to_string(), "WebSql.connect");
    }
}
