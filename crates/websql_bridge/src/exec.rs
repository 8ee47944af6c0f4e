//! Command dispatcher: local plugins first, native channel second.

use crate::error::{BridgeError, BridgeResult};
use crate::port::{BridgePort, Callbacks, Invocation};
use crate::registry::CallbackRegistry;
use crate::status::{CallbackStatus, ImmediateResult};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A service implemented inside the process.
pub trait Plugin: Send + Sync {
    /// Executes `action`.
    ///
    /// Returning `Ok` or `Error` resolves the call immediately. Returning
    /// `NoResult` leaves it pending until the plugin uses `responder`.
    /// Returning `ClassNotFound` hands the call to the native channel.
    fn execute(&self, action: &str, args: &[Value], responder: Responder) -> ImmediateResult;
}

/// Handle a plugin uses to resolve a deferred call.
#[derive(Debug, Clone)]
pub struct Responder {
    id: String,
    registry: Arc<CallbackRegistry>,
}

impl Responder {
    /// The callback id of the call.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Resolves the call with a value.
    pub fn success(self, value: Value) -> bool {
        self.registry.resolve_success(&self.id, value)
    }

    /// Resolves the call with an error.
    pub fn error(self, error: BridgeError) -> bool {
        self.registry.resolve_error(&self.id, error)
    }
}

/// The opaque native side of the bridge.
///
/// The channel receives the callback id and later reports completion
/// through [`Exec::complete`] or [`Exec::fail`].
pub trait NativeChannel: Send + Sync {
    /// Submits a command to native code.
    fn call(
        &self,
        callback_id: &str,
        service: &str,
        action: &str,
        args_json: &str,
    ) -> BridgeResult<ImmediateResult>;
}

/// A [`BridgePort`] that routes each call to a registered plugin or, when
/// none handles it, to the native channel.
///
/// Pending continuations live in an owned [`CallbackRegistry`].
pub struct Exec {
    registry: Arc<CallbackRegistry>,
    plugins: RwLock<HashMap<String, Arc<dyn Plugin>>>,
    native: Option<Arc<dyn NativeChannel>>,
}

impl Exec {
    /// Creates a dispatcher with no native channel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(CallbackRegistry::new()),
            plugins: RwLock::new(HashMap::new()),
            native: None,
        }
    }

    /// Creates a dispatcher backed by a native channel.
    pub fn with_native(native: Arc<dyn NativeChannel>) -> Self {
        Self {
            native: Some(native),
            ..Self::new()
        }
    }

    /// Registers an in-process plugin for `service`.
    pub fn register_plugin(&self, service: impl Into<String>, plugin: Arc<dyn Plugin>) {
        self.plugins.write().insert(service.into(), plugin);
    }

    /// Delivers a native success for `callback_id`.
    pub fn complete(&self, callback_id: &str, value: Value) -> bool {
        self.registry.resolve_success(callback_id, value)
    }

    /// Delivers a native failure for `callback_id`.
    pub fn fail(&self, callback_id: &str, error: BridgeError) -> bool {
        self.registry.resolve_error(callback_id, error)
    }

    /// The pending-continuation table.
    #[must_use]
    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    fn settle(&self, id: &str, result: &ImmediateResult) {
        let message = result.message.clone().unwrap_or(Value::Null);
        match result.status {
            CallbackStatus::Ok => {
                self.registry.resolve_success(id, message);
            }
            CallbackStatus::Error => {
                self.registry.resolve_error(id, BridgeError::rejected(message));
            }
            CallbackStatus::NoResult | CallbackStatus::ClassNotFound => {}
        }
    }

    fn invoke_native(&self, id: &str, invocation: &Invocation) -> ImmediateResult {
        let Some(native) = &self.native else {
            tracing::warn!(call = %invocation, "no plugin or native channel for call");
            let error = BridgeError::not_found(&invocation.service, &invocation.action);
            let result = ImmediateResult::class_not_found(error.to_string());
            self.registry.resolve_error(id, error);
            return result;
        };

        let submitted = invocation.args_json().and_then(|args| {
            native.call(id, &invocation.service, &invocation.action, &args)
        });

        match submitted {
            Ok(result) => {
                match result.status {
                    CallbackStatus::Ok if result.message.is_none() => {}
                    CallbackStatus::ClassNotFound => {
                        self.registry.resolve_error(
                            id,
                            BridgeError::not_found(&invocation.service, &invocation.action),
                        );
                    }
                    _ => self.settle(id, &result),
                }
                result
            }
            Err(error) => {
                tracing::warn!(call = %invocation, %error, "native call raised");
                let result = ImmediateResult::error(Value::String(error.to_string()));
                self.registry.resolve_error(id, error);
                result
            }
        }
    }
}

impl Default for Exec {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgePort for Exec {
    fn invoke(&self, invocation: Invocation, callbacks: Callbacks) -> ImmediateResult {
        let id = self.registry.register(&invocation.service, callbacks);

        let plugin = self.plugins.read().get(&invocation.service).cloned();
        if let Some(plugin) = plugin {
            let responder = Responder {
                id: id.clone(),
                registry: Arc::clone(&self.registry),
            };
            let result = plugin.execute(&invocation.action, &invocation.args, responder);
            if result.status != CallbackStatus::ClassNotFound {
                if result.status == CallbackStatus::Error {
                    tracing::warn!(call = %invocation, message = ?result.message, "plugin call failed");
                }
                self.settle(&id, &result);
                return result;
            }
        }

        self.invoke_native(&id, &invocation)
    }
}
