//! Coordinator configuration.

use serde::{Deserialize, Serialize};

/// How the creation callback of `open_database` decides to fire.
///
/// Backends differ in what their "created" flag means (created on disk for
/// the first time, or first opened by this process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationSignal {
    /// Fire whenever the backend reports a truthy flag.
    BackendFlag,
    /// Fire on a truthy flag, at most once per name per `WebSql` instance
    /// (until the database is removed).
    FirstOpenInProcess,
}

/// Which handles share a transaction queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueScope {
    /// Every `Database` handle serializes only its own transactions.
    PerHandle,
    /// Handles opened with the same name share one queue.
    PerName,
}

/// Configuration for a [`crate::WebSql`] instance.
///
/// Missing fields take their default when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bridge service that receives every action.
    pub service: String,

    /// Savepoint names are `<prefix><transaction id>`.
    pub savepoint_prefix: String,

    /// Issue `RELEASE SAVEPOINT` before reporting success.
    pub release_on_success: bool,

    /// Issue `ROLLBACK TO SAVEPOINT` before reporting failure.
    pub rollback_on_failure: bool,

    /// Creation callback policy.
    pub creation_signal: CreationSignal,

    /// Queue sharing policy.
    pub queue_scope: QueueScope,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: "WebSql".to_string(),
            savepoint_prefix: "trx".to_string(),
            release_on_success: false,
            rollback_on_failure: false,
            creation_signal: CreationSignal::BackendFlag,
            queue_scope: QueueScope::PerHandle,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bridge service name.
    #[must_use]
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Sets the savepoint name prefix.
    #[must_use]
    pub fn savepoint_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.savepoint_prefix = prefix.into();
        self
    }

    /// Sets whether successful transactions release their savepoint.
    #[must_use]
    pub const fn release_on_success(mut self, value: bool) -> Self {
        self.release_on_success = value;
        self
    }

    /// Sets whether failed transactions roll back to their savepoint.
    #[must_use]
    pub const fn rollback_on_failure(mut self, value: bool) -> Self {
        self.rollback_on_failure = value;
        self
    }

    /// Sets the creation callback policy.
    #[must_use]
    pub const fn creation_signal(mut self, signal: CreationSignal) -> Self {
        self.creation_signal = signal;
        self
    }

    /// Sets the queue sharing policy.
    #[must_use]
    pub const fn queue_scope(mut self, scope: QueueScope) -> Self {
        self.queue_scope = scope;
        self
    }
}
