//! User callback bundles.

use crate::error::{CoreError, CoreResult};
use crate::result::ResultSet;
use crate::transaction::Transaction;
use std::fmt;

/// The body of a transaction.
pub type TransactionBody = Box<dyn FnOnce(&Transaction) -> CoreResult<()> + Send>;

pub(crate) type Hook = Box<dyn FnOnce() + Send>;
type ErrorHook = Box<dyn FnOnce(CoreError) + Send>;
type RowSuccess = Box<dyn FnOnce(&Transaction, ResultSet) + Send>;
type RowError = Box<dyn FnOnce(&Transaction, &CoreError) + Send>;

/// Callbacks attached to a transaction.
///
/// Exactly one of `on_success` / `on_error` runs per transaction. A failure
/// with no error callback is only logged.
///
/// ```rust
/// use websql_core::TransactionCallbacks;
///
/// let callbacks = TransactionCallbacks::new()
///     .on_success(|| println!("committed"))
///     .on_error(|err| eprintln!("rolled back: {err}"));
/// ```
#[derive(Default)]
pub struct TransactionCallbacks {
    pub(crate) on_success: Option<Hook>,
    pub(crate) on_error: Option<ErrorHook>,
    pub(crate) preflight: Option<Hook>,
    pub(crate) postflight: Option<Hook>,
}

impl TransactionCallbacks {
    /// No callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs after every statement succeeded and the body returned.
    #[must_use]
    pub fn on_success(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    /// Runs once on the first failure.
    #[must_use]
    pub fn on_error(mut self, f: impl FnOnce(CoreError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Runs right before the body, after the savepoint is in place.
    ///
    /// A panic here counts as a body failure.
    #[must_use]
    pub fn preflight(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.preflight = Some(Box::new(f));
        self
    }

    /// Runs on success, before `on_success`.
    #[must_use]
    pub fn postflight(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.postflight = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for TransactionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionCallbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("preflight", &self.preflight.is_some())
            .field("postflight", &self.postflight.is_some())
            .finish()
    }
}

/// Callbacks attached to one statement.
///
/// Statements may be issued from inside either callback; the transaction
/// stays open until the callback returns.
#[derive(Default)]
pub struct StatementCallbacks {
    pub(crate) on_success: Option<RowSuccess>,
    pub(crate) on_error: Option<RowError>,
}

impl StatementCallbacks {
    /// No callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives the result set.
    #[must_use]
    pub fn on_success(mut self, f: impl FnOnce(&Transaction, ResultSet) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    /// Receives the statement error. The transaction fails regardless.
    #[must_use]
    pub fn on_error(mut self, f: impl FnOnce(&Transaction, &CoreError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for StatementCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementCallbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
