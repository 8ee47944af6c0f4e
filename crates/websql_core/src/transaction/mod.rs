//! Transactions over a shared backend connection.
//!
//! A transaction is a savepoint marker on one backend connection plus the
//! statements its body (and its row callbacks) issue. Completion is tracked
//! locally:
//! - **Success** fires once the body returned and every statement and
//!   nested transaction finished without error
//! - **Failure** fires on the first error; results that arrive later are
//!   discarded
//!
//! Statement completion order is irrelevant. Exactly one of the two
//! callbacks runs.

mod callbacks;
mod driver;
mod query;
mod state;

pub use callbacks::{StatementCallbacks, TransactionBody, TransactionCallbacks};
pub use state::TransactionPhase;

pub(crate) use driver::TransactionInner;

use crate::error::CoreResult;
use crate::result::ResultSet;
use crate::types::{ConnectionId, QueryId, TransactionId};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Handle to a running transaction, passed to bodies and row callbacks.
///
/// Cheap to clone. Statements and nested transactions may only be issued
/// while the transaction is [`TransactionPhase::Running`]; afterwards they
/// return [`CoreError::InvalidState`](crate::CoreError::InvalidState).
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

impl Transaction {
    pub(crate) fn from_inner(inner: Arc<TransactionInner>) -> Self {
        Self { inner }
    }

    /// Unique id of this transaction.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.inner.id()
    }

    /// Returns true for `read_transaction`s.
    ///
    /// Read-only is advisory: statements are not inspected.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    /// Returns true if this transaction runs inside another one.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.inner.is_nested()
    }

    /// The backend connection, once assigned.
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.inner.connection()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> TransactionPhase {
        self.inner.phase()
    }

    /// Name of the owning database.
    #[must_use]
    pub fn database_name(&self) -> &str {
        self.inner.database_name()
    }

    /// Statements submitted but not yet completed.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding()
    }

    /// Submits a statement with row callbacks.
    ///
    /// The statement runs on this transaction's connection. Its failure
    /// fails the whole transaction; the row error callback runs first.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidState`](crate::CoreError::InvalidState) if the
    /// transaction has failed or finished.
    pub fn execute_sql(
        &self,
        sql: impl Into<String>,
        params: Vec<Value>,
        callbacks: StatementCallbacks,
    ) -> CoreResult<QueryId> {
        self.inner.execute_sql(sql.into(), params, callbacks)
    }

    /// Submits a statement without callbacks.
    ///
    /// # Errors
    ///
    /// See [`Transaction::execute_sql`].
    pub fn execute(&self, sql: impl Into<String>, params: Vec<Value>) -> CoreResult<QueryId> {
        self.execute_sql(sql, params, StatementCallbacks::new())
    }

    /// Submits a statement and hands its result set to `on_rows`.
    ///
    /// # Errors
    ///
    /// See [`Transaction::execute_sql`].
    pub fn query<F>(&self, sql: impl Into<String>, params: Vec<Value>, on_rows: F) -> CoreResult<QueryId>
    where
        F: FnOnce(&Transaction, ResultSet) + Send + 'static,
    {
        self.execute_sql(sql, params, StatementCallbacks::new().on_success(on_rows))
    }

    /// Starts a nested transaction on this transaction's connection.
    ///
    /// The child issues its own savepoint and keeps this transaction open
    /// until it terminates. Its failure reaches only its own error callback.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidState`](crate::CoreError::InvalidState) if the
    /// transaction has failed or finished.
    pub fn transaction<F>(&self, body: F, callbacks: TransactionCallbacks) -> CoreResult<TransactionId>
    where
        F: FnOnce(&Transaction) -> CoreResult<()> + Send + 'static,
    {
        self.inner.spawn_nested(Box::new(body), callbacks, false)
    }

    /// Starts a nested read transaction.
    ///
    /// # Errors
    ///
    /// See [`Transaction::transaction`].
    pub fn read_transaction<F>(
        &self,
        body: F,
        callbacks: TransactionCallbacks,
    ) -> CoreResult<TransactionId>
    where
        F: FnOnce(&Transaction) -> CoreResult<()> + Send + 'static,
    {
        self.inner.spawn_nested(Box::new(body), callbacks, true)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id())
            .field("database", &self.database_name())
            .field("read_only", &self.is_read_only())
            .field("nested", &self.is_nested())
            .field("phase", &self.phase())
            .finish()
    }
}
