//! Error types for the coordinator.

use thiserror::Error;
use websql_bridge::BridgeError;

/// Result type for coordinator operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while coordinating transactions.
///
/// Transaction-level errors reach the caller only through the error
/// callback of the transaction they belong to.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The database name was empty.
    #[error("database name can't be null or empty")]
    InvalidDatabaseName,

    /// The backend could not open or assign a connection.
    #[error("could not establish connection to {database}: {reason}")]
    ConnectionFailed {
        /// Database name.
        database: String,
        /// Why the connection failed.
        reason: String,
    },

    /// The savepoint marker that begins a transaction was rejected.
    #[error("savepoint {savepoint} rejected: {reason}")]
    SavepointFailed {
        /// Savepoint name.
        savepoint: String,
        /// Backend message.
        reason: String,
    },

    /// A single statement failed.
    #[error("statement failed ({sql}): {reason}")]
    StatementFailed {
        /// SQL text of the statement.
        sql: String,
        /// Backend message.
        reason: String,
    },

    /// The transaction body returned an error or panicked.
    #[error("transaction body failed: {reason}")]
    BodyFailed {
        /// Description of the failure.
        reason: String,
    },

    /// Operation not permitted in the current transaction state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Why the operation is not permitted.
        message: String,
    },

    /// The backend answered with a payload of the wrong shape.
    #[error("invalid {action} response: {reason}")]
    InvalidResponse {
        /// Bridge action that produced the payload.
        action: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A bridge call outside any transaction failed.
    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// A row could not be decoded into the requested type.
    #[error("row decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

impl CoreError {
    /// Creates a connection failure.
    pub fn connection_failed(database: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            database: database.into(),
            reason: reason.into(),
        }
    }

    /// Creates a savepoint failure.
    pub fn savepoint_failed(savepoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SavepointFailed {
            savepoint: savepoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates a statement failure.
    pub fn statement_failed(sql: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StatementFailed {
            sql: sql.into(),
            reason: reason.into(),
        }
    }

    /// Creates a body failure. Transaction bodies return this to abort.
    pub fn body_failed(reason: impl Into<String>) -> Self {
        Self::BodyFailed {
            reason: reason.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    pub fn invalid_response(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error was raised before the body could run.
    #[must_use]
    pub fn is_begin_failure(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::SavepointFailed { .. }
        )
    }
}
