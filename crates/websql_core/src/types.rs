//! Identifier types.

use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a transaction.
///
/// Random (v4) so that ids of concurrently live transactions never collide,
/// including nested ones that share a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Generates a fresh transaction ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Savepoint name for this transaction: `<prefix><hex id>`.
    #[must_use]
    pub fn savepoint_name(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.0.simple())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Unique identifier for a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryId(Uuid);

impl QueryId {
    /// Generates a fresh query ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Backend-assigned connection token.
///
/// Kept as the exact JSON value the backend returned so it can be handed
/// back verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionId(Value);

impl ConnectionId {
    /// Wraps a raw connection value.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Extracts `connectionId` from a `connect` response.
    ///
    /// Falsy values (`null`, `false`, `0`, `""`) count as missing.
    #[must_use]
    pub fn from_response(response: &Value) -> Option<Self> {
        let raw = response.get("connectionId")?;
        truthy(raw).then(|| Self(raw.clone()))
    }

    /// The raw value.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

/// Backend flags follow JavaScript truthiness.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
