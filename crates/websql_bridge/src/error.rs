//! Error types for bridge operations.

use serde_json::Value;
use thiserror::Error;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors delivered through a bridge error continuation.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The backend rejected the command.
    #[error("backend rejected call: {message}")]
    Rejected {
        /// Human-readable message extracted from the payload.
        message: String,
        /// The raw error payload reported by the backend.
        payload: Value,
    },

    /// No plugin or native handler exists for the service/action pair.
    #[error("function {service}::{action} cannot be found")]
    NotFound {
        /// Service name.
        service: String,
        /// Action name.
        action: String,
    },

    /// The native channel raised while the command was being submitted.
    #[error("native channel error: {0}")]
    Native(String),

    /// Arguments could not be serialized for the native channel.
    #[error("argument serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BridgeError {
    /// Creates a rejection from a backend error payload.
    ///
    /// The message is taken from a string payload, from the `message`
    /// field of an object payload, or from the JSON text otherwise.
    pub fn rejected(payload: Value) -> Self {
        let message = match &payload {
            Value::String(s) => s.clone(),
            Value::Object(map) => match map.get("message") {
                Some(Value::String(s)) => s.clone(),
                _ => payload.to_string(),
            },
            other => other.to_string(),
        };
        Self::Rejected { message, payload }
    }

    /// Creates a not-found error.
    pub fn not_found(service: impl Into<String>, action: impl Into<String>) -> Self {
        Self::NotFound {
            service: service.into(),
            action: action.into(),
        }
    }

    /// Returns the backend payload for rejections.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Rejected { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// The backend's own message for rejections, the full description
    /// otherwise.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejected_message_from_string() {
        let err = BridgeError::rejected(json!("no such table: t"));
        assert_eq!(err.to_string(), "backend rejected call: no such table: t");
    }

    #[test]
    fn rejected_message_from_object() {
        let err = BridgeError::rejected(json!({ "code": 5, "message": "constraint failed" }));
        assert!(err.to_string().contains("constraint failed"));
        assert_eq!(err.payload().unwrap()["code"], 5);
        assert_eq!(err.reason(), "constraint failed");
    }

    #[test]
    fn rejected_message_from_other_payload() {
        let err = BridgeError::rejected(json!(42));
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn not_found_display() {
        let err = BridgeError::not_found("WebSql", "vacuum");
        assert_eq!(err.to_string(), "function WebSql::vacuum cannot be found");
        assert!(err.payload().is_none());
        assert_eq!(err.reason(), err.to_string());
    }
}
