//! Immediate status returned by a bridge submission.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status code reported synchronously by a bridge call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallbackStatus {
    /// The call was accepted; its continuation fires later.
    NoResult,
    /// The call completed synchronously with a value.
    Ok,
    /// No handler exists for the requested service/action.
    ClassNotFound,
    /// The call failed synchronously.
    Error,
}

impl CallbackStatus {
    /// Returns the wire code of the status.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::NoResult => 0,
            Self::Ok => 1,
            Self::ClassNotFound => 2,
            Self::Error => 9,
        }
    }

    /// Parses a wire code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::NoResult),
            1 => Some(Self::Ok),
            2 => Some(Self::ClassNotFound),
            9 => Some(Self::Error),
            _ => None,
        }
    }
}

/// What a bridge submission returns before any continuation runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmediateResult {
    /// Status of the submission.
    pub status: CallbackStatus,
    /// Value (for `Ok`) or diagnostic (for the failure statuses).
    pub message: Option<Value>,
}

impl ImmediateResult {
    /// A synchronous success carrying `value`.
    #[must_use]
    pub fn ok(value: Value) -> Self {
        Self {
            status: CallbackStatus::Ok,
            message: Some(value),
        }
    }

    /// The call is pending.
    #[must_use]
    pub fn no_result() -> Self {
        Self {
            status: CallbackStatus::NoResult,
            message: None,
        }
    }

    /// No handler was found.
    #[must_use]
    pub fn class_not_found(message: impl Into<String>) -> Self {
        Self {
            status: CallbackStatus::ClassNotFound,
            message: Some(Value::String(message.into())),
        }
    }

    /// The call failed synchronously.
    #[must_use]
    pub fn error(message: Value) -> Self {
        Self {
            status: CallbackStatus::Error,
            message: Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for status in [
            CallbackStatus::NoResult,
            CallbackStatus::Ok,
            CallbackStatus::ClassNotFound,
            CallbackStatus::Error,
        ] {
            assert_eq!(CallbackStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(CallbackStatus::from_code(4), None);
    }

    #[test]
    fn constructors() {
        assert_eq!(ImmediateResult::no_result().message, None);
        assert_eq!(
            ImmediateResult::ok(Value::Bool(true)).status,
            CallbackStatus::Ok
        );
        let nf = ImmediateResult::class_not_found("missing");
        assert_eq!(nf.message, Some(Value::String("missing".into())));
    }
}
