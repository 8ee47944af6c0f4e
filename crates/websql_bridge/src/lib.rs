//! # WebSQL Bridge
//!
//! The command primitive underneath the WebSQL shim.
//!
//! A bridge accepts one command at a time (`service`, `action`, JSON
//! arguments) and eventually runs exactly one of two continuations. It has
//! no notion of transactions, ordering between commands, or cancellation;
//! the coordinator in `websql_core` builds those on top.
//!
//! ## Available Ports
//!
//! - [`Exec`] - routes to in-process [`Plugin`]s, then to a [`NativeChannel`]
//! - [`ScriptedBridge`] - rule-driven backend for tests, benches and the CLI
//!
//! ## Example
//!
//! ```rust
//! use websql_bridge::{BridgePort, Callbacks, Invocation, ScriptedBridge};
//! use serde_json::json;
//!
//! let bridge = ScriptedBridge::new();
//! bridge.invoke(
//!     Invocation::new("WebSql", "connect", vec![json!("notes")]),
//!     Callbacks::new(|value| assert_eq!(value["connectionId"], 1), |_| {}),
//! );
//! assert_eq!(bridge.calls().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod exec;
mod mock;
mod port;
mod registry;
mod status;

pub use error::{BridgeError, BridgeResult};
pub use exec::{Exec, NativeChannel, Plugin, Responder};
pub use mock::{OpenFlag, Outcome, RecordedCall, Resolution, ScriptedBridge};
pub use port::{BridgePort, Callbacks, ErrorFn, Invocation, SuccessFn};
pub use registry::CallbackRegistry;
pub use status::{CallbackStatus, ImmediateResult};
