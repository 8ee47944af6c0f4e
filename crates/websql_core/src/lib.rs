//! # WebSQL Core
//!
//! Transaction and query coordinator for the WebSQL shim.
//!
//! The backend behind a [`websql_bridge::BridgePort`] knows only single
//! commands. This crate provides on top of it:
//! - Per-database FIFO of root transactions
//! - Connection acquisition and a savepoint marker per transaction
//! - Completion tracking across statements that finish in any order
//! - Nested transactions on the parent's connection
//! - A key/value store façade
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use websql_core::{StatementCallbacks, TransactionCallbacks, WebSql};
//! use websql_core::websql_bridge::ScriptedBridge;
//!
//! let bridge = Arc::new(ScriptedBridge::new());
//! bridge.rows_for("SELECT", vec![json!({ "id": 1, "body": "hello" })]);
//!
//! let websql = WebSql::new(Arc::clone(&bridge));
//! let db = websql.open_database("notes", "1.0", "Notes", 1024).unwrap();
//!
//! db.transaction(
//!     |tx| {
//!         tx.execute("INSERT INTO notes (body) VALUES (?)", vec![json!("hello")])?;
//!         tx.execute_sql(
//!             "SELECT * FROM notes",
//!             vec![],
//!             StatementCallbacks::new().on_success(|_, rs| assert_eq!(rs.rows().len(), 1)),
//!         )?;
//!         Ok(())
//!     },
//!     TransactionCallbacks::new().on_success(|| println!("done")),
//! );
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod error;
mod guard;
mod kv;
mod queue;
mod result;
mod transaction;
mod types;
mod websql;

pub use config::{Config, CreationSignal, QueueScope};
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use kv::KeyValueStore;
pub use result::{ResultSet, Rows};
pub use transaction::{
    StatementCallbacks, Transaction, TransactionBody, TransactionCallbacks, TransactionPhase,
};
pub use types::{ConnectionId, QueryId, TransactionId};
pub use websql::WebSql;

pub use websql_bridge;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
