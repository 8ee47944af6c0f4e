//! # WebSQL Testkit
//!
//! Test utilities for the WebSQL shim.
//!
//! This crate provides:
//! - A harness wiring the coordinator to a scripted backend
//! - An ordered callback log
//! - Property-based generators for statement plans and completion orders
//! - In-process `Exec` plugins and native channels for integration tests
//! - Stress runs for queue and callback accounting
//!
//! ## Usage
//!
//! ```rust
//! use websql_testkit::prelude::*;
//!
//! let harness = TestHarness::immediate();
//! let db = harness.open("notes");
//! harness.submit(&db, "t1", &["INSERT INTO notes VALUES (1)"]);
//! assert!(harness.log.contains("t1 success"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
