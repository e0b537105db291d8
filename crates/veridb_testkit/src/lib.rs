//! # VeriDB Testkit
//!
//! Test utilities for VeriDB.
//!
//! This crate provides:
//! - Test fixtures and database helpers
//! - Property-based test generators using proptest
//! - Stress and commit-race harnesses for concurrency testing
//!
//! ## Usage
//!
//! ```rust,ignore
//! use veridb_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_database() {
//!     with_db(|db| {
//!         db.put("key", "value").unwrap();
//!         // ... test operations
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
