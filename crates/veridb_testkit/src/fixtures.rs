//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases and
//! common pre-populated scenarios.

use std::sync::Arc;
use veridb_core::Database;

/// Creates an empty test database.
#[must_use]
pub fn test_db() -> Database {
    Database::new()
}

/// Creates an empty test database behind an `Arc`, for threaded tests.
#[must_use]
pub fn shared_db() -> Arc<Database> {
    Arc::new(Database::new())
}

/// Runs a test against a fresh database.
///
/// # Example
///
/// ```rust,ignore
/// use veridb_testkit::with_db;
///
/// #[test]
/// fn my_test() {
///     with_db(|db| {
///         db.put("key", "value").unwrap();
///         // ... test operations
///     });
/// }
/// ```
pub fn with_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let db = test_db();
    f(&db)
}

/// Installs a `tracing` subscriber reading `RUST_LOG`, if none is set.
///
/// Call at the top of a test to see engine logs; repeated calls are
/// harmless.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a database holding `count` keys, `key_0..` mapped to
    /// `value_0..`.
    #[must_use]
    pub fn populated_db(count: usize) -> Database {
        let db = test_db();
        for i in 0..count {
            db.put(format!("key_{i}"), format!("value_{i}"))
                .expect("failed to populate database");
        }
        db
    }

    /// Seeds `keys` with `seed` as the value of each, through a single
    /// committed transaction.
    pub fn seed_keys(db: &Database, keys: &[&str], seed: &str) {
        db.transaction("seed", |txn| {
            for key in keys {
                txn.put(*key, seed)?;
            }
            Ok(())
        })
        .expect("failed to seed keys");
    }
}
