//! Named, optimistic transactions.
//!
//! A transaction stages its writes locally and publishes them on
//! commit, after validating that every touched key still matches the
//! snapshot captured when the transaction first staged it:
//! - **Staging**: writes accumulate per transaction, invisible to
//!   other readers (read-your-writes within the transaction).
//! - **Validation**: commit compares each snapshot against the store's
//!   current state and aborts on the first mismatch.
//! - **Ordering**: commits lock touched cells in the shared key order,
//!   so overlapping commits serialize without deadlocking.

mod manager;
mod state;

pub(crate) use manager::TransactionManager;
