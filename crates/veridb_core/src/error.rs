//! Error types for the VeriDB core engine.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in VeriDB core operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A transaction with this ID is already active.
    #[error("transaction already exists: {id}")]
    TransactionExists {
        /// The duplicate transaction ID.
        id: String,
    },

    /// The transaction ID is unknown or the transaction was invalidated
    /// by a rollback or a completed commit.
    #[error("no such transaction: {id}")]
    TransactionNotFound {
        /// The offending transaction ID.
        id: String,
    },

    /// A put targeted a key whose cell is tombstoned pending physical
    /// removal.
    #[error("put failed on key '{key}': zombie key")]
    ZombieKey {
        /// The key, rendered lossily for display.
        key: String,
    },

    /// Commit found a staged key whose store state no longer matches
    /// the snapshot captured when the transaction first touched it.
    #[error("transaction '{id}' commits on tampered data: transaction aborted")]
    TransactionConflict {
        /// The aborted transaction ID.
        id: String,
    },

    /// A non-transactional put did not observe its own value on the
    /// post-publication recheck.
    #[error("put failed on key '{key}': could not complete")]
    PutIncomplete {
        /// The key, rendered lossily for display.
        key: String,
    },
}

impl CoreError {
    /// Creates a duplicate-transaction error.
    pub fn transaction_exists(id: impl Into<String>) -> Self {
        Self::TransactionExists { id: id.into() }
    }

    /// Creates an unknown-transaction error.
    pub fn transaction_not_found(id: impl Into<String>) -> Self {
        Self::TransactionNotFound { id: id.into() }
    }

    /// Creates a zombie-key error.
    pub fn zombie_key(key: &[u8]) -> Self {
        Self::ZombieKey {
            key: String::from_utf8_lossy(key).into_owned(),
        }
    }

    /// Creates a commit-conflict error.
    pub fn transaction_conflict(id: impl Into<String>) -> Self {
        Self::TransactionConflict { id: id.into() }
    }

    /// Creates a put-incomplete error.
    pub fn put_incomplete(key: &[u8]) -> Self {
        Self::PutIncomplete {
            key: String::from_utf8_lossy(key).into_owned(),
        }
    }

    /// Check if this error is a commit conflict.
    ///
    /// Conflicts are retryable: the caller may begin a fresh transaction
    /// and re-stage against current data.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::TransactionConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        let err = CoreError::transaction_not_found("abc");
        assert_eq!(err.to_string(), "no such transaction: abc");

        let err = CoreError::zombie_key(b"example");
        assert_eq!(err.to_string(), "put failed on key 'example': zombie key");
    }

    #[test]
    fn conflict_is_retryable() {
        assert!(CoreError::transaction_conflict("abc").is_conflict());
        assert!(!CoreError::transaction_not_found("abc").is_conflict());
    }

    #[test]
    fn non_utf8_keys_render_lossily() {
        let err = CoreError::zombie_key(&[0xff, 0xfe]);
        assert!(matches!(err, CoreError::ZombieKey { .. }));
    }
}
