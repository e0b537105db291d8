//! Core type definitions for VeriDB.

use std::borrow::Borrow;
use std::fmt;

/// Caller-supplied identifier for an interactive transaction.
///
/// IDs are opaque strings chosen by the client. Uniqueness across live
/// transactions is enforced at `begin`; once a transaction commits or
/// rolls back, its ID may be reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionId(String);

impl TransactionId {
    /// Creates a transaction ID from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for TransactionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// Lets the transaction table be queried with a bare `&str`.
impl Borrow<str> for TransactionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
