//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random keys, values, transaction
//! IDs, and operation sequences.

use proptest::prelude::*;

/// Strategy for generating keys: non-empty, arbitrary bytes.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..64)
}

/// Strategy for generating values: non-empty, arbitrary bytes.
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..256)
}

/// Strategy for generating transaction IDs.
pub fn transaction_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// One randomly generated store operation.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Put a key.
    Put {
        /// Target key.
        key: Vec<u8>,
        /// Value to publish.
        value: Vec<u8>,
    },
    /// Erase a key.
    Erase {
        /// Target key.
        key: Vec<u8>,
    },
    /// Read a key.
    Get {
        /// Target key.
        key: Vec<u8>,
    },
}

/// Strategy for generating store operations, weighted towards puts.
pub fn operation_strategy() -> impl Strategy<Value = StoreOperation> {
    prop_oneof![
        3 => (key_strategy(), value_strategy())
            .prop_map(|(key, value)| StoreOperation::Put { key, value }),
        1 => key_strategy().prop_map(|key| StoreOperation::Erase { key }),
        2 => key_strategy().prop_map(|key| StoreOperation::Get { key }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<StoreOperation>> {
    prop::collection::vec(operation_strategy(), min_ops..max_ops)
}
