//! Per-transaction staged state.

use parking_lot::{Mutex, MutexGuard};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// One staged mutation within a transaction.
///
/// Every instruction carries the snapshot of the key's committed value
/// at the moment the transaction first touched the key: `None` if no
/// live cell existed then, `Some(bytes)` otherwise. Re-staging a key
/// replaces the operation but never the snapshot; commit validates the
/// snapshot against the store's current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Instruction {
    /// Publish a new value on commit.
    Put {
        /// The value to publish.
        value: Vec<u8>,
        /// Committed value at first touch, if a live cell existed.
        snapshot: Option<Vec<u8>>,
    },
    /// Tombstone and remove the key on commit.
    Erase {
        /// Committed value at first touch, if a live cell existed.
        snapshot: Option<Vec<u8>>,
    },
}

impl Instruction {
    /// Returns the snapshot captured at first touch.
    pub(crate) fn snapshot(&self) -> Option<&Vec<u8>> {
        match self {
            Self::Put { snapshot, .. } | Self::Erase { snapshot } => snapshot.as_ref(),
        }
    }
}

/// The staged write-set for one in-flight transaction.
///
/// Mutations made through a transaction accumulate here and stay
/// invisible to every other reader until commit publishes them.
pub(crate) struct Transaction {
    /// Staged instructions, keyed in the same total order the store
    /// uses. The mutex is the per-transaction guard: it serializes
    /// staging mutations and the commit pass over this map.
    staging: Mutex<BTreeMap<Vec<u8>, Instruction>>,
    /// False once rollback or commit tear-down has invalidated the
    /// transaction. Checked before taking the guard and again under it.
    alive: AtomicBool,
}

impl Transaction {
    pub(crate) fn new() -> Self {
        Self {
            staging: Mutex::new(BTreeMap::new()),
            alive: AtomicBool::new(true),
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Marks the transaction as torn down. Holders of a reference must
    /// not act on its staging afterwards.
    pub(crate) fn invalidate(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Acquires the per-transaction guard, exposing the staging map.
    pub(crate) fn staging(&self) -> MutexGuard<'_, BTreeMap<Vec<u8>, Instruction>> {
        self.staging.lock()
    }

    /// Stages a put under the guard.
    ///
    /// `snapshot_of` supplies the store's current value for the key and
    /// is consulted only on first touch; a re-staged key keeps the
    /// snapshot it already captured.
    pub(crate) fn stage_put<F>(&self, key: Vec<u8>, value: Vec<u8>, snapshot_of: F)
    where
        F: FnOnce(&[u8]) -> Option<Vec<u8>>,
    {
        let mut staging = self.staging();
        match staging.entry(key) {
            Entry::Occupied(mut entry) => {
                let snapshot = entry.get().snapshot().cloned();
                entry.insert(Instruction::Put { value, snapshot });
            }
            Entry::Vacant(entry) => {
                let snapshot = snapshot_of(entry.key());
                entry.insert(Instruction::Put { value, snapshot });
            }
        }
    }

    /// Flips an already-staged instruction to an erase, keeping its
    /// snapshot. A key the transaction never touched stages nothing.
    pub(crate) fn stage_erase(&self, key: &[u8]) {
        let mut staging = self.staging();
        if let Some(instruction) = staging.get_mut(key) {
            let snapshot = instruction.snapshot().cloned();
            *instruction = Instruction::Erase { snapshot };
        }
    }

    /// Returns the transaction's own view of a staged key.
    ///
    /// `Some(Some(value))` for a staged put, `Some(None)` for a staged
    /// erase, `None` if the transaction has not touched the key.
    pub(crate) fn staged_get(&self, key: &[u8]) -> Option<Option<Vec<u8>>> {
        let staging = self.staging();
        staging.get(key).map(|instruction| match instruction {
            Instruction::Put { value, .. } => Some(value.clone()),
            Instruction::Erase { .. } => None,
        })
    }

    /// Number of staged instructions.
    pub(crate) fn write_count(&self) -> usize {
        self.staging().len()
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("alive", &self.is_alive())
            .field("write_count", &self.write_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_transaction_is_alive_and_empty() {
        let txn = Transaction::new();
        assert!(txn.is_alive());
        assert_eq!(txn.write_count(), 0);
    }

    #[test]
    fn stage_put_records_instruction() {
        let txn = Transaction::new();
        txn.stage_put(b"a".to_vec(), b"foo".to_vec(), |_| None);

        assert_eq!(txn.write_count(), 1);
        assert_eq!(txn.staged_get(b"a"), Some(Some(b"foo".to_vec())));
    }

    #[test]
    fn snapshot_is_taken_once() {
        let txn = Transaction::new();
        txn.stage_put(b"a".to_vec(), b"foo".to_vec(), |_| Some(b"old".to_vec()));
        // The second staging's snapshot closure must not be consulted.
        txn.stage_put(b"a".to_vec(), b"bar".to_vec(), |_| {
            panic!("snapshot re-captured on re-staging")
        });

        let staging = txn.staging();
        let instruction = staging.get(b"a".as_slice()).unwrap();
        assert_eq!(instruction.snapshot(), Some(&b"old".to_vec()));
        assert!(matches!(instruction, Instruction::Put { value, .. } if value == b"bar"));
    }

    #[test]
    fn erase_flip_keeps_snapshot() {
        let txn = Transaction::new();
        txn.stage_put(b"a".to_vec(), b"foo".to_vec(), |_| Some(b"old".to_vec()));
        txn.stage_erase(b"a");

        let staging = txn.staging();
        let instruction = staging.get(b"a".as_slice()).unwrap();
        assert_eq!(
            instruction,
            &Instruction::Erase {
                snapshot: Some(b"old".to_vec())
            }
        );
    }

    #[test]
    fn erase_of_untouched_key_stages_nothing() {
        let txn = Transaction::new();
        txn.stage_erase(b"a");
        assert_eq!(txn.write_count(), 0);
        assert_eq!(txn.staged_get(b"a"), None);
    }

    #[test]
    fn staged_erase_reads_as_absent() {
        let txn = Transaction::new();
        txn.stage_put(b"a".to_vec(), b"foo".to_vec(), |_| None);
        txn.stage_erase(b"a");
        assert_eq!(txn.staged_get(b"a"), Some(None));
    }

    #[test]
    fn put_after_erase_restages_value() {
        let txn = Transaction::new();
        txn.stage_put(b"a".to_vec(), b"foo".to_vec(), |_| Some(b"old".to_vec()));
        txn.stage_erase(b"a");
        txn.stage_put(b"a".to_vec(), b"baz".to_vec(), |_| None);

        assert_eq!(txn.staged_get(b"a"), Some(Some(b"baz".to_vec())));
        let staging = txn.staging();
        // Snapshot survives the whole put → erase → put chain.
        assert_eq!(
            staging.get(b"a".as_slice()).unwrap().snapshot(),
            Some(&b"old".to_vec())
        );
    }

    #[test]
    fn one_instruction_per_key() {
        let txn = Transaction::new();
        txn.stage_put(b"a".to_vec(), b"1".to_vec(), |_| None);
        txn.stage_put(b"a".to_vec(), b"2".to_vec(), |_| None);
        txn.stage_put(b"b".to_vec(), b"3".to_vec(), |_| None);
        assert_eq!(txn.write_count(), 2);
    }

    #[test]
    fn staging_iterates_in_key_order() {
        let txn = Transaction::new();
        txn.stage_put(b"c".to_vec(), b"3".to_vec(), |_| None);
        txn.stage_put(b"a".to_vec(), b"1".to_vec(), |_| None);
        txn.stage_put(b"b".to_vec(), b"2".to_vec(), |_| None);

        let keys: Vec<Vec<u8>> = txn.staging().keys().cloned().collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn invalidate_clears_liveness() {
        let txn = Transaction::new();
        txn.invalidate();
        assert!(!txn.is_alive());
    }
}
