//! Transaction table and the commit protocol.

use crate::error::{CoreError, CoreResult};
use crate::store::{Cell, Store};
use crate::transaction::state::{Instruction, Transaction};
use crate::types::TransactionId;
use parking_lot::{MutexGuard, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};

/// Owns the table of active transactions and drives the commit
/// protocol against the store.
///
/// Commit is the center of gravity: staged instructions are validated
/// against the snapshots captured at staging time and applied under
/// per-cell write locks taken in the shared key order. The first
/// committer to pass validation on a key publishes; any later committer
/// whose snapshot no longer matches aborts.
pub(crate) struct TransactionManager {
    /// Shared store the transactions stage against.
    store: Arc<Store>,
    /// Active transactions by caller-supplied ID. The `RwLock` is the
    /// table-level guard: it serializes creation, removal, and the
    /// uniqueness check on begin.
    table: RwLock<HashMap<TransactionId, Arc<Transaction>>>,
}

impl TransactionManager {
    pub(crate) fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            table: RwLock::new(HashMap::new()),
        }
    }

    /// Starts a transaction under the caller-supplied ID.
    pub(crate) fn begin(&self, id: &str) -> CoreResult<()> {
        let mut table = self.table.write();
        if table.contains_key(id) {
            return Err(CoreError::transaction_exists(id));
        }
        table.insert(TransactionId::from(id), Arc::new(Transaction::new()));
        trace!(id, "transaction started");
        Ok(())
    }

    /// Invalidates a transaction and discards its staged state.
    pub(crate) fn rollback(&self, id: &str) -> CoreResult<()> {
        let txn = self
            .lookup(id)
            .ok_or_else(|| CoreError::transaction_not_found(id))?;
        {
            let _staging = txn.staging();
            txn.invalidate();
        }
        self.table.write().remove(id);
        trace!(id, "transaction rolled back");
        Ok(())
    }

    /// Stages a put against a live transaction.
    pub(crate) fn put(&self, id: &str, key: Vec<u8>, value: Vec<u8>) -> CoreResult<()> {
        let txn = self.live(id)?;
        let store = &self.store;
        txn.stage_put(key, value, |key| {
            store.live_cell(key).map(|cell| cell.read())
        });
        Ok(())
    }

    /// Reads a key through a live transaction: its own staged view
    /// first, the store otherwise.
    pub(crate) fn get(&self, id: &str, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        let txn = self.live(id)?;
        if let Some(staged) = txn.staged_get(key) {
            return Ok(staged);
        }
        Ok(self.store.get(key))
    }

    /// Flips an already-staged instruction to an erase.
    ///
    /// A key the transaction never touched is left alone, and an
    /// unknown transaction ID is also a no-op.
    pub(crate) fn erase(&self, id: &str, key: &[u8]) -> CoreResult<()> {
        if let Some(txn) = self.lookup(id) {
            txn.stage_erase(key);
        }
        Ok(())
    }

    /// Commits a transaction.
    ///
    /// Whether it publishes or aborts on conflict, the transaction
    /// leaves the table; only the benign race with a concurrent
    /// rollback returns without touching the store.
    pub(crate) fn commit(&self, id: &str) -> CoreResult<()> {
        let txn = self.live(id)?;
        let staging = txn.staging();

        // A rollback may have won the race between the liveness check
        // and the guard acquisition; treat its work as already done.
        if !txn.is_alive() {
            debug!(id, "commit raced a rollback, nothing to do");
            return Ok(());
        }

        let outcome = self.commit_staged(&staging);

        txn.invalidate();
        drop(staging);
        self.table.write().remove(id);

        match outcome {
            Ok(applied) => {
                debug!(id, instructions = applied, "transaction committed");
                Ok(())
            }
            Err(key) => {
                debug!(
                    id,
                    key = %String::from_utf8_lossy(&key),
                    "commit aborted on conflict"
                );
                Err(CoreError::transaction_conflict(id))
            }
        }
    }

    /// Runs the locking, validation+apply, and release passes over a
    /// staging map. Returns the number of applied instructions, or the
    /// first conflicting key.
    fn commit_staged(&self, staging: &BTreeMap<Vec<u8>, Instruction>) -> Result<usize, Vec<u8>> {
        // Locking pass, in key order. Every committer iterates the same
        // total order, so overlapping write-lock sets cannot deadlock.
        // Cells looked up here stay pinned by their `Arc` even if the
        // store drops them before the release pass.
        let cells: Vec<(&[u8], &Instruction, Option<Arc<Cell>>)> = staging
            .iter()
            .map(|(key, instruction)| (key.as_slice(), instruction, self.store.cell(key)))
            .collect();

        let mut guards: Vec<Option<MutexGuard<'_, ()>>> = Vec::with_capacity(cells.len());
        for (_, _, cell) in &cells {
            guards.push(match cell {
                Some(cell) if cell.is_alive() => Some(cell.lock_write()),
                _ => None,
            });
        }

        // Validation + apply pass, in key order. Stops at the first
        // staged key whose store state no longer matches its snapshot.
        let mut applied = 0;
        let mut conflict = None;
        for (key, instruction, _) in &cells {
            let current = self.store.live_cell(key);
            let clash = match (instruction.snapshot(), &current) {
                // Did not exist at first touch, exists now.
                (None, Some(_)) => true,
                // Existed at first touch, gone or tombstoned now.
                (Some(_), None) => true,
                // Tampered by another writer.
                (Some(snapshot), Some(cell)) => &cell.read() != snapshot,
                (None, None) => false,
            };
            if clash {
                conflict = Some(key.to_vec());
                break;
            }

            match instruction {
                Instruction::Put { value, .. } => match self.store.cell(key) {
                    Some(cell) => cell.publish(value.clone()),
                    None => self.store.insert_cell(key.to_vec(), value.clone()),
                },
                Instruction::Erase { .. } => {
                    if let Some(cell) = self.store.cell(key) {
                        cell.tombstone();
                    }
                }
            }
            applied += 1;
        }

        // Release pass, in reverse key order. Every write lock taken in
        // the locking pass is dropped, and each applied erase is
        // physically removed once its lock is no longer held.
        for index in (0..cells.len()).rev() {
            guards[index] = None;
            let (key, instruction, _) = &cells[index];
            if index < applied && matches!(instruction, Instruction::Erase { .. }) {
                self.store.remove_cell(key);
            }
        }

        match conflict {
            Some(key) => Err(key),
            None => Ok(applied),
        }
    }

    /// Looks up a transaction by ID, live or not.
    fn lookup(&self, id: &str) -> Option<Arc<Transaction>> {
        self.table.read().get(id).cloned()
    }

    /// Looks up a transaction that is present and alive.
    fn live(&self, id: &str) -> CoreResult<Arc<Transaction>> {
        self.lookup(id)
            .filter(|txn| txn.is_alive())
            .ok_or_else(|| CoreError::transaction_not_found(id))
    }

    /// Number of active transactions.
    pub(crate) fn active_count(&self) -> usize {
        self.table.read().len()
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("active_count", &self.active_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_manager() -> (Arc<Store>, TransactionManager) {
        let store = Arc::new(Store::new());
        let manager = TransactionManager::new(Arc::clone(&store));
        (store, manager)
    }

    #[test]
    fn begin_registers_transaction() {
        let (_, tm) = create_manager();
        tm.begin("abc").unwrap();
        assert_eq!(tm.active_count(), 1);
    }

    #[test]
    fn begin_twice_fails() {
        let (_, tm) = create_manager();
        tm.begin("abc").unwrap();
        let result = tm.begin("abc");
        assert_eq!(result, Err(CoreError::transaction_exists("abc")));
    }

    #[test]
    fn begin_after_rollback_reuses_id() {
        let (_, tm) = create_manager();
        tm.begin("abc").unwrap();
        tm.rollback("abc").unwrap();
        tm.begin("abc").unwrap();
        assert_eq!(tm.active_count(), 1);
    }

    #[test]
    fn rollback_unknown_transaction_fails() {
        let (_, tm) = create_manager();
        let result = tm.rollback("abc");
        assert_eq!(result, Err(CoreError::transaction_not_found("abc")));
    }

    #[test]
    fn staged_write_is_invisible_until_commit() {
        let (store, tm) = create_manager();
        tm.begin("abc").unwrap();
        tm.put("abc", b"a".to_vec(), b"foo".to_vec()).unwrap();

        assert_eq!(tm.get("abc", b"a").unwrap(), Some(b"foo".to_vec()));
        assert_eq!(store.get(b"a"), None);
    }

    #[test]
    fn transactional_get_falls_through_for_untouched_keys() {
        let (store, tm) = create_manager();
        store.put(b"a".to_vec(), b"bar".to_vec()).unwrap();
        tm.begin("abc").unwrap();
        assert_eq!(tm.get("abc", b"a").unwrap(), Some(b"bar".to_vec()));
    }

    #[test]
    fn operations_on_unknown_transaction_fail() {
        let (_, tm) = create_manager();
        assert_eq!(
            tm.put("abc", b"a".to_vec(), b"foo".to_vec()),
            Err(CoreError::transaction_not_found("abc"))
        );
        assert_eq!(
            tm.get("abc", b"a"),
            Err(CoreError::transaction_not_found("abc"))
        );
    }

    #[test]
    fn erase_on_unknown_transaction_is_noop() {
        let (_, tm) = create_manager();
        tm.erase("abc", b"a").unwrap();
    }

    #[test]
    fn commit_publishes_staged_writes() {
        let (store, tm) = create_manager();
        tm.begin("xyz").unwrap();
        tm.put("xyz", b"a".to_vec(), b"bar".to_vec()).unwrap();
        tm.commit("xyz").unwrap();

        assert_eq!(store.get(b"a"), Some(b"bar".to_vec()));
        assert_eq!(tm.active_count(), 0);
    }

    #[test]
    fn commit_of_empty_transaction_succeeds() {
        let (_, tm) = create_manager();
        tm.begin("abc").unwrap();
        tm.commit("abc").unwrap();
        assert_eq!(tm.active_count(), 0);
    }

    #[test]
    fn commit_applies_staged_erase() {
        let (store, tm) = create_manager();
        store.put(b"a".to_vec(), b"foo".to_vec()).unwrap();

        tm.begin("abc").unwrap();
        tm.put("abc", b"a".to_vec(), b"tmp".to_vec()).unwrap();
        tm.erase("abc", b"a").unwrap();
        tm.commit("abc").unwrap();

        assert_eq!(store.get(b"a"), None);
        // The erase is physically removed, not just tombstoned.
        assert!(store.cell(b"a").is_none());
    }

    #[test]
    fn commit_conflicts_when_value_tampered() {
        let (store, tm) = create_manager();
        store.put(b"a".to_vec(), b"foo".to_vec()).unwrap();

        tm.begin("abc").unwrap();
        tm.put("abc", b"a".to_vec(), b"staged".to_vec()).unwrap();

        // Another writer changes the key after the snapshot was taken.
        store.put(b"a".to_vec(), b"bar".to_vec()).unwrap();

        let result = tm.commit("abc");
        assert_eq!(result, Err(CoreError::transaction_conflict("abc")));
        assert_eq!(store.get(b"a"), Some(b"bar".to_vec()));
    }

    #[test]
    fn commit_conflicts_when_key_created_since_snapshot() {
        let (store, tm) = create_manager();
        tm.begin("abc").unwrap();
        tm.put("abc", b"a".to_vec(), b"staged".to_vec()).unwrap();

        store.put(b"a".to_vec(), b"bar".to_vec()).unwrap();

        assert!(tm.commit("abc").is_err());
        assert_eq!(store.get(b"a"), Some(b"bar".to_vec()));
    }

    #[test]
    fn commit_conflicts_when_key_erased_since_snapshot() {
        let (store, tm) = create_manager();
        store.put(b"a".to_vec(), b"foo".to_vec()).unwrap();

        tm.begin("abc").unwrap();
        tm.put("abc", b"a".to_vec(), b"staged".to_vec()).unwrap();

        store.erase(b"a");

        assert!(tm.commit("abc").is_err());
        assert_eq!(store.get(b"a"), None);
    }

    #[test]
    fn conflicting_transaction_is_removed_from_table() {
        let (store, tm) = create_manager();
        store.put(b"a".to_vec(), b"foo".to_vec()).unwrap();
        tm.begin("abc").unwrap();
        tm.put("abc", b"a".to_vec(), b"staged".to_vec()).unwrap();
        store.put(b"a".to_vec(), b"bar".to_vec()).unwrap();

        assert!(tm.commit("abc").is_err());
        assert_eq!(tm.active_count(), 0);
        assert_eq!(
            tm.commit("abc"),
            Err(CoreError::transaction_not_found("abc"))
        );
    }

    #[test]
    fn commit_after_rollback_fails() {
        let (_, tm) = create_manager();
        tm.begin("abc").unwrap();
        tm.put("abc", b"a".to_vec(), b"foo".to_vec()).unwrap();
        tm.rollback("abc").unwrap();

        assert_eq!(
            tm.commit("abc"),
            Err(CoreError::transaction_not_found("abc"))
        );
    }

    #[test]
    fn rollback_discards_staged_writes() {
        let (store, tm) = create_manager();
        tm.begin("abc").unwrap();
        tm.put("abc", b"a".to_vec(), b"foo".to_vec()).unwrap();
        tm.rollback("abc").unwrap();

        assert_eq!(store.get(b"a"), None);
        assert_eq!(
            tm.put("abc", b"a".to_vec(), b"foo".to_vec()),
            Err(CoreError::transaction_not_found("abc"))
        );
    }

    #[test]
    fn commit_publishes_multiple_keys_in_order() {
        let (store, tm) = create_manager();
        tm.begin("def").unwrap();
        tm.put("def", b"d".to_vec(), b"4".to_vec()).unwrap();
        tm.put("def", b"b".to_vec(), b"2".to_vec()).unwrap();
        tm.put("def", b"c".to_vec(), b"3".to_vec()).unwrap();
        tm.commit("def").unwrap();

        assert_eq!(store.get(b"b"), Some(b"2".to_vec()));
        assert_eq!(store.get(b"c"), Some(b"3".to_vec()));
        assert_eq!(store.get(b"d"), Some(b"4".to_vec()));
    }

    #[test]
    fn conflict_stops_apply_at_first_clash() {
        let (store, tm) = create_manager();
        store.put(b"a".to_vec(), b"foo".to_vec()).unwrap();

        tm.begin("abc").unwrap();
        tm.put("abc", b"a".to_vec(), b"staged-a".to_vec()).unwrap();
        tm.put("abc", b"z".to_vec(), b"staged-z".to_vec()).unwrap();

        // Clash on the first key in order; nothing may be applied.
        store.put(b"a".to_vec(), b"bar".to_vec()).unwrap();

        assert!(tm.commit("abc").is_err());
        assert_eq!(store.get(b"a"), Some(b"bar".to_vec()));
        assert_eq!(store.get(b"z"), None);
    }

    #[test]
    fn staged_erase_validates_against_current_store() {
        let (store, tm) = create_manager();
        store.put(b"a".to_vec(), b"foo".to_vec()).unwrap();

        // Stage a put, flip it to an erase, then have another writer
        // tamper with the key: the commit must abort.
        tm.begin("abc").unwrap();
        tm.put("abc", b"a".to_vec(), b"tmp".to_vec()).unwrap();
        tm.erase("abc", b"a").unwrap();
        store.put(b"a".to_vec(), b"bar".to_vec()).unwrap();

        assert!(tm.commit("abc").is_err());
        assert_eq!(store.get(b"a"), Some(b"bar".to_vec()));
    }
}
