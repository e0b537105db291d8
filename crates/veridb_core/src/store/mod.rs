//! The authoritative key-value store.
//!
//! The store maps keys to [`Cell`]s in a `BTreeMap`, so the store and
//! every transaction's staging area share one total key order. That
//! shared order is what lets concurrent commits acquire per-cell write
//! locks without deadlocking.

mod cell;

pub(crate) use cell::Cell;

use crate::error::{CoreError, CoreResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The authoritative mapping from keys to value cells.
pub(crate) struct Store {
    /// Cell map. The `RwLock` is the store-level guard: structural
    /// mutation (cell insertion and removal) takes the write half, cell
    /// lookup takes the read half. Per-cell operations need no store
    /// guard once the `Arc` has been cloned out.
    cells: RwLock<BTreeMap<Vec<u8>, Arc<Cell>>>,
}

impl Store {
    pub(crate) fn new() -> Self {
        Self {
            cells: RwLock::new(BTreeMap::new()),
        }
    }

    /// Looks up the cell for a key, live or tombstoned.
    pub(crate) fn cell(&self, key: &[u8]) -> Option<Arc<Cell>> {
        self.cells.read().get(key).cloned()
    }

    /// Looks up the cell for a key if it is live.
    pub(crate) fn live_cell(&self, key: &[u8]) -> Option<Arc<Cell>> {
        self.cell(key).filter(|cell| cell.is_alive())
    }

    /// Inserts a fresh cell, replacing whatever was under the key.
    pub(crate) fn insert_cell(&self, key: Vec<u8>, value: Vec<u8>) {
        self.cells.write().insert(key, Arc::new(Cell::new(value)));
    }

    /// Physically removes a cell.
    pub(crate) fn remove_cell(&self, key: &[u8]) {
        self.cells.write().remove(key);
    }

    /// Publishes `value` at `key` outside any transaction.
    ///
    /// An existing live cell is overwritten under its write and read
    /// locks; a missing cell is inserted under the store guard. A
    /// tombstoned cell rejects the write with [`CoreError::ZombieKey`].
    pub(crate) fn put(&self, key: Vec<u8>, value: Vec<u8>) -> CoreResult<()> {
        match self.cell(&key) {
            Some(cell) if !cell.is_alive() => return Err(CoreError::zombie_key(&key)),
            Some(cell) => {
                let _write = cell.lock_write();
                cell.publish(value.clone());
            }
            None => {
                // First writer wins the insert; a lost race surfaces in
                // the recheck below.
                self.cells
                    .write()
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Cell::new(value.clone())));
            }
        }

        // Post-publication recheck under the write lock. Only a racing
        // writer that replaced the value can trip this.
        let cell = self
            .cell(&key)
            .ok_or_else(|| CoreError::put_incomplete(&key))?;
        let _write = cell.lock_write();
        if cell.read() != value {
            return Err(CoreError::put_incomplete(&key));
        }
        Ok(())
    }

    /// Returns an owned copy of the value under `key`, or `None` if no
    /// live cell exists.
    pub(crate) fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.live_cell(key).map(|cell| cell.read())
    }

    /// Removes the value under `key`. Erasing a missing or tombstoned
    /// key is a no-op.
    pub(crate) fn erase(&self, key: &[u8]) {
        let Some(cell) = self.live_cell(key) else {
            return;
        };
        let _write = cell.lock_write();
        let _value = cell.lock_value();
        self.cells.write().remove(key);
    }

    /// Number of live cells.
    pub(crate) fn len(&self) -> usize {
        self.cells
            .read()
            .values()
            .filter(|cell| cell.is_alive())
            .count()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
