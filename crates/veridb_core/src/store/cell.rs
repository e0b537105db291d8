//! Store cells: one committed value plus its locks and liveness flag.

use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};

/// The store-side record for one key.
///
/// A cell carries the committed value and the two locks that order its
/// mutation and visibility. The write lock serializes publication of a
/// new value or an erasure; the value lock (the read lock) serializes
/// readers against publication.
///
/// Lock ordering invariant: writers take the write lock before the
/// value lock; readers take only the value lock. A commit holds a
/// cell's write lock across validation and application, so readers stay
/// unblocked until the value itself is swapped.
#[derive(Debug)]
pub(crate) struct Cell {
    /// Committed value, guarded by the read lock.
    value: Mutex<Vec<u8>>,
    /// Write lock.
    write: Mutex<()>,
    /// False once the cell is tombstoned pending physical removal.
    /// Checked before taking either lock on a cell reached through a
    /// public read or write path.
    alive: AtomicBool,
}

impl Cell {
    pub(crate) fn new(value: Vec<u8>) -> Self {
        Self {
            value: Mutex::new(value),
            write: Mutex::new(()),
            alive: AtomicBool::new(true),
        }
    }

    /// Whether the cell is live. Tombstoned cells must not be observed
    /// through any public read path.
    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Acquires the write lock.
    pub(crate) fn lock_write(&self) -> MutexGuard<'_, ()> {
        self.write.lock()
    }

    /// Acquires the read lock, exposing the value it guards.
    pub(crate) fn lock_value(&self) -> MutexGuard<'_, Vec<u8>> {
        self.value.lock()
    }

    /// Returns an owned copy of the value, taken under the read lock.
    pub(crate) fn read(&self) -> Vec<u8> {
        self.lock_value().clone()
    }

    /// Publishes a new value under the read lock. The caller holds the
    /// write lock.
    pub(crate) fn publish(&self, value: Vec<u8>) {
        *self.lock_value() = value;
    }

    /// Tombstones the cell under the read lock. The caller holds the
    /// write lock; physical removal from the store happens after that
    /// lock is released.
    pub(crate) fn tombstone(&self) {
        let _value = self.lock_value();
        self.alive.store(false, Ordering::SeqCst);
    }
}
