//! Database facade.

use crate::error::CoreResult;
use crate::store::Store;
use crate::transaction::TransactionManager;
use crate::types::TransactionId;
use std::sync::Arc;

/// The main database handle.
///
/// `Database` is the primary entry point for VeriDB. It owns the
/// authoritative store and the transaction table, and exposes point
/// reads and writes alongside named, optimistic transactions.
///
/// # Example
///
/// ```
/// use veridb_core::Database;
///
/// let db = Database::new();
/// db.put("example", "foo")?;
/// assert_eq!(db.get("example"), Some(b"foo".to_vec()));
///
/// db.begin("abc")?;
/// db.put_in("abc", "example", "bar")?;
/// // Staged writes are invisible until commit.
/// assert_eq!(db.get("example"), Some(b"foo".to_vec()));
/// db.commit("abc")?;
/// assert_eq!(db.get("example"), Some(b"bar".to_vec()));
/// # Ok::<(), veridb_core::CoreError>(())
/// ```
///
/// # Thread Safety
///
/// All operations take `&self`; a `Database` may be shared across
/// threads (typically behind an `Arc`). Concurrent commits of
/// overlapping transactions are serialized per key; the first to pass
/// validation publishes, later ones abort with a conflict.
pub struct Database {
    /// The authoritative store.
    store: Arc<Store>,
    /// Transaction table and commit protocol.
    transactions: TransactionManager,
}

impl Database {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        let store = Arc::new(Store::new());
        let transactions = TransactionManager::new(Arc::clone(&store));
        Self {
            store,
            transactions,
        }
    }

    // =========================================================================
    // Point operations
    // =========================================================================

    /// Sets `key` to `value`.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::ZombieKey`] when the key's cell is
    /// tombstoned pending removal by a committing erase.
    ///
    /// [`CoreError::ZombieKey`]: crate::CoreError::ZombieKey
    pub fn put(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> CoreResult<()> {
        self.store.put(key.into(), value.into())
    }

    /// Gets the value under `key`.
    ///
    /// Returns an owned copy; the copy stays valid across any later
    /// mutation of the store. `None` means the key is absent.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<Vec<u8>> {
        self.store.get(key.as_ref())
    }

    /// Removes the value under `key`. Erasing an absent key is a no-op.
    pub fn erase(&self, key: impl AsRef<[u8]>) {
        self.store.erase(key.as_ref());
    }

    /// Checks whether a live value exists under `key`.
    pub fn contains(&self, key: impl AsRef<[u8]>) -> bool {
        self.store.get(key.as_ref()).is_some()
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the database holds no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Starts a transaction under the caller-supplied ID.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::TransactionExists`] if the ID is already
    /// active.
    ///
    /// [`CoreError::TransactionExists`]: crate::CoreError::TransactionExists
    pub fn begin(&self, id: &str) -> CoreResult<()> {
        self.transactions.begin(id)
    }

    /// Aborts a transaction, discarding all staged state.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::TransactionNotFound`] if the ID is not
    /// active.
    ///
    /// [`CoreError::TransactionNotFound`]: crate::CoreError::TransactionNotFound
    pub fn rollback(&self, id: &str) -> CoreResult<()> {
        self.transactions.rollback(id)
    }

    /// Commits a transaction, publishing its staged writes.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::TransactionNotFound`] if the ID is not
    /// active, and with [`CoreError::TransactionConflict`] if any staged
    /// key no longer matches the snapshot captured when the transaction
    /// first touched it. Either way the transaction is gone afterwards.
    ///
    /// [`CoreError::TransactionNotFound`]: crate::CoreError::TransactionNotFound
    /// [`CoreError::TransactionConflict`]: crate::CoreError::TransactionConflict
    pub fn commit(&self, id: &str) -> CoreResult<()> {
        self.transactions.commit(id)
    }

    /// Sets `key` to `value` within a transaction.
    ///
    /// The write is staged: invisible to other readers until commit.
    pub fn put_in(
        &self,
        id: &str,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> CoreResult<()> {
        self.transactions.put(id, key.into(), value.into())
    }

    /// Gets the value under `key` as seen by a transaction.
    ///
    /// Reflects the transaction's own staged writes (read-your-writes)
    /// and falls through to the store for untouched keys.
    pub fn get_in(&self, id: &str, key: impl AsRef<[u8]>) -> CoreResult<Option<Vec<u8>>> {
        self.transactions.get(id, key.as_ref())
    }

    /// Removes `key` within a transaction.
    ///
    /// Only a key the transaction already staged is affected; an
    /// untouched key (or an unknown transaction ID) is a no-op.
    pub fn erase_in(&self, id: &str, key: impl AsRef<[u8]>) -> CoreResult<()> {
        self.transactions.erase(id, key.as_ref())
    }

    /// Executes a closure within a transaction.
    ///
    /// Begins a transaction under `id`, then commits when the closure
    /// returns `Ok` and rolls back when it returns `Err`, without
    /// masking the closure's error. A commit conflict surfaces as
    /// [`CoreError::TransactionConflict`].
    ///
    /// # Example
    ///
    /// ```
    /// use veridb_core::Database;
    ///
    /// let db = Database::new();
    /// db.transaction("abc", |txn| {
    ///     txn.put("a", "1")?;
    ///     txn.put("b", "2")?;
    ///     Ok(())
    /// })?;
    /// assert_eq!(db.get("a"), Some(b"1".to_vec()));
    /// # Ok::<(), veridb_core::CoreError>(())
    /// ```
    ///
    /// [`CoreError::TransactionConflict`]: crate::CoreError::TransactionConflict
    pub fn transaction<F, T>(&self, id: &str, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Txn<'_>) -> CoreResult<T>,
    {
        self.begin(id)?;
        let txn = Txn {
            db: self,
            id: TransactionId::from(id),
        };
        match f(&txn) {
            Ok(result) => {
                self.commit(id)?;
                Ok(result)
            }
            Err(e) => {
                // Best-effort rollback; the closure's error wins.
                let _ = self.rollback(id);
                Err(e)
            }
        }
    }

    /// Number of active transactions.
    #[must_use]
    pub fn active_transactions(&self) -> usize {
        self.transactions.active_count()
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("len", &self.len())
            .field("active_transactions", &self.active_transactions())
            .finish_non_exhaustive()
    }
}

/// A handle to one transaction, scoped to a [`Database::transaction`]
/// closure.
#[derive(Debug)]
pub struct Txn<'a> {
    db: &'a Database,
    id: TransactionId,
}

impl Txn<'_> {
    /// The transaction's ID.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Sets `key` to `value` within this transaction.
    pub fn put(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> CoreResult<()> {
        self.db.put_in(self.id.as_str(), key, value)
    }

    /// Gets the value under `key` as seen by this transaction.
    pub fn get(&self, key: impl AsRef<[u8]>) -> CoreResult<Option<Vec<u8>>> {
        self.db.get_in(self.id.as_str(), key)
    }

    /// Removes `key` within this transaction.
    pub fn erase(&self, key: impl AsRef<[u8]>) -> CoreResult<()> {
        self.db.erase_in(self.id.as_str(), key)
    }
}
