//! Core backend traits.

use super::StorageError;

/// A key-value pair returned by prefix scans.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// An ordered key-value backend with atomic write batches.
///
/// The backend is the only durable medium in `StrataDB`; every other
/// component encodes its state as keys within it. Logical tables partition
/// the keyspace (one per page), and within a table keys sort by raw bytes.
pub trait StorageEngine: Send + Sync {
    /// The write-batch type for this backend.
    type Batch<'a>: WriteBatch
    where
        Self: 'a;

    /// Get a value by key from a table.
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Scan up to `limit` entries of a table whose keys start with `prefix`,
    /// in ascending key order, resuming strictly after `after` when given.
    ///
    /// Repeated calls passing the last returned key as `after` stream the
    /// whole prefix while holding at most `limit` entries in memory.
    fn scan_prefix(
        &self,
        table: &str,
        prefix: &[u8],
        after: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<KeyValue>, StorageError>;

    /// Begin an atomic write batch.
    fn batch(&self) -> Result<Self::Batch<'_>, StorageError>;
}

/// A group of writes that becomes visible all at once or not at all.
///
/// Batches also serve reads so callers can inspect the state they are about
/// to overwrite and stage the replacement in the same atomic unit. Reads
/// observe the batch's own uncommitted writes.
pub trait WriteBatch {
    /// Get a value by key, observing writes staged in this batch.
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Put a key-value pair into a table.
    fn put(&mut self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Delete a key from a table. Deleting an absent key is not an error.
    fn delete(&mut self, table: &str, key: &[u8]) -> Result<(), StorageError>;

    /// Atomically apply every staged write.
    fn commit(self) -> Result<(), StorageError>;

    /// Discard every staged write.
    fn rollback(self) -> Result<(), StorageError>;
}
