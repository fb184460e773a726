//! Content-addressed object store with reference counting.
//!
//! Every durable blob of a page lives here: value objects and B-tree nodes,
//! keyed by their content hash. The store also owns the bookkeeping that
//! keeps objects alive exactly as long as something references them:
//!
//! - `R/<id>` holds the reference count contributed by commits and tree
//!   nodes. An object whose count drops to zero and which no journal holds
//!   untracked is removed in the same batch.
//! - `U/<id>` flags *untracked* objects: created by a journal but not yet
//!   incorporated into a committed tree. Untracked objects are kept alive by
//!   per-journal counters, not by `R/` counts.
//! - `S/<id>` records sync status; absence means the object is synced.

use std::io::Read;

use stratadb_core::encoding::{self, keys};
use stratadb_core::{hash, ObjectId, SyncStatus};
use stratadb_storage::{StorageEngine, WriteBatch};

use crate::error::{Error, Result};

/// Object store bound to one page's logical table.
pub(crate) struct ObjectStore<'a, E> {
    engine: &'a E,
    table: &'a str,
}

impl<'a, E: StorageEngine> ObjectStore<'a, E> {
    pub(crate) fn new(engine: &'a E, table: &'a str) -> Self {
        Self { engine, table }
    }

    /// Add a value blob, content-hashed and idempotent.
    ///
    /// A blob that was not present before and is referenced by no commit is
    /// marked untracked: it belongs to the creating journal until a commit
    /// incorporates it.
    pub(crate) fn add_object<B: WriteBatch>(
        &self,
        batch: &mut B,
        bytes: &[u8],
    ) -> Result<ObjectId> {
        let id = hash::hash_value(bytes);
        let key = keys::object_key(&id);
        if batch.get(self.table, &key)?.is_none() {
            batch.put(self.table, &key, bytes)?;
            if self.refcount_in_batch(batch, &id)? == 0 {
                self.mark_untracked(batch, &id)?;
            }
        }
        Ok(id)
    }

    /// Add a value blob from a stream that advertises its size.
    ///
    /// A negative advertised size means "unknown" and accepts any length;
    /// otherwise the stream must produce exactly `size` bytes.
    pub(crate) fn add_object_from_stream<B: WriteBatch>(
        &self,
        batch: &mut B,
        size: i64,
        reader: &mut dyn Read,
    ) -> Result<ObjectId> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| Error::Storage(stratadb_storage::StorageError::Io(e)))?;
        if size >= 0 && bytes.len() as u64 != size as u64 {
            return Err(Error::StreamSizeMismatch { advertised: size, actual: bytes.len() as u64 });
        }
        self.add_object(batch, &bytes)
    }

    /// Read an object's bytes, or `None` if it is not stored.
    pub(crate) fn get_object(&self, id: &ObjectId) -> Result<Option<Vec<u8>>> {
        Ok(self.engine.get(self.table, &keys::object_key(id))?)
    }

    /// Read an object that a committed structure references.
    ///
    /// A missing object here is corruption, not a caller error.
    pub(crate) fn get_referenced_object(&self, id: &ObjectId) -> Result<Vec<u8>> {
        self.get_object(id)?
            .ok_or_else(|| Error::corruption(format!("referenced object {id} missing")))
    }

    /// Returns `true` if the object's bytes are present.
    pub(crate) fn has_object(&self, id: &ObjectId) -> Result<bool> {
        Ok(self.get_object(id)?.is_some())
    }

    /// The object's reference count as seen by the given batch.
    fn refcount_in_batch<B: WriteBatch>(&self, batch: &B, id: &ObjectId) -> Result<u64> {
        match batch.get(self.table, &keys::refcount_key(id))? {
            Some(bytes) => Ok(encoding::decode_u64(&bytes)?),
            None => Ok(0),
        }
    }

    /// Increment an object's reference count within the supplied batch.
    pub(crate) fn inc_ref<B: WriteBatch>(
        &self,
        batch: &mut B,
        id: &ObjectId,
        delta: u64,
    ) -> Result<()> {
        let count = self.refcount_in_batch(batch, id)?;
        batch.put(self.table, &keys::refcount_key(id), &encoding::encode_u64(count + delta))?;
        Ok(())
    }

    /// Decrement an object's reference count within the supplied batch.
    ///
    /// A count reaching zero on a tracked object removes the object, its
    /// count, and its sync status in the same batch.
    pub(crate) fn dec_ref<B: WriteBatch>(
        &self,
        batch: &mut B,
        id: &ObjectId,
        delta: u64,
    ) -> Result<()> {
        let count = self.refcount_in_batch(batch, id)?;
        if count < delta {
            return Err(Error::corruption(format!(
                "refcount underflow for {id}: {count} - {delta}"
            )));
        }
        let next = count - delta;
        if next > 0 {
            batch.put(self.table, &keys::refcount_key(id), &encoding::encode_u64(next))?;
            return Ok(());
        }
        batch.delete(self.table, &keys::refcount_key(id))?;
        if !self.is_untracked_in_batch(batch, id)? {
            batch.delete(self.table, &keys::object_key(id))?;
            batch.delete(self.table, &keys::sync_status_key(id))?;
        }
        Ok(())
    }

    /// The object's committed reference count.
    pub(crate) fn refcount(&self, id: &ObjectId) -> Result<u64> {
        match self.engine.get(self.table, &keys::refcount_key(id))? {
            Some(bytes) => Ok(encoding::decode_u64(&bytes)?),
            None => Ok(0),
        }
    }

    /// Returns `true` if the object is flagged untracked.
    pub(crate) fn is_untracked(&self, id: &ObjectId) -> Result<bool> {
        Ok(self.engine.get(self.table, &keys::untracked_key(id))?.is_some())
    }

    /// Returns `true` if the object is flagged untracked, as seen by the
    /// given batch.
    pub(crate) fn is_untracked_in_batch<B: WriteBatch>(
        &self,
        batch: &B,
        id: &ObjectId,
    ) -> Result<bool> {
        Ok(batch.get(self.table, &keys::untracked_key(id))?.is_some())
    }

    /// Flag an object as untracked.
    pub(crate) fn mark_untracked<B: WriteBatch>(
        &self,
        batch: &mut B,
        id: &ObjectId,
    ) -> Result<()> {
        batch.put(self.table, &keys::untracked_key(id), &[1])?;
        Ok(())
    }

    /// Clear an object's untracked flag; its lifetime is now owned by commit
    /// reference counts.
    pub(crate) fn mark_tracked<B: WriteBatch>(&self, batch: &mut B, id: &ObjectId) -> Result<()> {
        batch.delete(self.table, &keys::untracked_key(id))?;
        Ok(())
    }

    /// Record an object's sync status. `Synced` clears the marker.
    pub(crate) fn set_sync_status<B: WriteBatch>(
        &self,
        batch: &mut B,
        id: &ObjectId,
        status: SyncStatus,
    ) -> Result<()> {
        match status {
            SyncStatus::Unsynced => {
                batch.put(self.table, &keys::sync_status_key(id), &[status.as_byte()])?;
            }
            SyncStatus::Synced => batch.delete(self.table, &keys::sync_status_key(id))?,
        }
        Ok(())
    }

    /// The object's sync status; objects with no marker count as synced.
    pub(crate) fn sync_status(&self, id: &ObjectId) -> Result<SyncStatus> {
        match self.engine.get(self.table, &keys::sync_status_key(id))? {
            Some(_) => Ok(SyncStatus::Unsynced),
            None => Ok(SyncStatus::Synced),
        }
    }

    /// Remove an untracked object that no journal holds any longer.
    pub(crate) fn remove_untracked<B: WriteBatch>(
        &self,
        batch: &mut B,
        id: &ObjectId,
    ) -> Result<()> {
        batch.delete(self.table, &keys::object_key(id))?;
        batch.delete(self.table, &keys::refcount_key(id))?;
        batch.delete(self.table, &keys::untracked_key(id))?;
        batch.delete(self.table, &keys::sync_status_key(id))?;
        Ok(())
    }
}
