//! Read-only pinned views of a commit.

use std::sync::Arc;

use stratadb_core::{Commit, CommitId, ObjectId, Priority, Value, INLINE_VALUE_THRESHOLD};
use stratadb_storage::StorageEngine;

use crate::btree;
use crate::error::{Error, Result};

use super::PageInner;

/// Maximum entries returned by one `get_keys`/`get_entries` call; larger
/// result sets continue through the returned token.
pub const MAX_RESULT_BATCH: usize = 128;

/// One entry returned by [`Snapshot::get_entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    /// The entry's key.
    pub key: Vec<u8>,
    /// The entry's value, inlined when small.
    pub value: Value,
    /// Fetch priority of the value.
    pub priority: Priority,
}

/// A read-only view of a page at one commit.
///
/// The snapshot pins its commit for its lifetime: the objects reachable
/// from it stay readable however far the page advances.
pub struct Snapshot<E: StorageEngine> {
    page: Arc<PageInner<E>>,
    commit: Commit,
}

impl<E: StorageEngine> Snapshot<E> {
    pub(crate) fn new(page: Arc<PageInner<E>>, commit: Commit) -> Self {
        Self { page, commit }
    }

    /// The commit this snapshot is pinned to.
    #[must_use]
    pub fn commit_id(&self) -> &CommitId {
        &self.commit.id
    }

    /// The root of the tree this snapshot reads.
    #[must_use]
    pub fn root_id(&self) -> &ObjectId {
        &self.commit.root_id
    }

    /// Read the value bound to `key`.
    ///
    /// Values up to the inline threshold come back as bytes; larger values
    /// come back as a reference to their backing object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if the key has no binding.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Value> {
        let entry = self.lookup(key.as_ref())?;
        let bytes = self.page.object_store().get_referenced_object(&entry.object_id)?;
        if bytes.len() <= INLINE_VALUE_THRESHOLD {
            Ok(Value::Inline(bytes))
        } else {
            Ok(Value::Reference { id: entry.object_id, size: bytes.len() as u64 })
        }
    }

    /// Read a byte range of the value bound to `key`.
    ///
    /// A negative `offset` counts from the end of the value; `max_size` of
    /// `-1` reads to the end. Ranges past the value yield an empty result,
    /// never an error.
    pub fn get_partial(
        &self,
        key: impl AsRef<[u8]>,
        offset: i64,
        max_size: i64,
    ) -> Result<Vec<u8>> {
        let entry = self.lookup(key.as_ref())?;
        let bytes = self.page.object_store().get_referenced_object(&entry.object_id)?;
        let len = bytes.len() as i64;

        let start = if offset < 0 { (len + offset).max(0) } else { offset.min(len) };
        let end = if max_size < 0 { len } else { (start + max_size).min(len) };
        Ok(bytes[start as usize..end.max(start) as usize].to_vec())
    }

    /// List keys starting with `prefix`, ascending, up to
    /// [`MAX_RESULT_BATCH`] per call.
    ///
    /// A returned token resumes the listing; results are stable across
    /// repeated calls with the same token because the snapshot never moves.
    pub fn get_keys(
        &self,
        prefix: impl AsRef<[u8]>,
        token: Option<&[u8]>,
    ) -> Result<(Vec<Vec<u8>>, Option<Vec<u8>>)> {
        let entries = btree::iter::collect_prefix(
            self.page.engine(),
            self.page.table(),
            &self.commit.root_id,
            prefix.as_ref(),
            token,
            MAX_RESULT_BATCH,
        )?;
        let next = (entries.len() == MAX_RESULT_BATCH)
            .then(|| entries.last().expect("non-empty batch").key.clone());
        Ok((entries.into_iter().map(|e| e.key).collect(), next))
    }

    /// List entries whose keys start with `prefix`, ascending, up to
    /// [`MAX_RESULT_BATCH`] per call.
    pub fn get_entries(
        &self,
        prefix: impl AsRef<[u8]>,
        token: Option<&[u8]>,
    ) -> Result<(Vec<SnapshotEntry>, Option<Vec<u8>>)> {
        let entries = btree::iter::collect_prefix(
            self.page.engine(),
            self.page.table(),
            &self.commit.root_id,
            prefix.as_ref(),
            token,
            MAX_RESULT_BATCH,
        )?;
        let next = (entries.len() == MAX_RESULT_BATCH)
            .then(|| entries.last().expect("non-empty batch").key.clone());

        let store = self.page.object_store();
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let bytes = store.get_referenced_object(&entry.object_id)?;
            let value = if bytes.len() <= INLINE_VALUE_THRESHOLD {
                Value::Inline(bytes)
            } else {
                Value::Reference { id: entry.object_id, size: bytes.len() as u64 }
            };
            out.push(SnapshotEntry { key: entry.key, value, priority: entry.priority });
        }
        Ok((out, next))
    }

    fn lookup(&self, key: &[u8]) -> Result<stratadb_core::Entry> {
        btree::lookup(self.page.engine(), self.page.table(), &self.commit.root_id, key)?
            .ok_or(Error::KeyNotFound)
    }
}

impl<E: StorageEngine> Drop for Snapshot<E> {
    fn drop(&mut self) {
        self.page.unpin(&self.commit.id);
    }
}
