//! Journals: staged mutations that atomically become commits.
//!
//! A journal is bound at creation to a base commit (and, for merges, a
//! second parent). Mutations stage durable state under the journal's `J/`
//! namespace: one entry per key, plus a counter per *untracked* object
//! recording how many staged entries hold it alive. Tracked objects are
//! owned by commit reference counts and never counted here.
//!
//! Committing streams the staged entries, in key order, through the tree
//! builder over the base root, then lands the commit record, the head-set
//! swap, the promotion of counted objects to tracked, and the removal of
//! the journal's staged state in one backend batch. A journal whose changes
//! net out to nothing against a single parent rolls back and hands the
//! caller the base commit instead.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::warn;

use stratadb_core::encoding::journal::{decode_staged_value, encode_staged_value, StagedValue};
use stratadb_core::encoding::keys::{self, JournalId};
use stratadb_core::encoding::{decode_i64, encode_i64};
use stratadb_core::{Commit, CommitId, EntryChange, ObjectId, Priority, SyncStatus, MAX_KEY_SIZE};
use stratadb_storage::{StorageEngine, WriteBatch};

use crate::error::{Error, Result};
use crate::interrupt::Interrupt;
use crate::page::PageInner;
use crate::store::ObjectStore;

/// How strictly a journal treats failed operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalType {
    /// Individual operation failures do not poison the journal; a
    /// subsequent successful operation can still commit.
    Implicit,
    /// Any failed operation forces the whole journal to roll back at commit
    /// time.
    Explicit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JournalState {
    Open,
    Failed,
    Closed,
}

/// A staged transaction against one page.
///
/// Obtained from [`PageHandle::start_transaction`](crate::PageHandle::start_transaction).
/// Dropping a journal without committing or rolling back logs a warning;
/// its staged state is rolled back when the page is next opened.
pub struct Journal<E: StorageEngine> {
    page: Arc<PageInner<E>>,
    id: JournalId,
    journal_type: JournalType,
    base: CommitId,
    other: Option<CommitId>,
    state: JournalState,
    interrupt: Interrupt,
}

impl<E: StorageEngine> Journal<E> {
    /// Open a new journal bound to the page's current head.
    pub(crate) fn new(page: Arc<PageInner<E>>, journal_type: JournalType) -> Result<Self> {
        let base = page.current_head()?.id;
        let id = page.allocate_journal_id()?;
        Ok(Self {
            page,
            id,
            journal_type,
            base,
            other: None,
            state: JournalState::Open,
            interrupt: Interrupt::new(),
        })
    }

    /// Open a merge journal with parents `(base, other)`.
    pub(crate) fn new_merge(
        page: Arc<PageInner<E>>,
        base: CommitId,
        other: CommitId,
    ) -> Result<Self> {
        let id = page.allocate_journal_id()?;
        Ok(Self {
            page,
            id,
            journal_type: JournalType::Explicit,
            base,
            other: Some(other),
            state: JournalState::Open,
            interrupt: Interrupt::new(),
        })
    }

    /// A handle for cooperatively cancelling this journal's tree builds.
    #[must_use]
    pub fn interrupt_handle(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Stage a key-to-value binding.
    ///
    /// The value is stored as a content-addressed object in the same batch
    /// as the staged entry.
    pub fn put(&mut self, key: impl AsRef<[u8]>, value: &[u8], priority: Priority) -> Result<()> {
        self.check_open()?;
        let result = self.try_put(key.as_ref(), value, priority);
        self.absorb(result)
    }

    /// Stage a key-to-object binding for an already-stored object.
    pub fn put_reference(
        &mut self,
        key: impl AsRef<[u8]>,
        object_id: ObjectId,
        priority: Priority,
    ) -> Result<()> {
        self.check_open()?;
        let result = self.try_stage(key.as_ref(), StagedValue::Value { object_id, priority });
        self.absorb(result)
    }

    /// Stage the deletion of a key.
    pub fn delete(&mut self, key: impl AsRef<[u8]>) -> Result<()> {
        self.check_open()?;
        let result = self.try_stage(key.as_ref(), StagedValue::Tombstone);
        self.absorb(result)
    }

    /// Commit the staged mutations, producing a commit.
    ///
    /// A journal whose staged changes are a no-op against a single parent
    /// rolls back and returns the base commit; no watcher fires. On failure
    /// the journal stays open and the commit may be retried or rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the journal is closed, or if it is
    /// explicit and one of its operations failed (the journal is rolled
    /// back first).
    pub fn commit(&mut self) -> Result<Commit> {
        let page = Arc::clone(&self.page);
        let _guard = page.lock_operations();
        page.check_quarantine()?;
        match self.commit_locked() {
            Ok((commit, landed)) => {
                if landed {
                    PageInner::reconcile_locked(&page)?;
                    PageInner::pump_watchers_locked(&page)?;
                }
                Ok(commit)
            }
            Err(err) => {
                page.note_error(&err);
                Err(err)
            }
        }
    }

    /// Discard the staged mutations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the journal is already closed.
    pub fn rollback(&mut self) -> Result<()> {
        let page = Arc::clone(&self.page);
        let _guard = page.lock_operations();
        self.rollback_locked()
    }

    /// Commit while the caller already holds the page operation lock.
    pub(crate) fn commit_locked(&mut self) -> Result<(Commit, bool)> {
        match self.state {
            JournalState::Closed => {
                return Err(Error::illegal_state("journal already committed or rolled back"))
            }
            JournalState::Failed => {
                self.rollback_locked()?;
                return Err(Error::illegal_state("explicit journal had a failed operation"));
            }
            JournalState::Open => {}
        }

        let engine = self.page.engine();
        let table = self.page.table();
        let graph = self.page.graph();
        let store = self.page.object_store();

        let base_commit = graph.get_commit(&self.base)?;
        let other_commit = self.other.as_ref().map(|id| graph.get_commit(id)).transpose()?;

        let changes: Vec<EntryChange> = self
            .staged_entries()?
            .into_iter()
            .map(|(key, staged)| match staged {
                StagedValue::Tombstone => EntryChange::Delete(key),
                StagedValue::Value { object_id, priority } => EntryChange::Insert(
                    stratadb_core::Entry { key, object_id, priority },
                ),
            })
            .collect();

        let mut batch = engine.batch()?;
        let (root_id, _new_nodes) = crate::btree::builder::apply_changes(
            engine,
            table,
            &mut batch,
            &base_commit.root_id,
            changes,
            &self.interrupt,
        )?;

        // A single-parent commit that reproduces its base is a no-op.
        if other_commit.is_none() && root_id == base_commit.root_id {
            batch.rollback()?;
            self.rollback_locked()?;
            return Ok((base_commit, false));
        }

        let mut parents = vec![base_commit.clone()];
        parents.extend(other_commit);
        let generation = parents.iter().map(|p| p.generation).max().unwrap_or(0) + 1;
        // Merge commits take the max of their parents' timestamps so that
        // merging the same pair always produces the same commit id.
        let timestamp = if parents.len() == 2 {
            parents.iter().map(|p| p.timestamp).max().unwrap_or(0)
        } else {
            self.page.now()
        };
        let parent_ids: Vec<CommitId> = parents.iter().map(|p| p.id).collect();
        let commit = Commit::from_content(root_id, parent_ids, generation, timestamp);

        // Re-merging a pair that already merged lands on the existing
        // commit; nothing new happens.
        if graph.contains(&commit.id)? {
            let existing = graph.get_commit(&commit.id)?;
            batch.rollback()?;
            self.rollback_locked()?;
            return Ok((existing, false));
        }

        graph.add_commit(&mut batch, &commit, &store)?;

        // Promote counted untracked objects: their reference counts were
        // established by the new tree nodes; from here commits own them.
        for (object_id, counter) in self.counters()? {
            if counter > 0 {
                store.mark_tracked(&mut batch, &object_id)?;
                store.set_sync_status(&mut batch, &object_id, SyncStatus::Unsynced)?;
            }
        }

        self.delete_staged_state(&mut batch)?;
        batch.commit()?;

        self.state = JournalState::Closed;
        self.page.enqueue_commit(commit.id);
        Ok((commit, true))
    }

    /// Roll back while the caller already holds the page operation lock.
    pub(crate) fn rollback_locked(&mut self) -> Result<()> {
        if self.state == JournalState::Closed {
            return Err(Error::illegal_state("journal already committed or rolled back"));
        }
        rollback_journal_state(self.page.engine(), self.page.table(), self.id)?;
        self.state = JournalState::Closed;
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        match self.state {
            JournalState::Open => Ok(()),
            JournalState::Failed => {
                Err(Error::illegal_state("explicit journal had a failed operation"))
            }
            JournalState::Closed => {
                Err(Error::illegal_state("journal already committed or rolled back"))
            }
        }
    }

    /// Key validation is part of the operation itself: an oversized key
    /// poisons an explicit journal like any other failed operation.
    fn check_key(key: &[u8]) -> Result<()> {
        if key.len() > MAX_KEY_SIZE {
            return Err(Error::InvalidArgument(format!(
                "key of {} bytes exceeds maximum of {MAX_KEY_SIZE}",
                key.len()
            )));
        }
        Ok(())
    }

    /// Record an operation result, poisoning explicit journals on failure.
    fn absorb(&mut self, result: Result<()>) -> Result<()> {
        if result.is_err() && self.journal_type == JournalType::Explicit {
            self.state = JournalState::Failed;
        }
        result
    }

    fn try_put(&self, key: &[u8], value: &[u8], priority: Priority) -> Result<()> {
        Self::check_key(key)?;
        let engine = self.page.engine();
        let store = self.page.object_store();
        let mut batch = engine.batch()?;
        let object_id = store.add_object(&mut batch, value)?;
        self.stage(&mut batch, &store, key, StagedValue::Value { object_id, priority })?;
        batch.commit()?;
        Ok(())
    }

    fn try_stage(&self, key: &[u8], staged: StagedValue) -> Result<()> {
        Self::check_key(key)?;
        let engine = self.page.engine();
        let store = self.page.object_store();
        let mut batch = engine.batch()?;
        self.stage(&mut batch, &store, key, staged)?;
        batch.commit()?;
        Ok(())
    }

    /// Write one staged entry and maintain the untracked-object counters, in
    /// the caller's batch.
    fn stage<B: WriteBatch>(
        &self,
        batch: &mut B,
        store: &ObjectStore<'_, E>,
        key: &[u8],
        staged: StagedValue,
    ) -> Result<()> {
        let table = self.page.table();
        let entry_key = keys::journal_entry_key(self.id, key);
        let prev = batch
            .get(table, &entry_key)?
            .map(|bytes| decode_staged_value(&bytes))
            .transpose()?;

        batch.put(table, &entry_key, &encode_staged_value(&staged))?;

        let new_id = staged.object_id().copied();
        let prev_id = prev.and_then(|p| p.object_id().copied());
        if new_id != prev_id {
            if let Some(id) = new_id {
                self.update_counter(batch, store, &id, 1)?;
            }
            if let Some(id) = prev_id {
                self.update_counter(batch, store, &id, -1)?;
            }
        }
        Ok(())
    }

    /// Adjust this journal's counter for an object. Counters exist only for
    /// untracked objects; tracked objects are owned by commit refcounts.
    fn update_counter<B: WriteBatch>(
        &self,
        batch: &mut B,
        store: &ObjectStore<'_, E>,
        object_id: &ObjectId,
        delta: i64,
    ) -> Result<()> {
        if !store.is_untracked_in_batch(batch, object_id)? {
            return Ok(());
        }
        let table = self.page.table();
        let key = keys::journal_counter_key(self.id, object_id);
        let current = batch.get(table, &key)?.map(|b| decode_i64(&b)).transpose()?.unwrap_or(0);
        let next = current + delta;
        if next < 0 {
            return Err(Error::corruption(format!(
                "journal counter for {object_id} went negative"
            )));
        }
        if next == 0 {
            batch.delete(table, &key)?;
        } else {
            batch.put(table, &key, &encode_i64(next))?;
        }
        Ok(())
    }

    /// The journal's staged entries in key order.
    fn staged_entries(&self) -> Result<Vec<(Vec<u8>, StagedValue)>> {
        let engine = self.page.engine();
        let table = self.page.table();
        let prefix = keys::journal_entry_prefix(self.id);

        let mut entries = Vec::new();
        let mut after: Option<Vec<u8>> = None;
        loop {
            let page = engine.scan_prefix(table, &prefix, after.as_deref(), 256)?;
            if page.is_empty() {
                break;
            }
            after = Some(page.last().unwrap().0.clone());
            for (key, value) in page {
                let user_key = keys::decode_journal_entry_key(self.id, &key)
                    .ok_or_else(|| Error::corruption("malformed journal entry key"))?;
                entries.push((user_key, decode_staged_value(&value)?));
            }
        }
        Ok(entries)
    }

    /// The journal's untracked-object counters.
    fn counters(&self) -> Result<Vec<(ObjectId, i64)>> {
        journal_counters(self.page.engine(), self.page.table(), self.id)
    }

    /// Delete every `J/<id>/` key in the caller's batch.
    fn delete_staged_state<B: WriteBatch>(&self, batch: &mut B) -> Result<()> {
        let engine = self.page.engine();
        let table = self.page.table();
        let prefix = keys::journal_prefix(self.id);
        let mut after: Option<Vec<u8>> = None;
        loop {
            let page = engine.scan_prefix(table, &prefix, after.as_deref(), 256)?;
            if page.is_empty() {
                return Ok(());
            }
            after = Some(page.last().unwrap().0.clone());
            for (key, _) in page {
                batch.delete(table, &key)?;
            }
        }
    }
}

impl<E: StorageEngine> Drop for Journal<E> {
    fn drop(&mut self) {
        if self.state != JournalState::Closed {
            warn!(
                journal_id = self.id,
                "journal dropped without commit or rollback; \
                 staged state will be reclaimed on recovery"
            );
        }
    }
}

/// Enumerate the ids of journals with staged state in a page.
pub(crate) fn list_journal_ids<E: StorageEngine>(
    engine: &E,
    table: &str,
) -> Result<Vec<JournalId>> {
    let mut ids = BTreeSet::new();
    let mut after: Option<Vec<u8>> = None;
    loop {
        let page = engine.scan_prefix(table, keys::PREFIX_JOURNAL, after.as_deref(), 256)?;
        if page.is_empty() {
            break;
        }
        after = Some(page.last().unwrap().0.clone());
        for (key, _) in page {
            if let Some(id) = keys::decode_journal_id(&key) {
                ids.insert(id);
            }
        }
    }
    Ok(ids.into_iter().collect())
}

fn journal_counters<E: StorageEngine>(
    engine: &E,
    table: &str,
    journal_id: JournalId,
) -> Result<Vec<(ObjectId, i64)>> {
    let prefix = keys::journal_counter_prefix(journal_id);
    let mut counters = Vec::new();
    let mut after: Option<Vec<u8>> = None;
    loop {
        let page = engine.scan_prefix(table, &prefix, after.as_deref(), 256)?;
        if page.is_empty() {
            break;
        }
        after = Some(page.last().unwrap().0.clone());
        for (key, value) in page {
            let object_id = keys::decode_journal_counter_key(journal_id, &key)
                .ok_or_else(|| Error::corruption("malformed journal counter key"))?;
            counters.push((object_id, decode_i64(&value)?));
        }
    }
    Ok(counters)
}

/// Remove untracked objects that no journal counts any longer.
///
/// Runs at page-open time, after stale journals have been rolled back. It
/// reclaims objects orphaned by a crash or displaced by an overwrite whose
/// journal has since committed without them.
pub(crate) fn sweep_orphaned_objects<E: StorageEngine>(engine: &E, table: &str) -> Result<()> {
    let store = ObjectStore::new(engine, table);
    let journals = list_journal_ids(engine, table)?;
    let mut batch = engine.batch()?;

    let mut after: Option<Vec<u8>> = None;
    loop {
        let page = engine.scan_prefix(table, keys::PREFIX_UNTRACKED, after.as_deref(), 256)?;
        if page.is_empty() {
            break;
        }
        after = Some(page.last().unwrap().0.clone());
        for (key, _) in page {
            let object_id = keys::decode_object_id(keys::PREFIX_UNTRACKED, &key)
                .ok_or_else(|| Error::corruption("malformed untracked key"))?;
            if store.refcount(&object_id)? > 0 {
                continue;
            }
            let held = journals.iter().try_fold(false, |held, journal| {
                if held {
                    return Ok::<bool, Error>(true);
                }
                Ok(engine
                    .get(table, &keys::journal_counter_key(*journal, &object_id))?
                    .is_some())
            })?;
            if !held {
                store.remove_untracked(&mut batch, &object_id)?;
            }
        }
    }
    batch.commit()?;
    Ok(())
}

/// Atomically delete a journal's staged state, reclaiming untracked objects
/// that no commit and no other journal holds.
///
/// Shared between [`Journal::rollback`] and startup recovery.
pub(crate) fn rollback_journal_state<E: StorageEngine>(
    engine: &E,
    table: &str,
    journal_id: JournalId,
) -> Result<()> {
    let store = ObjectStore::new(engine, table);
    let counters = journal_counters(engine, table, journal_id)?;
    let other_journals: Vec<JournalId> =
        list_journal_ids(engine, table)?.into_iter().filter(|id| *id != journal_id).collect();

    let mut batch = engine.batch()?;

    // Delete all J/<id>/ state.
    let prefix = keys::journal_prefix(journal_id);
    let mut after: Option<Vec<u8>> = None;
    loop {
        let page = engine.scan_prefix(table, &prefix, after.as_deref(), 256)?;
        if page.is_empty() {
            break;
        }
        after = Some(page.last().unwrap().0.clone());
        for (key, _) in page {
            batch.delete(table, &key)?;
        }
    }

    // An untracked object this journal counted is reclaimed once nothing
    // else holds it: no commit refcount, no other journal counter.
    for (object_id, counter) in counters {
        if counter <= 0 || !store.is_untracked(&object_id)? || store.refcount(&object_id)? > 0 {
            continue;
        }
        let held_elsewhere = other_journals.iter().try_fold(false, |held, other| {
            if held {
                return Ok::<bool, Error>(true);
            }
            Ok(engine
                .get(table, &keys::journal_counter_key(*other, &object_id))?
                .is_some())
        })?;
        if !held_elsewhere {
            store.remove_untracked(&mut batch, &object_id)?;
        }
    }

    batch.commit()?;
    Ok(())
}
