//! Pages and the store facade.
//!
//! A [`Store`] owns the backend and hands out [`PageHandle`]s. Each page is
//! an isolated namespace in the backend with its own commit graph, journals,
//! watchers, and snapshot pins; handles to the same page share one
//! underlying state, so watchers registered through one handle observe
//! commits made through another.
//!
//! Mutations on one page are serialized behind a per-page operation lock;
//! parallelism exists across pages. Snapshot reads never take the operation
//! lock.

mod snapshot;

pub use snapshot::{Snapshot, SnapshotEntry, MAX_RESULT_BATCH};

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use stratadb_core::encoding::keys::{self, JournalId};
use stratadb_core::encoding::{decode_u64, encode_u64};
use stratadb_core::{Commit, CommitId, EntryChange, ObjectId, PageId, INLINE_VALUE_THRESHOLD};
use stratadb_storage::backends::RedbEngine;
use stratadb_storage::{StorageEngine, WriteBatch};

use crate::btree::diff::{diff_trees, EntryDiff};
use crate::commit::CommitGraph;
use crate::error::{Error, Result};
use crate::journal::{self, Journal, JournalType};
use crate::merge::{self, ConflictResolver, LastWriterWins};
use crate::store::ObjectStore;
use crate::watch::{
    ChangedEntry, PageChange, PageWatcher, WatcherAck, WatcherEntry, COALESCE_THRESHOLD,
};

/// Store-wide configuration.
#[derive(Clone)]
pub struct StoreConfig {
    clock: Arc<dyn Fn() -> u64 + Send + Sync>,
}

impl StoreConfig {
    /// Create a configuration with the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the commit-timestamp clock.
    ///
    /// The clock returns milliseconds since the Unix epoch. Tests inject a
    /// fixed clock to make commit ids reproducible.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            clock: Arc::new(|| {
                SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
                    as u64
            }),
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig").finish_non_exhaustive()
    }
}

/// A store of versioned pages on one backend.
///
/// # Example
///
/// ```ignore
/// use stratadb::{Store, JournalType, Priority};
///
/// let store = Store::in_memory()?;
/// let page = store.open_page(&"inbox".into())?;
///
/// let mut tx = page.start_transaction(JournalType::Implicit)?;
/// tx.put(b"name", b"Alice", Priority::Eager)?;
/// tx.commit()?;
///
/// let snapshot = page.get_snapshot()?;
/// assert_eq!(snapshot.get(b"name")?.as_inline(), Some(&b"Alice"[..]));
/// ```
pub struct Store<E: StorageEngine> {
    engine: Arc<E>,
    config: StoreConfig,
    pages: Mutex<HashMap<PageId, Weak<PageInner<E>>>>,
}

impl<E: StorageEngine> Store<E> {
    /// Create a store over the given backend with default configuration.
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, StoreConfig::default())
    }

    /// Create a store with custom configuration.
    pub fn with_config(engine: E, config: StoreConfig) -> Self {
        Self { engine: Arc::new(engine), config, pages: Mutex::new(HashMap::new()) }
    }

    /// Open a page, creating it on first use.
    ///
    /// Opening a fresh page seeds its genesis head and rolls back any
    /// journals left behind by a previous process.
    pub fn open_page(&self, page_id: &PageId) -> Result<PageHandle<E>> {
        let mut pages = lock(&self.pages);
        if let Some(inner) = pages.get(page_id).and_then(Weak::upgrade) {
            return Ok(PageHandle { inner });
        }

        let inner = Arc::new(PageInner {
            engine: Arc::clone(&self.engine),
            table: format!("page/{}", page_id.to_hex()),
            clock: Arc::clone(&self.config.clock),
            op_lock: Mutex::new(()),
            state: Mutex::new(PageState {
                quarantined: false,
                pins: HashMap::new(),
                watchers: Vec::new(),
                next_watcher_id: 0,
                resolver: Arc::new(LastWriterWins),
            }),
        });
        inner.initialize()?;
        pages.insert(page_id.clone(), Arc::downgrade(&inner));
        Ok(PageHandle { inner })
    }

    /// The underlying backend, for advanced use and tests.
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl Store<RedbEngine> {
    /// Open or create a file-backed store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be opened.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::new(RedbEngine::open(path)?))
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be created.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(RedbEngine::in_memory()?))
    }
}

/// A handle to one page. Cheap to clone; clones share the page's state.
pub struct PageHandle<E: StorageEngine> {
    inner: Arc<PageInner<E>>,
}

impl<E: StorageEngine> Clone for PageHandle<E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<E: StorageEngine> PageHandle<E> {
    /// Start a journal bound to the current head.
    ///
    /// Non-blocking: the journal stages against the head observed now; a
    /// concurrent commit simply makes this journal's commit a concurrent
    /// head that the merger reconciles.
    pub fn start_transaction(&self, journal_type: JournalType) -> Result<Journal<E>> {
        self.inner.check_quarantine()?;
        Journal::new(Arc::clone(&self.inner), journal_type)
    }

    /// A read-only snapshot of the current head.
    ///
    /// While a merge is transiently in flight the highest-generation head
    /// wins.
    pub fn get_snapshot(&self) -> Result<Snapshot<E>> {
        let head = self.inner.current_head()?;
        Ok(PageInner::snapshot_of(&self.inner, head))
    }

    /// A read-only snapshot pinned to a specific commit.
    pub fn get_snapshot_at(&self, commit_id: &CommitId) -> Result<Snapshot<E>> {
        let commit = self.inner.graph().get_commit(commit_id)?;
        Ok(PageInner::snapshot_of(&self.inner, commit))
    }

    /// Register a watcher.
    ///
    /// The watcher immediately receives `on_initial_state` with a snapshot
    /// of the current head, then `on_change` for every subsequent commit on
    /// the page.
    pub fn watch(&self, watcher: Box<dyn PageWatcher<E>>) -> Result<()> {
        let _guard = self.inner.lock_operations();
        let head = self.inner.current_head()?;
        let mut watcher = watcher;
        watcher.on_initial_state(PageInner::snapshot_of(&self.inner, head.clone()));

        let mut state = lock(&self.inner.state);
        let id = state.next_watcher_id;
        state.next_watcher_id += 1;
        state.watchers.push(WatcherEntry {
            id,
            watcher: Some(watcher),
            cursor: head.id,
            pending: Vec::new(),
        });
        Ok(())
    }

    /// Store a large value as a content-addressed object, to be bound to a
    /// key later with [`Journal::put_reference`].
    ///
    /// A non-negative `size` must match the stream's actual length exactly;
    /// a negative size means "unknown" and accepts any length.
    pub fn create_reference(&self, size: i64, reader: &mut dyn Read) -> Result<ObjectId> {
        self.inner.check_quarantine()?;
        let store = self.inner.object_store();
        let mut batch = self.inner.engine().batch()?;
        let id = store.add_object_from_stream(&mut batch, size, reader)?;
        batch.commit()?;
        Ok(id)
    }

    /// Replace the page's merge conflict resolver.
    pub fn set_conflict_resolver(&self, resolver: Arc<dyn ConflictResolver>) {
        lock(&self.inner.state).resolver = resolver;
    }

    /// The current head commits, sorted by (generation descending, id
    /// ascending).
    pub fn heads(&self) -> Result<Vec<CommitId>> {
        Ok(self.inner.graph().heads()?.into_iter().map(|c| c.id).collect())
    }

    /// Load a commit record.
    pub fn get_commit(&self, id: &CommitId) -> Result<Commit> {
        self.inner.graph().get_commit(id)
    }
}

/// Lock a mutex, surviving poisoning: per-page state stays usable even if a
/// watcher callback panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Mutable per-page state behind the state mutex.
struct PageState<E: StorageEngine> {
    quarantined: bool,
    pins: HashMap<CommitId, usize>,
    watchers: Vec<WatcherEntry<E>>,
    next_watcher_id: u64,
    resolver: Arc<dyn ConflictResolver>,
}

/// Shared per-page state. All handles, journals, and snapshots of one page
/// point at the same `PageInner`.
pub(crate) struct PageInner<E: StorageEngine> {
    engine: Arc<E>,
    table: String,
    clock: Arc<dyn Fn() -> u64 + Send + Sync>,
    /// Serializes mutations and watcher fanout for this page.
    op_lock: Mutex<()>,
    state: Mutex<PageState<E>>,
}

impl<E: StorageEngine> PageInner<E> {
    pub(crate) fn engine(&self) -> &E {
        &self.engine
    }

    pub(crate) fn table(&self) -> &str {
        &self.table
    }

    pub(crate) fn lock_operations(&self) -> MutexGuard<'_, ()> {
        lock(&self.op_lock)
    }

    pub(crate) fn graph(&self) -> CommitGraph<'_, E> {
        CommitGraph::new(&self.engine, &self.table)
    }

    pub(crate) fn object_store(&self) -> ObjectStore<'_, E> {
        ObjectStore::new(&self.engine, &self.table)
    }

    pub(crate) fn now(&self) -> u64 {
        (self.clock)()
    }

    pub(crate) fn check_quarantine(&self) -> Result<()> {
        if lock(&self.state).quarantined {
            return Err(Error::Quarantined);
        }
        Ok(())
    }

    /// Record an operation failure, quarantining the page on corruption.
    pub(crate) fn note_error(&self, err: &Error) {
        if err.is_fatal() {
            warn!(table = %self.table, error = %err, "quarantining page after corruption");
            lock(&self.state).quarantined = true;
        }
    }

    /// Seed the genesis head and roll back journals left by a previous
    /// process.
    fn initialize(&self) -> Result<()> {
        let _guard = self.lock_operations();
        let mut batch = self.engine.batch()?;
        self.graph().ensure_initialized(&mut batch)?;
        batch.commit()?;

        for stale in journal::list_journal_ids(self.engine(), self.table())? {
            warn!(table = %self.table, journal_id = stale, "rolling back stale journal");
            journal::rollback_journal_state(self.engine(), self.table(), stale)?;
        }
        journal::sweep_orphaned_objects(self.engine(), self.table())?;
        Ok(())
    }

    /// The single head, or the most recent by generation while a merge is
    /// transiently in flight.
    pub(crate) fn current_head(&self) -> Result<Commit> {
        self.graph()
            .heads()?
            .into_iter()
            .next()
            .ok_or_else(|| Error::corruption("page has no head"))
    }

    /// Allocate the next journal id from the page's metadata counter.
    pub(crate) fn allocate_journal_id(&self) -> Result<JournalId> {
        let mut batch = self.engine.batch()?;
        let next = match batch.get(&self.table, keys::KEY_NEXT_JOURNAL_ID)? {
            Some(bytes) => decode_u64(&bytes)?,
            None => 0,
        };
        batch.put(&self.table, keys::KEY_NEXT_JOURNAL_ID, &encode_u64(next + 1))?;
        batch.commit()?;
        Ok(next)
    }

    /// Append a landed commit to every watcher's pending queue.
    pub(crate) fn enqueue_commit(&self, id: CommitId) {
        for entry in &mut lock(&self.state).watchers {
            entry.pending.push(id);
        }
    }

    /// Pin a commit against pruning and build a snapshot on it.
    pub(crate) fn snapshot_of(page: &Arc<Self>, commit: Commit) -> Snapshot<E> {
        *lock(&page.state).pins.entry(commit.id).or_insert(0) += 1;
        Snapshot::new(Arc::clone(page), commit)
    }

    pub(crate) fn unpin(&self, id: &CommitId) {
        let mut state = lock(&self.state);
        if let Some(count) = state.pins.get_mut(id) {
            *count -= 1;
            if *count == 0 {
                state.pins.remove(id);
            }
        }
    }

    /// Merge concurrent heads until a single head remains.
    ///
    /// Caller holds the operation lock. Heads that appear while a merge is
    /// running are picked up by the next loop iteration.
    pub(crate) fn reconcile_locked(page: &Arc<Self>) -> Result<()> {
        let mut previous_head_count = usize::MAX;
        loop {
            let heads = page.graph().heads()?;
            if heads.len() < 2 {
                return Ok(());
            }
            // Every merge removes two heads and adds one; a pass that fails
            // to shrink the head set would loop forever.
            if heads.len() >= previous_head_count {
                return Err(Error::corruption("merge did not reduce the head set"));
            }
            previous_head_count = heads.len();
            let left = &heads[0];
            let right = &heads[1];
            debug!(
                table = %page.table,
                left = %left.id,
                right = %right.id,
                "merging concurrent heads"
            );

            let resolver = Arc::clone(&lock(&page.state).resolver);
            let ancestor = page.graph().common_ancestor(&left.id, &right.id)?;
            let changes = merge::merge_changes(
                page.engine(),
                page.table(),
                &ancestor,
                left,
                right,
                resolver.as_ref(),
            )?;

            let mut journal = Journal::new_merge(Arc::clone(page), left.id, right.id)?;
            for change in changes {
                match change {
                    EntryChange::Insert(entry) => {
                        journal.put_reference(entry.key, entry.object_id, entry.priority)?;
                    }
                    EntryChange::Delete(key) => journal.delete(key)?,
                }
            }
            journal.commit_locked()?;
        }
    }

    /// Drain watcher pending queues, delivering ordered changes.
    ///
    /// Caller holds the operation lock. Callbacks run without the state
    /// lock so watchers may take snapshots; they must not mutate the page.
    pub(crate) fn pump_watchers_locked(page: &Arc<Self>) -> Result<()> {
        loop {
            let mut work = Vec::new();
            {
                let mut state = lock(&page.state);
                for entry in &mut state.watchers {
                    if entry.pending.is_empty() || entry.watcher.is_none() {
                        continue;
                    }
                    let watcher = entry.watcher.take().expect("checked above");
                    work.push((entry.id, entry.cursor, std::mem::take(&mut entry.pending), watcher));
                }
            }
            if work.is_empty() {
                return Ok(());
            }

            let mut outcomes = Vec::new();
            let mut first_error = None;
            for (id, cursor, pending, mut watcher) in work {
                match Self::deliver(page, watcher.as_mut(), cursor, pending) {
                    Ok((cursor, ack)) => outcomes.push((id, watcher, cursor, ack)),
                    Err(err) => {
                        // The subscription survives; undelivered commits are
                        // coalesced into a later delivery.
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                        outcomes.push((id, watcher, cursor, WatcherAck::Continue));
                    }
                }
            }

            {
                let mut state = lock(&page.state);
                for (id, watcher, cursor, ack) in outcomes {
                    let Some(idx) = state.watchers.iter().position(|e| e.id == id) else {
                        continue;
                    };
                    if ack == WatcherAck::Unsubscribe {
                        state.watchers.remove(idx);
                    } else {
                        state.watchers[idx].watcher = Some(watcher);
                        state.watchers[idx].cursor = cursor;
                    }
                }
            }
            if let Some(err) = first_error {
                return Err(err);
            }
        }
    }

    /// Deliver one watcher's backlog. Returns the advanced cursor and the
    /// watcher's last acknowledgement.
    fn deliver(
        page: &Arc<Self>,
        watcher: &mut dyn PageWatcher<E>,
        mut cursor: CommitId,
        pending: Vec<CommitId>,
    ) -> Result<(CommitId, WatcherAck)> {
        let graph = page.graph();

        // A deep backlog collapses into one delivery of the cursor-to-head
        // diff; intermediate commits are skipped but the cursor still
        // advances monotonically.
        let targets: Vec<CommitId> = if pending.len() > COALESCE_THRESHOLD {
            vec![*pending.last().expect("non-empty backlog")]
        } else {
            pending
        };

        for target in targets {
            if target == cursor {
                continue;
            }
            let from = graph.get_commit(&cursor)?;
            let to = graph.get_commit(&target)?;
            let diffs = diff_trees(page.engine(), page.table(), &from.root_id, &to.root_id)?;
            cursor = target;
            if diffs.is_empty() {
                // Content-neutral commits (no-op merges) advance the cursor
                // without a delivery.
                continue;
            }
            let change = Self::build_page_change(page, to.timestamp, diffs)?;
            let snapshot = Self::snapshot_of(page, to);
            match watcher.on_change(&change, snapshot) {
                WatcherAck::Continue => {}
                WatcherAck::Unsubscribe => return Ok((cursor, WatcherAck::Unsubscribe)),
            }
        }
        Ok((cursor, WatcherAck::Continue))
    }

    fn build_page_change(
        page: &Arc<Self>,
        timestamp: u64,
        diffs: Vec<EntryDiff>,
    ) -> Result<PageChange> {
        let store = page.object_store();
        let mut change = PageChange { timestamp, ..PageChange::default() };
        for diff in diffs {
            match diff.new {
                Some(entry) => {
                    let bytes = store.get_referenced_object(&entry.object_id)?;
                    let value = if bytes.len() <= INLINE_VALUE_THRESHOLD {
                        stratadb_core::Value::Inline(bytes)
                    } else {
                        stratadb_core::Value::Reference {
                            id: entry.object_id,
                            size: bytes.len() as u64,
                        }
                    };
                    change.changed_entries.push(ChangedEntry {
                        key: diff.key,
                        value,
                        priority: entry.priority,
                    });
                }
                None => change.deleted_keys.push(diff.key),
            }
        }
        Ok(change)
    }
}
