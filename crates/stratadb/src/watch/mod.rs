//! Change notification for page watchers.
//!
//! A watcher subscribes to a page and receives the page's evolution as a
//! sequence of [`PageChange`] deliveries, each relative to the previous one.
//! Deliveries follow commit order, so a watcher never observes a commit
//! before the commits it was built on; commits whose diff against the
//! watcher's cursor is empty (no-op merges) advance the cursor silently.
//!
//! When a watcher falls more than [`COALESCE_THRESHOLD`] commits behind, the
//! backlog collapses into a single delivery of the cursor-to-head diff; the
//! cursor still advances monotonically.
//!
//! Watcher callbacks run on the page's operation thread: they may read
//! snapshots freely but must not start transactions or commit on the same
//! page.

use stratadb_core::{CommitId, Priority, Value};
use stratadb_storage::StorageEngine;

use crate::page::Snapshot;

/// Pending-commit backlog beyond which deliveries are coalesced.
pub const COALESCE_THRESHOLD: usize = 16;

/// A watcher's verdict after a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherAck {
    /// Keep the subscription.
    Continue,
    /// Drop the subscription; no further deliveries arrive.
    Unsubscribe,
}

/// One changed binding in a [`PageChange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedEntry {
    /// The key that changed.
    pub key: Vec<u8>,
    /// The new value.
    pub value: Value,
    /// Fetch priority of the new value.
    pub priority: Priority,
}

/// The difference between two observed states of a page, key-ordered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageChange {
    /// Timestamp of the commit this change leads to, in milliseconds since
    /// the Unix epoch.
    pub timestamp: u64,
    /// Keys that gained or changed their value.
    pub changed_entries: Vec<ChangedEntry>,
    /// Keys that were removed.
    pub deleted_keys: Vec<Vec<u8>>,
}

impl PageChange {
    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed_entries.is_empty() && self.deleted_keys.is_empty()
    }
}

/// A subscription against a page.
pub trait PageWatcher<E: StorageEngine>: Send {
    /// Called once at registration with a snapshot of the current head.
    fn on_initial_state(&mut self, snapshot: Snapshot<E>);

    /// Called for each observed change, with a snapshot pinned to the state
    /// the change leads to. The return value acknowledges the delivery.
    fn on_change(&mut self, change: &PageChange, snapshot: Snapshot<E>) -> WatcherAck;
}

/// Fanout bookkeeping for one registered watcher.
pub(crate) struct WatcherEntry<E: StorageEngine> {
    /// Stable id for reconciling after deliveries run unlocked.
    pub(crate) id: u64,
    /// `None` while the watcher is out being delivered to.
    pub(crate) watcher: Option<Box<dyn PageWatcher<E>>>,
    /// The last commit this watcher has observed (or silently skipped).
    pub(crate) cursor: CommitId,
    /// Commits that landed since the last delivery, oldest first.
    pub(crate) pending: Vec<CommitId>,
}
