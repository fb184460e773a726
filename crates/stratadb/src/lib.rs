//! `StrataDB` - A Versioned Key-Value Page Store
//!
//! `StrataDB` is a local, eventually-consistent store of independently
//! versioned *pages*: ordered byte-key maps whose history forms a DAG of
//! content-addressed commits. Clients read consistent snapshots, mutate
//! through journals that commit atomically, and observe changes through
//! ordered watchers; concurrent writers are reconciled by automatic merges.
//!
//! # Quick Start
//!
//! ```ignore
//! use stratadb::{JournalType, Priority, Store};
//!
//! let store = Store::open("store.redb")?;
//! let page = store.open_page(&"settings".into())?;
//!
//! // Stage and commit mutations.
//! let mut tx = page.start_transaction(JournalType::Implicit)?;
//! tx.put(b"theme", b"dark", Priority::Eager)?;
//! tx.commit()?;
//!
//! // Read a consistent snapshot.
//! let snapshot = page.get_snapshot()?;
//! let value = snapshot.get(b"theme")?;
//!
//! // Iterate by prefix.
//! let (keys, _token) = snapshot.get_keys(b"", None)?;
//! ```
//!
//! # Concurrent Writers
//!
//! Two handles to the same page may commit concurrently; the page's head
//! set transiently holds both commits until the merger reconciles them into
//! a merge commit. The default conflict policy is last-writer-wins by
//! commit timestamp; install a custom [`ConflictResolver`] per page to
//! override it.
//!
//! # Watchers
//!
//! ```ignore
//! use stratadb::{PageChange, PageWatcher, Snapshot, WatcherAck};
//!
//! struct Logger;
//! impl<E: stratadb::StorageEngine> PageWatcher<E> for Logger {
//!     fn on_initial_state(&mut self, _snapshot: Snapshot<E>) {}
//!     fn on_change(&mut self, change: &PageChange, _snapshot: Snapshot<E>) -> WatcherAck {
//!         println!("{} keys changed", change.changed_entries.len());
//!         WatcherAck::Continue
//!     }
//! }
//! ```

pub mod error;
pub mod interrupt;
pub mod journal;
pub mod merge;
pub mod page;
pub mod watch;

pub(crate) mod btree;
pub(crate) mod commit;
pub(crate) mod store;

pub use error::{Error, Result, Status};
pub use interrupt::Interrupt;
pub use journal::{Journal, JournalType};
pub use merge::{ConflictResolver, LastWriterWins, MergeSide};
pub use page::{PageHandle, Snapshot, SnapshotEntry, Store, StoreConfig, MAX_RESULT_BATCH};
pub use watch::{ChangedEntry, PageChange, PageWatcher, WatcherAck, COALESCE_THRESHOLD};

// Re-export the core vocabulary types.
pub use stratadb_core::{
    Commit, CommitId, Entry, ObjectId, PageId, Priority, SyncStatus, Value,
    INLINE_VALUE_THRESHOLD, MAX_KEY_SIZE,
};

// Re-export the backend surface so embedders rarely need the storage crate
// directly.
pub use stratadb_storage::{backends::RedbEngine, StorageEngine};
