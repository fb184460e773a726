//! Tree construction from change streams.
//!
//! [`apply_changes`] merges a strictly-ascending stream of entry changes
//! with the base tree's entries and rebuilds the tree bottom-up. Node
//! boundaries are decided by the content-derived weight of each entry (the
//! key at leaf level, the child id above), so the resulting node set is a
//! pure function of the final entry list: the same logical map always
//! chunks into the same physical nodes, which is what makes structural
//! sharing and cross-device deduplication work.
//!
//! Boundary policy: a node closes at an entry whose weight hits the
//! boundary pattern (expected fan-out 32), never before 16 entries, and
//! always at 64.

use stratadb_core::encoding::keys;
use stratadb_core::encoding::node::{encode_node, NodeData};
use stratadb_core::{hash, Entry, EntryChange, ObjectId, Priority, SyncStatus};
use stratadb_storage::{StorageEngine, WriteBatch};

use crate::error::{Error, Result};
use crate::interrupt::Interrupt;
use crate::store::ObjectStore;

use super::iter;

/// Expected entries per node.
const TARGET_FANOUT: u64 = 32;
/// A boundary is ignored below this many entries.
const MIN_FANOUT: usize = 16;
/// A node never grows past this many entries.
const MAX_FANOUT: usize = 64;

/// Returns `true` if `weight_source` terminates a node.
fn is_boundary(weight_source: &[u8]) -> bool {
    hash::boundary_weight(weight_source) % TARGET_FANOUT == 0
}

/// Apply a key-ordered change stream to the tree rooted at `base_root`.
///
/// New nodes are written into `batch` along with a reference-count increment
/// for every object they point at and an `Unsynced` marker; nothing becomes
/// visible until the caller commits the batch. Returns the new root id and
/// the ids of nodes that were not previously stored.
///
/// A change stream that leaves the tree untouched returns the base root and
/// writes nothing. The stream must be strictly ascending by key; anything
/// else is a programming error in the caller.
pub(crate) fn apply_changes<E: StorageEngine, B: WriteBatch>(
    engine: &E,
    table: &str,
    batch: &mut B,
    base_root: &ObjectId,
    changes: Vec<EntryChange>,
    interrupt: &Interrupt,
) -> Result<(ObjectId, Vec<ObjectId>)> {
    for pair in changes.windows(2) {
        if pair[0].key() >= pair[1].key() {
            debug_assert!(false, "change stream must be strictly ascending");
            return Err(Error::corruption("change stream not strictly ascending"));
        }
    }

    let old_entries = iter::collect_prefix(engine, table, base_root, b"", None, usize::MAX)?;
    let (entries, changed) = merge_changes(old_entries, changes);
    if !changed {
        return Ok((*base_root, Vec::new()));
    }

    let nodes = build_nodes(entries, interrupt)?;
    write_nodes(engine, table, batch, nodes, interrupt)
}

/// Merge the base tree's entries with the change stream.
///
/// Returns the final entry list and whether anything actually changed:
/// inserts that restate the existing binding and deletes of absent keys are
/// no-ops.
fn merge_changes(
    old_entries: Vec<Entry>,
    changes: Vec<EntryChange>,
) -> (Vec<Entry>, bool) {
    let mut merged = Vec::with_capacity(old_entries.len() + changes.len());
    let mut changed = false;

    let mut old_iter = old_entries.into_iter().peekable();
    for change in changes {
        // Pass through old entries below the change key.
        while old_iter.peek().is_some_and(|e| e.key.as_slice() < change.key()) {
            merged.push(old_iter.next().unwrap());
        }
        let existing = old_iter
            .peek()
            .is_some_and(|e| e.key.as_slice() == change.key())
            .then(|| old_iter.next().unwrap());

        match change {
            EntryChange::Insert(entry) => {
                if existing.as_ref() != Some(&entry) {
                    changed = true;
                }
                merged.push(entry);
            }
            EntryChange::Delete(_) => {
                if existing.is_some() {
                    changed = true;
                }
            }
        }
    }
    merged.extend(old_iter);
    (merged, changed)
}

/// Chunk the final entry list into nodes, level by level.
fn build_nodes(entries: Vec<Entry>, interrupt: &Interrupt) -> Result<Vec<NodeData>> {
    if entries.is_empty() {
        return Ok(vec![NodeData::empty_leaf()]);
    }

    let mut all_nodes = Vec::new();
    let mut level_nodes = chunk_level(0, entries, |entry| entry.key.clone());

    loop {
        interrupt.check()?;
        all_nodes.extend(level_nodes.iter().cloned());
        if level_nodes.len() == 1 {
            return Ok(all_nodes);
        }
        let level = level_nodes[0].level + 1;
        let child_refs: Vec<Entry> = level_nodes
            .iter()
            .map(|node| {
                let max_key = node.entries.last().expect("non-empty node").key.clone();
                Entry::new(max_key, node.id(), Priority::Eager)
            })
            .collect();
        // Interior boundaries hang off the child id, not the separator key.
        level_nodes = chunk_level(level, child_refs, |entry| entry.object_id.as_bytes().to_vec());
    }
}

fn chunk_level(
    level: u8,
    entries: Vec<Entry>,
    weight_source: impl Fn(&Entry) -> Vec<u8>,
) -> Vec<NodeData> {
    let mut nodes = Vec::new();
    let mut current: Vec<Entry> = Vec::new();
    for entry in entries {
        let source = weight_source(&entry);
        current.push(entry);
        let full = current.len() >= MAX_FANOUT;
        if full || (current.len() >= MIN_FANOUT && is_boundary(&source)) {
            nodes.push(NodeData { level, entries: std::mem::take(&mut current) });
        }
    }
    if !current.is_empty() {
        nodes.push(NodeData { level, entries: current });
    }
    nodes
}

/// Write nodes that are not already stored, bumping the reference count of
/// everything each new node points at and marking it unsynced.
fn write_nodes<E: StorageEngine, B: WriteBatch>(
    engine: &E,
    table: &str,
    batch: &mut B,
    nodes: Vec<NodeData>,
    interrupt: &Interrupt,
) -> Result<(ObjectId, Vec<ObjectId>)> {
    let store = ObjectStore::new(engine, table);
    let mut new_ids = Vec::new();
    // build_nodes emits levels bottom-up and the top level is a single node.
    let root_id = nodes.last().expect("non-empty node list").id();

    for node in &nodes {
        interrupt.check()?;
        let id = node.id();
        let key = keys::object_key(&id);
        if batch.get(table, &key)?.is_some() {
            continue;
        }
        batch.put(table, &key, &encode_node(node))?;
        store.set_sync_status(batch, &id, SyncStatus::Unsynced)?;
        for entry in &node.entries {
            store.inc_ref(batch, &entry.object_id, 1)?;
        }
        new_ids.push(id);
    }
    Ok((root_id, new_ids))
}
