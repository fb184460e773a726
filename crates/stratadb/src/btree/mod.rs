//! Copy-on-write Merkle B-tree.
//!
//! Each commit's content is an immutable ordered map stored as a tree of
//! content-addressed nodes. Node boundaries are a pure function of content
//! (see [`builder`]), so two devices that hold the same logical map hold
//! byte-identical nodes, whatever sequence of edits produced it.
//!
//! - [`lookup`] descends from a root to a single entry.
//! - [`builder::apply_changes`] produces a new tree from a base tree and a
//!   key-ordered change stream.
//! - [`iter::collect_prefix`] streams entries for snapshots.
//! - [`diff::diff_trees`] yields the ordered entry-level difference between
//!   two roots.

pub(crate) mod builder;
pub(crate) mod diff;
pub(crate) mod iter;

use stratadb_core::encoding::keys;
use stratadb_core::encoding::node::{decode_node, empty_root_id, NodeData};
use stratadb_core::{hash, Entry, ObjectId};
use stratadb_storage::StorageEngine;

use crate::error::{Error, Result};

/// Read access to stored tree nodes, with content-hash verification.
pub(crate) struct NodeStore<'a, E> {
    engine: &'a E,
    table: &'a str,
}

impl<'a, E: StorageEngine> NodeStore<'a, E> {
    pub(crate) fn new(engine: &'a E, table: &'a str) -> Self {
        Self { engine, table }
    }

    /// Load and verify the node stored under `id`.
    ///
    /// The empty tree's root is synthesized rather than read: it is the one
    /// node every page shares before its first commit. Any other missing
    /// node, or a content-hash mismatch, is corruption.
    pub(crate) fn read_node(&self, id: &ObjectId) -> Result<NodeData> {
        if *id == empty_root_id() {
            return Ok(NodeData::empty_leaf());
        }
        let bytes = self
            .engine
            .get(self.table, &keys::object_key(id))?
            .ok_or_else(|| Error::corruption(format!("tree node {id} missing")))?;
        if hash::hash_node(&bytes) != *id {
            return Err(Error::corruption(format!("tree node {id} failed content-hash check")));
        }
        Ok(decode_node(&bytes)?)
    }
}

/// Look up the entry for `key` in the tree rooted at `root_id`.
pub(crate) fn lookup<E: StorageEngine>(
    engine: &E,
    table: &str,
    root_id: &ObjectId,
    key: &[u8],
) -> Result<Option<Entry>> {
    let store = NodeStore::new(engine, table);
    let mut node = store.read_node(root_id)?;
    loop {
        if node.is_leaf() {
            return Ok(match node.entries.binary_search_by(|e| e.key.as_slice().cmp(key)) {
                Ok(idx) => Some(node.entries[idx].clone()),
                Err(_) => None,
            });
        }
        // An interior entry's key is the greatest key in its child subtree:
        // the first child whose max is >= the target covers it.
        let idx = node.entries.partition_point(|e| e.key.as_slice() < key);
        let Some(child) = node.entries.get(idx) else {
            return Ok(None);
        };
        node = store.read_node(&child.object_id)?;
    }
}
