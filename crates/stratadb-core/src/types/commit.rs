//! Commit records and identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash;

use super::ObjectId;

/// Identifier of a commit.
///
/// Commit ids are content-derived: the hash of the commit's root id, sorted
/// parents, and metadata. Identical content yields identical ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitId(ObjectId);

impl CommitId {
    /// The sentinel id of the implicit genesis commit shared by all pages.
    pub const GENESIS: Self = Self(ObjectId::ZERO);

    /// Create a `CommitId` from an underlying object id.
    #[must_use]
    pub const fn from_object_id(id: ObjectId) -> Self {
        Self(id)
    }

    /// The underlying object id.
    #[must_use]
    pub const fn as_object_id(&self) -> &ObjectId {
        &self.0
    }

    /// The raw hash bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Returns `true` if this is the genesis sentinel.
    #[must_use]
    pub fn is_genesis(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId(")?;
        for byte in &self.as_bytes()[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "…)")
    }
}

/// An immutable snapshot of a page's history.
///
/// A commit names the root of the B-tree holding the page's content, its one
/// or two parents, and ordering metadata. The first parent is the base the
/// commit was built on; a second parent marks a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// The content-derived commit id.
    pub id: CommitId,
    /// The root node of the page content at this commit.
    pub root_id: ObjectId,
    /// Parent commits: one for a regular commit, two for a merge.
    pub parents: Vec<CommitId>,
    /// Distance from genesis: `max(parent generations) + 1`.
    pub generation: u64,
    /// Creation time in milliseconds since the Unix epoch. Merge commits use
    /// the maximum of their parents' timestamps so merges are idempotent.
    pub timestamp: u64,
}

impl Commit {
    /// Build a commit from its content, deriving the id.
    ///
    /// `parents` keeps caller order (the base first); the id hashes them in
    /// sorted order so equal content always yields an equal id.
    #[must_use]
    pub fn from_content(
        root_id: ObjectId,
        parents: Vec<CommitId>,
        generation: u64,
        timestamp: u64,
    ) -> Self {
        debug_assert!(!parents.is_empty() && parents.len() <= 2);
        let id = Self::derive_id(&root_id, &parents, generation, timestamp);
        Self { id, root_id, parents, generation, timestamp }
    }

    /// The implicit genesis commit with the given empty-tree root.
    #[must_use]
    pub fn genesis(empty_root_id: ObjectId) -> Self {
        Self {
            id: CommitId::GENESIS,
            root_id: empty_root_id,
            parents: Vec::new(),
            generation: 0,
            timestamp: 0,
        }
    }

    /// Returns `true` if this commit has two parents.
    #[must_use]
    pub fn is_merge(&self) -> bool {
        self.parents.len() == 2
    }

    /// Derive the content-addressed id of a commit.
    fn derive_id(
        root_id: &ObjectId,
        parents: &[CommitId],
        generation: u64,
        timestamp: u64,
    ) -> CommitId {
        let mut sorted: Vec<&CommitId> = parents.iter().collect();
        sorted.sort();

        let mut content = Vec::with_capacity(32 + parents.len() * 32 + 16);
        content.extend_from_slice(root_id.as_bytes());
        for parent in sorted {
            content.extend_from_slice(parent.as_bytes());
        }
        content.extend_from_slice(&generation.to_be_bytes());
        content.extend_from_slice(&timestamp.to_be_bytes());
        CommitId::from_object_id(hash::hash_commit(&content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(byte: u8) -> ObjectId {
        ObjectId::from_bytes([byte; 32])
    }

    #[test]
    fn id_is_content_derived() {
        let parents = vec![CommitId::GENESIS];
        let a = Commit::from_content(oid(1), parents.clone(), 1, 42);
        let b = Commit::from_content(oid(1), parents, 1, 42);
        assert_eq!(a.id, b.id);

        let c = Commit::from_content(oid(2), vec![CommitId::GENESIS], 1, 42);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn parent_order_does_not_affect_id() {
        let p1 = CommitId::from_object_id(oid(1));
        let p2 = CommitId::from_object_id(oid(2));
        let a = Commit::from_content(oid(9), vec![p1, p2], 3, 7);
        let b = Commit::from_content(oid(9), vec![p2, p1], 3, 7);
        assert_eq!(a.id, b.id);
        // Storage order is preserved even though the hash sorts.
        assert_eq!(a.parents, vec![p1, p2]);
        assert_eq!(b.parents, vec![p2, p1]);
    }

    #[test]
    fn genesis_commit() {
        let genesis = Commit::genesis(oid(0));
        assert!(genesis.id.is_genesis());
        assert_eq!(genesis.generation, 0);
        assert!(genesis.parents.is_empty());
        assert!(!genesis.is_merge());
    }
}
