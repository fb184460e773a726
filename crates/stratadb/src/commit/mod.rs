//! The per-page commit graph and head set.
//!
//! Commits form a DAG rooted at the implicit genesis commit, which is shared
//! by every page and never stored. The head set `H/` holds the commits with
//! no known children; it has exactly one element except transiently while a
//! merge is in flight.

use std::collections::{BTreeSet, HashSet};

use stratadb_core::encoding::commit::{decode_commit, encode_commit};
use stratadb_core::encoding::keys;
use stratadb_core::encoding::node::empty_root_id;
use stratadb_core::{Commit, CommitId};
use stratadb_storage::{StorageEngine, WriteBatch};

use crate::error::{Error, Result};
use crate::store::ObjectStore;

/// Commit graph bound to one page's logical table.
pub(crate) struct CommitGraph<'a, E> {
    engine: &'a E,
    table: &'a str,
}

impl<'a, E: StorageEngine> CommitGraph<'a, E> {
    pub(crate) fn new(engine: &'a E, table: &'a str) -> Self {
        Self { engine, table }
    }

    /// Seed a fresh page: make the genesis commit the sole head.
    ///
    /// Idempotent; pages that already have heads are left untouched.
    pub(crate) fn ensure_initialized<B: WriteBatch>(&self, batch: &mut B) -> Result<()> {
        if !self.engine.scan_prefix(self.table, keys::PREFIX_HEAD, None, 1)?.is_empty() {
            return Ok(());
        }
        batch.put(self.table, &keys::head_key(&CommitId::GENESIS), &[])?;
        Ok(())
    }

    /// Load a commit record. The genesis commit is synthesized.
    pub(crate) fn get_commit(&self, id: &CommitId) -> Result<Commit> {
        if id.is_genesis() {
            return Ok(Commit::genesis(empty_root_id()));
        }
        let bytes = self
            .engine
            .get(self.table, &keys::commit_key(id))?
            .ok_or_else(|| Error::corruption(format!("commit {id} missing")))?;
        Ok(decode_commit(*id, &bytes)?)
    }

    /// Returns `true` if a record exists for `id`.
    pub(crate) fn contains(&self, id: &CommitId) -> Result<bool> {
        if id.is_genesis() {
            return Ok(true);
        }
        Ok(self.engine.get(self.table, &keys::commit_key(id))?.is_some())
    }

    /// The current head set, sorted by (generation descending, id
    /// ascending).
    pub(crate) fn heads(&self) -> Result<Vec<Commit>> {
        let mut heads = Vec::new();
        let mut after: Option<Vec<u8>> = None;
        loop {
            let page =
                self.engine.scan_prefix(self.table, keys::PREFIX_HEAD, after.as_deref(), 64)?;
            if page.is_empty() {
                break;
            }
            after = Some(page.last().unwrap().0.clone());
            for (key, _) in page {
                let id = keys::decode_commit_id(keys::PREFIX_HEAD, &key)
                    .ok_or_else(|| Error::corruption("malformed head key"))?;
                heads.push(self.get_commit(&id)?);
            }
        }
        heads.sort_by(|a, b| {
            b.generation.cmp(&a.generation).then_with(|| a.id.cmp(&b.id))
        });
        Ok(heads)
    }

    /// Insert a commit and advance the head set in the supplied batch:
    /// parents leave the head set, the new commit enters it, and the new
    /// root gains a reference.
    pub(crate) fn add_commit<B: WriteBatch>(
        &self,
        batch: &mut B,
        commit: &Commit,
        store: &ObjectStore<'_, E>,
    ) -> Result<()> {
        batch.put(self.table, &keys::commit_key(&commit.id), &encode_commit(commit))?;
        for parent in &commit.parents {
            batch.delete(self.table, &keys::head_key(parent))?;
        }
        batch.put(self.table, &keys::head_key(&commit.id), &[])?;
        store.inc_ref(batch, &commit.root_id, 1)?;
        Ok(())
    }

    /// Find a common ancestor of two commits.
    ///
    /// Walks the two ancestor frontiers downward by generation until they
    /// meet; among the commits both sides reached, the lowest-generation one
    /// wins, ties broken by id.
    pub(crate) fn common_ancestor(&self, a: &CommitId, b: &CommitId) -> Result<Commit> {
        let commit_a = self.get_commit(a)?;
        let commit_b = self.get_commit(b)?;

        let mut left_frontier: BTreeSet<(u64, CommitId)> = BTreeSet::new();
        let mut right_frontier: BTreeSet<(u64, CommitId)> = BTreeSet::new();
        let mut left_seen: HashSet<CommitId> = HashSet::new();
        let mut right_seen: HashSet<CommitId> = HashSet::new();

        left_frontier.insert((commit_a.generation, commit_a.id));
        left_seen.insert(commit_a.id);
        right_frontier.insert((commit_b.generation, commit_b.id));
        right_seen.insert(commit_b.id);

        loop {
            let mut common: Vec<&CommitId> = left_seen.intersection(&right_seen).collect();
            if !common.is_empty() {
                common.sort_by_key(|id| {
                    // Frontier entries keep their generation; re-deriving it
                    // from the record keeps this independent of walk order.
                    self.get_commit(id).map(|c| (c.generation, c.id)).unwrap_or((u64::MAX, **id))
                });
                return self.get_commit(common[0]);
            }

            let left_max = left_frontier.last().map(|(gen, _)| *gen);
            let right_max = right_frontier.last().map(|(gen, _)| *gen);
            let expand_left = match (left_max, right_max) {
                (Some(l), Some(r)) => l >= r,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => {
                    return Err(Error::corruption("commit graphs share no ancestor"));
                }
            };

            let (frontier, seen) = if expand_left {
                (&mut left_frontier, &mut left_seen)
            } else {
                (&mut right_frontier, &mut right_seen)
            };
            let (_, id) = frontier.pop_last().expect("non-empty frontier");
            for parent in self.get_commit(&id)?.parents {
                let parent_commit = self.get_commit(&parent)?;
                frontier.insert((parent_commit.generation, parent));
                seen.insert(parent);
            }
        }
    }
}
