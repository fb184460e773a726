//! Automatic reconciliation of concurrent heads.
//!
//! When a page's head set grows past one, the merger picks a pair of heads,
//! computes the three-way difference against their common ancestor, resolves
//! it key by key, and commits the result as a merge commit whose parents are
//! the two heads. Merging repeats until a single head remains.
//!
//! Per-key policy: a change on only one side wins outright; identical
//! changes on both sides collapse; a genuine conflict goes to the page's
//! [`ConflictResolver`]. The default resolver is last-writer-wins by
//! `(commit timestamp, commit id)`, right-biased on ties.
//!
//! Merge commits take `max(parent timestamps)` as their own timestamp, so
//! merging the same pair on two devices produces the same commit id.

use stratadb_core::{Commit, CommitId, Entry, EntryChange};
use stratadb_storage::StorageEngine;

use crate::btree::diff::diff_trees;
use crate::error::Result;

/// One side of a conflict, as presented to a [`ConflictResolver`].
#[derive(Debug, Clone, Copy)]
pub struct MergeSide<'a> {
    /// The head commit on this side.
    pub commit_id: CommitId,
    /// The head commit's timestamp.
    pub timestamp: u64,
    /// This side's outcome for the key; `None` means the side deleted it.
    pub entry: Option<&'a Entry>,
}

/// Per-key conflict resolution policy.
///
/// Invoked only for genuine conflicts: both sides changed the key relative
/// to the common ancestor and disagree on the outcome.
pub trait ConflictResolver: Send + Sync {
    /// Pick the merged outcome for `key`; `None` deletes the key.
    fn resolve(
        &self,
        key: &[u8],
        base: Option<&Entry>,
        left: MergeSide<'_>,
        right: MergeSide<'_>,
    ) -> Option<Entry>;
}

/// Last-writer-wins by `(commit timestamp, commit id)`, right-biased on
/// ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriterWins;

impl ConflictResolver for LastWriterWins {
    fn resolve(
        &self,
        _key: &[u8],
        _base: Option<&Entry>,
        left: MergeSide<'_>,
        right: MergeSide<'_>,
    ) -> Option<Entry> {
        if (left.timestamp, left.commit_id) > (right.timestamp, right.commit_id) {
            left.entry.cloned()
        } else {
            right.entry.cloned()
        }
    }
}

/// Compute the change stream that turns `left`'s tree into the merged tree.
///
/// `base` is the common ancestor of the two heads. The result is key-ordered
/// and ready for a merge journal whose first parent is `left`.
pub(crate) fn merge_changes<E: StorageEngine>(
    engine: &E,
    table: &str,
    base: &Commit,
    left: &Commit,
    right: &Commit,
    resolver: &dyn ConflictResolver,
) -> Result<Vec<EntryChange>> {
    let left_diffs = diff_trees(engine, table, &base.root_id, &left.root_id)?;
    let right_diffs = diff_trees(engine, table, &base.root_id, &right.root_id)?;

    let mut changes = Vec::new();
    let mut left_iter = left_diffs.into_iter().peekable();
    let mut right_iter = right_diffs.into_iter().peekable();

    loop {
        let ordering = match (left_iter.peek(), right_iter.peek()) {
            (Some(l), Some(r)) => l.key.cmp(&r.key),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => break,
        };

        match ordering {
            // Only the left side changed the key; the left tree is the merge
            // base, so nothing needs staging.
            std::cmp::Ordering::Less => {
                left_iter.next();
            }
            // Only the right side changed the key: adopt its outcome.
            std::cmp::Ordering::Greater => {
                let diff = right_iter.next().unwrap();
                changes.push(outcome_to_change(diff.key, diff.new));
            }
            std::cmp::Ordering::Equal => {
                let left_diff = left_iter.next().unwrap();
                let right_diff = right_iter.next().unwrap();
                if left_diff.new == right_diff.new {
                    // Both sides agree; the left tree already has it.
                    continue;
                }
                let resolved = resolver.resolve(
                    &left_diff.key,
                    left_diff.old.as_ref(),
                    MergeSide {
                        commit_id: left.id,
                        timestamp: left.timestamp,
                        entry: left_diff.new.as_ref(),
                    },
                    MergeSide {
                        commit_id: right.id,
                        timestamp: right.timestamp,
                        entry: right_diff.new.as_ref(),
                    },
                );
                // Staging is relative to the left tree: skip outcomes the
                // left side already holds.
                if resolved != left_diff.new {
                    changes.push(outcome_to_change(left_diff.key, resolved));
                }
            }
        }
    }
    Ok(changes)
}

fn outcome_to_change(key: Vec<u8>, outcome: Option<Entry>) -> EntryChange {
    match outcome {
        Some(entry) => EntryChange::Insert(entry),
        None => EntryChange::Delete(key),
    }
}
