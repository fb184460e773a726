//! Entry-level difference between two trees.

use stratadb_core::{Entry, ObjectId};
use stratadb_storage::StorageEngine;

use crate::error::Result;

use super::iter;

/// One differing key between two trees.
///
/// `old` is the entry in the left tree, `new` the entry in the right tree;
/// an absent side means the key only exists in the other tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EntryDiff {
    pub key: Vec<u8>,
    pub old: Option<Entry>,
    pub new: Option<Entry>,
}

/// Compute the key-ordered difference between the trees rooted at
/// `old_root` and `new_root`.
///
/// Identical roots short-circuit to an empty diff; content addressing makes
/// that check exact.
pub(crate) fn diff_trees<E: StorageEngine>(
    engine: &E,
    table: &str,
    old_root: &ObjectId,
    new_root: &ObjectId,
) -> Result<Vec<EntryDiff>> {
    if old_root == new_root {
        return Ok(Vec::new());
    }

    let old_entries = iter::collect_prefix(engine, table, old_root, b"", None, usize::MAX)?;
    let new_entries = iter::collect_prefix(engine, table, new_root, b"", None, usize::MAX)?;

    let mut diffs = Vec::new();
    let mut old_iter = old_entries.into_iter().peekable();
    let mut new_iter = new_entries.into_iter().peekable();

    loop {
        match (old_iter.peek(), new_iter.peek()) {
            (Some(old), Some(new)) => {
                if old.key < new.key {
                    let old = old_iter.next().unwrap();
                    diffs.push(EntryDiff { key: old.key.clone(), old: Some(old), new: None });
                } else if old.key > new.key {
                    let new = new_iter.next().unwrap();
                    diffs.push(EntryDiff { key: new.key.clone(), old: None, new: Some(new) });
                } else {
                    let old = old_iter.next().unwrap();
                    let new = new_iter.next().unwrap();
                    if old != new {
                        diffs.push(EntryDiff {
                            key: old.key.clone(),
                            old: Some(old),
                            new: Some(new),
                        });
                    }
                }
            }
            (Some(_), None) => {
                let old = old_iter.next().unwrap();
                diffs.push(EntryDiff { key: old.key.clone(), old: Some(old), new: None });
            }
            (None, Some(_)) => {
                let new = new_iter.next().unwrap();
                diffs.push(EntryDiff { key: new.key.clone(), old: None, new: Some(new) });
            }
            (None, None) => return Ok(diffs),
        }
    }
}
