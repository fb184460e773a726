//! In-order entry iteration over a tree.

use stratadb_core::{Entry, ObjectId};
use stratadb_storage::StorageEngine;

use crate::error::Result;

use super::NodeStore;

/// Collect up to `limit` entries whose keys start with `prefix`, in
/// ascending key order, resuming strictly after `after` when given.
///
/// Passing the last returned key back as `after` streams the whole prefix
/// in stable pages, which is what backs snapshot continuation tokens.
pub(crate) fn collect_prefix<E: StorageEngine>(
    engine: &E,
    table: &str,
    root_id: &ObjectId,
    prefix: &[u8],
    after: Option<&[u8]>,
    limit: usize,
) -> Result<Vec<Entry>> {
    let store = NodeStore::new(engine, table);
    let mut out = Vec::new();
    if limit > 0 {
        walk(&store, root_id, prefix, after, limit, &mut out)?;
    }
    Ok(out)
}

/// Depth-first in-order walk. Returns `true` when iteration is finished,
/// either because `limit` entries were collected or the walk moved past the
/// prefix range.
fn walk<E: StorageEngine>(
    store: &NodeStore<'_, E>,
    node_id: &ObjectId,
    prefix: &[u8],
    after: Option<&[u8]>,
    limit: usize,
    out: &mut Vec<Entry>,
) -> Result<bool> {
    let node = store.read_node(node_id)?;

    if node.is_leaf() {
        for entry in node.entries {
            if after.is_some_and(|a| entry.key.as_slice() <= a) {
                continue;
            }
            if entry.key.starts_with(prefix) {
                out.push(entry);
                if out.len() >= limit {
                    return Ok(true);
                }
            } else if entry.key.as_slice() > prefix {
                // Sorted keys: once past the prefix nothing else matches.
                return Ok(true);
            }
        }
        return Ok(false);
    }

    for child in node.entries {
        // A subtree whose greatest key is below the resume point or the
        // prefix start cannot contribute.
        if after.is_some_and(|a| child.key.as_slice() <= a) {
            continue;
        }
        if child.key.as_slice() < prefix {
            continue;
        }
        if walk(store, &child.object_id, prefix, after, limit, out)? {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::builder::apply_changes;
    use crate::interrupt::Interrupt;
    use stratadb_core::encoding::node::empty_root_id;
    use stratadb_core::{EntryChange, Priority};
    use stratadb_storage::backends::RedbEngine;
    use stratadb_storage::WriteBatch;

    fn build(engine: &RedbEngine, keys: &[&[u8]]) -> ObjectId {
        let changes: Vec<EntryChange> = keys
            .iter()
            .map(|key| {
                EntryChange::Insert(Entry::new(
                    key.to_vec(),
                    ObjectId::from_bytes([1; 32]),
                    Priority::Eager,
                ))
            })
            .collect();
        let mut batch = engine.batch().unwrap();
        let (root, _) =
            apply_changes(engine, "t", &mut batch, &empty_root_id(), changes, &Interrupt::new())
                .unwrap();
        batch.commit().unwrap();
        root
    }

    fn keys_of(entries: &[Entry]) -> Vec<&[u8]> {
        entries.iter().map(|e| e.key.as_slice()).collect()
    }

    #[test]
    fn prefix_selection() {
        let engine = RedbEngine::in_memory().unwrap();
        let root = build(&engine, &[b"\x00\x00A", b"\x00\x00B", b"\x00\x01A", b"\x00\x01B"]);

        let all = collect_prefix(&engine, "t", &root, b"", None, usize::MAX).unwrap();
        assert_eq!(all.len(), 4);

        let zero = collect_prefix(&engine, "t", &root, b"\x00", None, usize::MAX).unwrap();
        assert_eq!(zero.len(), 4);

        let zero_zero =
            collect_prefix(&engine, "t", &root, b"\x00\x00", None, usize::MAX).unwrap();
        assert_eq!(keys_of(&zero_zero), vec![&b"\x00\x00A"[..], b"\x00\x00B"]);

        let tight =
            collect_prefix(&engine, "t", &root, b"\x00\x01A", None, usize::MAX).unwrap();
        assert_eq!(tight.len(), 1);

        let none = collect_prefix(&engine, "t", &root, b"\x05", None, usize::MAX).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn continuation_is_stable() {
        let engine = RedbEngine::in_memory().unwrap();
        let keys: Vec<Vec<u8>> = (0u32..300).map(|i| format!("k/{i:04}").into_bytes()).collect();
        let refs: Vec<&[u8]> = keys.iter().map(Vec::as_slice).collect();
        let root = build(&engine, &refs);

        let mut collected = Vec::new();
        let mut after: Option<Vec<u8>> = None;
        loop {
            let page =
                collect_prefix(&engine, "t", &root, b"k/", after.as_deref(), 37).unwrap();
            if page.is_empty() {
                break;
            }
            after = Some(page.last().unwrap().key.clone());
            collected.extend(page);
        }
        assert_eq!(keys_of(&collected), refs);
    }

    #[test]
    fn limit_zero_yields_nothing() {
        let engine = RedbEngine::in_memory().unwrap();
        let root = build(&engine, &[b"a"]);
        assert!(collect_prefix(&engine, "t", &root, b"", None, 0).unwrap().is_empty());
    }
}
