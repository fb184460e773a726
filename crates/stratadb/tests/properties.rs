//! Property-based tests for engine invariants.
//!
//! These verify that core guarantees hold regardless of the operation
//! sequence or input data.

use std::collections::BTreeMap;

use proptest::prelude::*;

use stratadb::{JournalType, PageId, Priority, Store, StoreConfig, Value};
use stratadb_storage::backends::RedbEngine;

/// A store with a frozen clock: commit ids depend only on content.
fn fixed_clock_store() -> Store<RedbEngine> {
    let engine = RedbEngine::in_memory().expect("failed to create backend");
    Store::with_config(engine, StoreConfig::new().with_clock(|| 1_000))
}

/// One staged operation against a small key space.
#[derive(Debug, Clone)]
enum Op {
    Put(u8, Vec<u8>),
    Delete(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..16, proptest::collection::vec(any::<u8>(), 0..48)).prop_map(|(k, v)| Op::Put(k, v)),
        (0u8..16).prop_map(Op::Delete),
    ]
}

fn key_bytes(k: u8) -> Vec<u8> {
    format!("key/{k:02}").into_bytes()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// After a commit, every key reads back as the last value written to it
    /// in the journal, and deleted keys are gone.
    #[test]
    fn committed_state_matches_last_writes(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let store = fixed_clock_store();
        let page = store.open_page(&PageId::from("prop")).unwrap();

        let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
        for op in &ops {
            match op {
                Op::Put(k, v) => {
                    tx.put(key_bytes(*k), v, Priority::Eager).unwrap();
                    model.insert(key_bytes(*k), v.clone());
                }
                Op::Delete(k) => {
                    tx.delete(key_bytes(*k)).unwrap();
                    model.remove(&key_bytes(*k));
                }
            }
        }
        tx.commit().unwrap();

        let snapshot = page.get_snapshot().unwrap();
        for k in 0u8..16 {
            let key = key_bytes(k);
            match model.get(&key) {
                Some(expected) => {
                    prop_assert_eq!(snapshot.get(&key).unwrap(), Value::Inline(expected.clone()));
                }
                None => prop_assert!(snapshot.get(&key).is_err()),
            }
        }
    }

    /// Committing permutations of non-conflicting writes yields the same
    /// commit id.
    #[test]
    fn commit_ids_are_permutation_independent(
        values in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..32), 2..12),
        seed in any::<u64>(),
    ) {
        let commit_in_order = |order: Vec<usize>, values: &[Vec<u8>]| {
            let store = fixed_clock_store();
            let page = store.open_page(&PageId::from("perm")).unwrap();
            let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
            for i in order {
                tx.put(key_bytes(i as u8), &values[i], Priority::Eager).unwrap();
            }
            tx.commit().unwrap().id
        };

        let forward: Vec<usize> = (0..values.len()).collect();
        // A deterministic shuffle derived from the seed.
        let mut shuffled = forward.clone();
        let mut state = seed | 1;
        for i in (1..shuffled.len()).rev() {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            shuffled.swap(i, (state >> 33) as usize % (i + 1));
        }

        prop_assert_eq!(commit_in_order(forward, &values), commit_in_order(shuffled, &values));
    }

    /// get_keys returns exactly the matching keys, strictly ascending.
    #[test]
    fn get_keys_is_sorted_and_complete(
        keys in proptest::collection::btree_set(proptest::collection::vec(any::<u8>(), 1..12), 1..40),
        prefix in proptest::collection::vec(any::<u8>(), 0..3),
    ) {
        let store = fixed_clock_store();
        let page = store.open_page(&PageId::from("keys")).unwrap();

        let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
        for key in &keys {
            tx.put(key, b"v", Priority::Eager).unwrap();
        }
        tx.commit().unwrap();

        let snapshot = page.get_snapshot().unwrap();
        let mut listed = Vec::new();
        let mut token: Option<Vec<u8>> = None;
        loop {
            let (page_keys, next) = snapshot.get_keys(&prefix, token.as_deref()).unwrap();
            listed.extend(page_keys);
            match next {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        let expected: Vec<Vec<u8>> =
            keys.iter().filter(|k| k.starts_with(&prefix)).cloned().collect();
        prop_assert_eq!(&listed, &expected);
        prop_assert!(listed.windows(2).all(|w| w[0] < w[1]));
    }

    /// A value streamed through create_reference reads back byte-identical.
    #[test]
    fn reference_round_trip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let store = fixed_clock_store();
        let page = store.open_page(&PageId::from("refs")).unwrap();

        let reference = page.create_reference(data.len() as i64, &mut data.as_slice()).unwrap();
        let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
        tx.put_reference(b"blob", reference, Priority::Lazy).unwrap();
        tx.commit().unwrap();

        let snapshot = page.get_snapshot().unwrap();
        prop_assert_eq!(snapshot.get_partial(b"blob", 0, -1).unwrap(), data);
    }

    /// Re-committing the current state is a no-op that lands no new commit.
    #[test]
    fn noop_commits_preserve_the_head(
        entries in proptest::collection::btree_map(
            proptest::collection::vec(any::<u8>(), 1..8),
            proptest::collection::vec(any::<u8>(), 0..16),
            1..10,
        ),
    ) {
        let store = fixed_clock_store();
        let page = store.open_page(&PageId::from("noop")).unwrap();

        let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
        for (key, value) in &entries {
            tx.put(key, value, Priority::Eager).unwrap();
        }
        let first = tx.commit().unwrap();

        let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
        for (key, value) in &entries {
            tx.put(key, value, Priority::Eager).unwrap();
        }
        let second = tx.commit().unwrap();

        prop_assert_eq!(first.id, second.id);
        prop_assert_eq!(page.heads().unwrap(), vec![first.id]);
    }
}
