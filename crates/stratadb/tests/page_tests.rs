//! Page-level integration tests: snapshots, partial reads, prefix
//! iteration, large values, and journal lifecycle.

use stratadb::{
    Error, JournalType, PageId, Priority, Status, Store, StoreConfig, Value,
};
use stratadb_storage::backends::RedbEngine;

fn test_store() -> Store<RedbEngine> {
    let engine = RedbEngine::in_memory().expect("failed to create backend");
    // A deterministic clock keeps commit ids reproducible across runs.
    let counter = std::sync::atomic::AtomicU64::new(1);
    let config = StoreConfig::new()
        .with_clock(move || counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed));
    Store::with_config(engine, config)
}

#[test]
fn simple_put_and_get() {
    let store = test_store();
    let page = store.open_page(&PageId::from("test")).unwrap();

    let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
    tx.put(b"name", b"Alice", Priority::Eager).unwrap();
    tx.commit().unwrap();

    let snapshot = page.get_snapshot().unwrap();
    assert_eq!(snapshot.get(b"name").unwrap(), Value::Inline(b"Alice".to_vec()));

    let err = snapshot.get(b"favorite book").unwrap_err();
    assert_eq!(err.status(), Status::KeyNotFound);
}

#[test]
fn get_partial_edge_cases() {
    let store = test_store();
    let page = store.open_page(&PageId::from("test")).unwrap();

    let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
    tx.put(b"name", b"Alice", Priority::Eager).unwrap();
    tx.commit().unwrap();

    let snapshot = page.get_snapshot().unwrap();
    let partial = |offset, max_size| snapshot.get_partial(b"name", offset, max_size).unwrap();

    assert_eq!(partial(0, -1), b"Alice");
    assert_eq!(partial(4, -1), b"e");
    assert_eq!(partial(5, -1), b"");
    assert_eq!(partial(6, -1), b"");
    assert_eq!(partial(2, 1), b"i");
    assert_eq!(partial(2, 0), b"");

    // Negative offsets count from the end.
    assert_eq!(partial(-5, -1), b"Alice");
    assert_eq!(partial(-1, -1), b"e");
    assert_eq!(partial(-5, 0), b"");
    assert_eq!(partial(-3, 1), b"i");

    let err = snapshot.get_partial(b"favorite book", 0, -1).unwrap_err();
    assert_eq!(err.status(), Status::KeyNotFound);
}

#[test]
fn prefix_iteration() {
    let store = test_store();
    let page = store.open_page(&PageId::from("test")).unwrap();

    // No entries yet.
    let snapshot = page.get_snapshot().unwrap();
    let (keys, token) = snapshot.get_keys(b"", None).unwrap();
    assert!(keys.is_empty());
    assert!(token.is_none());

    let inserted: Vec<Vec<u8>> = vec![
        b"\x00\x00A".to_vec(),
        b"\x00\x00B".to_vec(),
        b"\x00\x01A".to_vec(),
        b"\x00\x01B".to_vec(),
    ];
    let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
    for key in &inserted {
        tx.put(key, b"value", Priority::Eager).unwrap();
    }
    tx.commit().unwrap();

    let snapshot = page.get_snapshot().unwrap();
    let keys_for = |prefix: &[u8]| snapshot.get_keys(prefix, None).unwrap().0;

    assert_eq!(keys_for(b""), inserted);
    assert_eq!(keys_for(b"\x00"), inserted);
    assert_eq!(keys_for(b"\x00\x00"), &inserted[..2]);
    assert_eq!(keys_for(b"\x00\x01A"), vec![inserted[2].clone()]);
    assert!(keys_for(b"\x05").is_empty());
}

#[test]
fn prefix_iteration_with_continuation() {
    let store = test_store();
    let page = store.open_page(&PageId::from("test")).unwrap();

    let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
    for i in 0u32..300 {
        tx.put(format!("k/{i:04}").as_bytes(), b"v", Priority::Eager).unwrap();
    }
    tx.commit().unwrap();

    let snapshot = page.get_snapshot().unwrap();
    let mut collected = Vec::new();
    let mut token: Option<Vec<u8>> = None;
    loop {
        let (keys, next) = snapshot.get_keys(b"k/", token.as_deref()).unwrap();
        collected.extend(keys);
        match next {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    assert_eq!(collected.len(), 300);
    assert!(collected.windows(2).all(|w| w[0] < w[1]), "keys must ascend");
}

#[test]
fn large_value_by_reference() {
    let store = test_store();
    let page = store.open_page(&PageId::from("test")).unwrap();
    let data = vec![b'a'; 1_000_000];

    // Advertised size must match the stream.
    let err = page.create_reference(123, &mut data.as_slice()).unwrap_err();
    assert_eq!(err.status(), Status::IoError);
    assert!(matches!(err, Error::StreamSizeMismatch { advertised: 123, .. }));

    let reference = page.create_reference(data.len() as i64, &mut data.as_slice()).unwrap();
    // Negative size means "unknown" and accepts any length.
    let reference2 = page.create_reference(-1, &mut data.as_slice()).unwrap();
    assert_eq!(reference, reference2);

    let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
    tx.put_reference(b"big", reference, Priority::Lazy).unwrap();
    tx.commit().unwrap();

    let snapshot = page.get_snapshot().unwrap();
    match snapshot.get(b"big").unwrap() {
        Value::Reference { id, size } => {
            assert_eq!(id, reference);
            assert_eq!(size, data.len() as u64);
        }
        Value::Inline(_) => panic!("megabyte value must come back as a reference"),
    }
    // Partial reads stream out of the referenced blob.
    assert_eq!(snapshot.get_partial(b"big", -3, -1).unwrap(), b"aaa");
}

#[test]
fn empty_transaction_is_a_noop() {
    let store = test_store();
    let page = store.open_page(&PageId::from("test")).unwrap();

    let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
    tx.put(b"k", b"v", Priority::Eager).unwrap();
    let base = tx.commit().unwrap();

    // No ops at all.
    let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
    let commit = tx.commit().unwrap();
    assert_eq!(commit.id, base.id);
    assert_eq!(page.heads().unwrap(), vec![base.id]);

    // Ops that net to no change.
    let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
    tx.put(b"k", b"v", Priority::Eager).unwrap();
    tx.delete(b"absent").unwrap();
    let commit = tx.commit().unwrap();
    assert_eq!(commit.id, base.id);
    assert_eq!(page.heads().unwrap(), vec![base.id]);
}

#[test]
fn last_write_in_journal_wins() {
    let store = test_store();
    let page = store.open_page(&PageId::from("test")).unwrap();

    let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
    tx.put(b"k", b"first", Priority::Eager).unwrap();
    tx.put(b"k", b"second", Priority::Eager).unwrap();
    tx.delete(b"gone").unwrap();
    tx.put(b"gone", b"back", Priority::Eager).unwrap();
    tx.commit().unwrap();

    let snapshot = page.get_snapshot().unwrap();
    assert_eq!(snapshot.get(b"k").unwrap(), Value::Inline(b"second".to_vec()));
    assert_eq!(snapshot.get(b"gone").unwrap(), Value::Inline(b"back".to_vec()));
}

#[test]
fn rollback_discards_staged_state() {
    let store = test_store();
    let page = store.open_page(&PageId::from("test")).unwrap();

    let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
    tx.put(b"k", b"v", Priority::Eager).unwrap();
    tx.rollback().unwrap();

    let snapshot = page.get_snapshot().unwrap();
    assert_eq!(snapshot.get(b"k").unwrap_err().status(), Status::KeyNotFound);

    // A closed journal rejects further use.
    assert_eq!(tx.put(b"k", b"v", Priority::Eager).unwrap_err().status(), Status::IllegalState);
    assert_eq!(tx.commit().unwrap_err().status(), Status::IllegalState);
    assert_eq!(tx.rollback().unwrap_err().status(), Status::IllegalState);
}

#[test]
fn deletes_remove_committed_keys() {
    let store = test_store();
    let page = store.open_page(&PageId::from("test")).unwrap();

    let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
    tx.put(b"keep", b"1", Priority::Eager).unwrap();
    tx.put(b"drop", b"2", Priority::Eager).unwrap();
    tx.commit().unwrap();

    let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
    tx.delete(b"drop").unwrap();
    tx.commit().unwrap();

    let snapshot = page.get_snapshot().unwrap();
    assert!(snapshot.get(b"keep").is_ok());
    assert_eq!(snapshot.get(b"drop").unwrap_err().status(), Status::KeyNotFound);
}

#[test]
fn oversized_keys_are_rejected() {
    let store = test_store();
    let page = store.open_page(&PageId::from("test")).unwrap();

    let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
    let long_key = vec![b'k'; stratadb::MAX_KEY_SIZE + 1];
    let err = tx.put(&long_key, b"v", Priority::Eager).unwrap_err();
    assert_eq!(err.status(), Status::IoError);

    // An implicit journal survives the failed operation.
    tx.put(b"ok", b"v", Priority::Eager).unwrap();
    tx.commit().unwrap();
}

#[test]
fn snapshots_pin_history() {
    let store = test_store();
    let page = store.open_page(&PageId::from("test")).unwrap();

    let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
    tx.put(b"k", b"old", Priority::Eager).unwrap();
    tx.commit().unwrap();
    let old_snapshot = page.get_snapshot().unwrap();

    let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
    tx.put(b"k", b"new", Priority::Eager).unwrap();
    tx.commit().unwrap();

    // The old snapshot still reads its own commit.
    assert_eq!(old_snapshot.get(b"k").unwrap(), Value::Inline(b"old".to_vec()));
    let new_snapshot = page.get_snapshot().unwrap();
    assert_eq!(new_snapshot.get(b"k").unwrap(), Value::Inline(b"new".to_vec()));
    assert_ne!(old_snapshot.commit_id(), new_snapshot.commit_id());
}

#[test]
fn snapshot_at_historical_commit() {
    let store = test_store();
    let page = store.open_page(&PageId::from("test")).unwrap();

    let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
    tx.put(b"k", b"one", Priority::Eager).unwrap();
    let first = tx.commit().unwrap();

    let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
    tx.put(b"k", b"two", Priority::Eager).unwrap();
    tx.commit().unwrap();

    let snapshot = page.get_snapshot_at(&first.id).unwrap();
    assert_eq!(snapshot.get(b"k").unwrap(), Value::Inline(b"one".to_vec()));
}

#[test]
fn stale_journals_roll_back_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.redb");
    let page_id = PageId::from("test");

    {
        let store = Store::open(&path).unwrap();
        let page = store.open_page(&page_id).unwrap();
        let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
        tx.put(b"staged", b"never committed", Priority::Eager).unwrap();
        // Simulate a crash: the journal is neither committed nor rolled
        // back, and its staged state stays on disk.
        std::mem::forget(tx);
    }

    let store = Store::open(&path).unwrap();
    let page = store.open_page(&page_id).unwrap();
    let snapshot = page.get_snapshot().unwrap();
    assert_eq!(snapshot.get(b"staged").unwrap_err().status(), Status::KeyNotFound);

    // The page works normally after recovery.
    let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
    tx.put(b"fresh", b"v", Priority::Eager).unwrap();
    tx.commit().unwrap();
    assert!(page.get_snapshot().unwrap().get(b"fresh").is_ok());
}

#[test]
fn committed_data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.redb");
    let page_id = PageId::from("durable");

    {
        let store = Store::open(&path).unwrap();
        let page = store.open_page(&page_id).unwrap();
        let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
        tx.put(b"k", b"v", Priority::Eager).unwrap();
        tx.commit().unwrap();
    }

    let store = Store::open(&path).unwrap();
    let page = store.open_page(&page_id).unwrap();
    assert_eq!(
        page.get_snapshot().unwrap().get(b"k").unwrap(),
        Value::Inline(b"v".to_vec())
    );
}

#[test]
fn pages_are_isolated() {
    let store = test_store();
    let page_a = store.open_page(&PageId::from("a")).unwrap();
    let page_b = store.open_page(&PageId::from("b")).unwrap();

    let mut tx = page_a.start_transaction(JournalType::Implicit).unwrap();
    tx.put(b"k", b"from a", Priority::Eager).unwrap();
    tx.commit().unwrap();

    let snapshot = page_b.get_snapshot().unwrap();
    assert_eq!(snapshot.get(b"k").unwrap_err().status(), Status::KeyNotFound);
}

#[test]
fn interrupted_commit_leaves_journal_open() {
    let store = test_store();
    let page = store.open_page(&PageId::from("test")).unwrap();

    let mut tx = page.start_transaction(JournalType::Implicit).unwrap();
    tx.put(b"k", b"v", Priority::Eager).unwrap();

    let interrupt = tx.interrupt_handle();
    interrupt.interrupt();
    let err = tx.commit().unwrap_err();
    assert_eq!(err.status(), Status::Interrupted);

    // Nothing landed.
    let snapshot = page.get_snapshot().unwrap();
    assert_eq!(snapshot.get(b"k").unwrap_err().status(), Status::KeyNotFound);
}
