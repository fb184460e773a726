//! Key-namespace encoding for a page's backend keyspace.
//!
//! All of a page's durable state lives in one logical backend table,
//! partitioned by short prefixes:
//!
//! - `O/` - object blobs: `O/<object_id>`
//! - `R/` - reference counts: `R/<object_id>`
//! - `U/` - untracked-object flags: `U/<object_id>`
//! - `H/` - head set: `H/<commit_id>`
//! - `C/` - commit records: `C/<commit_id>`
//! - `J/` - journal state: `J/<journal_id>/E/<key>` staged entries and
//!   `J/<journal_id>/V/<object_id>` per-object counters
//! - `S/` - sync status: `S/<object_id>`
//! - `M/` - page metadata (journal-id counter)
//!
//! Journal ids are big-endian `u64`s, so `J/` prefix scans enumerate
//! journals in creation order and staged entries sort by user key within a
//! journal.

use crate::types::{CommitId, ObjectId};

/// Prefix for object blobs.
pub const PREFIX_OBJECT: &[u8] = b"O/";
/// Prefix for reference counts.
pub const PREFIX_REFCOUNT: &[u8] = b"R/";
/// Prefix for untracked-object flags.
pub const PREFIX_UNTRACKED: &[u8] = b"U/";
/// Prefix for the head set.
pub const PREFIX_HEAD: &[u8] = b"H/";
/// Prefix for commit records.
pub const PREFIX_COMMIT: &[u8] = b"C/";
/// Prefix for journal state.
pub const PREFIX_JOURNAL: &[u8] = b"J/";
/// Prefix for sync status.
pub const PREFIX_SYNC: &[u8] = b"S/";

/// Key of the journal-id counter in the metadata namespace.
pub const KEY_NEXT_JOURNAL_ID: &[u8] = b"M/next_journal_id";

/// Identifier of a journal within its page.
pub type JournalId = u64;

fn concat(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + suffix.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(suffix);
    key
}

/// Encode the key of an object blob.
#[must_use]
pub fn object_key(id: &ObjectId) -> Vec<u8> {
    concat(PREFIX_OBJECT, id.as_bytes())
}

/// Encode the key of an object's reference count.
#[must_use]
pub fn refcount_key(id: &ObjectId) -> Vec<u8> {
    concat(PREFIX_REFCOUNT, id.as_bytes())
}

/// Encode the key of an object's untracked flag.
#[must_use]
pub fn untracked_key(id: &ObjectId) -> Vec<u8> {
    concat(PREFIX_UNTRACKED, id.as_bytes())
}

/// Encode the key of an object's sync status.
#[must_use]
pub fn sync_status_key(id: &ObjectId) -> Vec<u8> {
    concat(PREFIX_SYNC, id.as_bytes())
}

/// Encode the key marking a commit as a head.
#[must_use]
pub fn head_key(id: &CommitId) -> Vec<u8> {
    concat(PREFIX_HEAD, id.as_bytes())
}

/// Encode the key of a commit record.
#[must_use]
pub fn commit_key(id: &CommitId) -> Vec<u8> {
    concat(PREFIX_COMMIT, id.as_bytes())
}

/// Decode the object id suffix of a key in an object-addressed namespace.
///
/// Returns `None` if the key does not start with `prefix` or the suffix is
/// not a well-formed object id.
#[must_use]
pub fn decode_object_id(prefix: &[u8], key: &[u8]) -> Option<ObjectId> {
    let suffix = key.strip_prefix(prefix)?;
    ObjectId::from_slice(suffix)
}

/// Decode the commit id suffix of a key in a commit-addressed namespace.
#[must_use]
pub fn decode_commit_id(prefix: &[u8], key: &[u8]) -> Option<CommitId> {
    decode_object_id(prefix, key).map(CommitId::from_object_id)
}

/// Encode the prefix of all state belonging to one journal.
#[must_use]
pub fn journal_prefix(journal_id: JournalId) -> Vec<u8> {
    let mut key = Vec::with_capacity(PREFIX_JOURNAL.len() + 9);
    key.extend_from_slice(PREFIX_JOURNAL);
    key.extend_from_slice(&journal_id.to_be_bytes());
    key.push(b'/');
    key
}

/// Encode the prefix of a journal's staged entries.
#[must_use]
pub fn journal_entry_prefix(journal_id: JournalId) -> Vec<u8> {
    let mut key = journal_prefix(journal_id);
    key.extend_from_slice(b"E/");
    key
}

/// Encode the key of one staged journal entry.
#[must_use]
pub fn journal_entry_key(journal_id: JournalId, user_key: &[u8]) -> Vec<u8> {
    let mut key = journal_entry_prefix(journal_id);
    key.extend_from_slice(user_key);
    key
}

/// Decode the user key out of a staged journal entry key.
#[must_use]
pub fn decode_journal_entry_key(journal_id: JournalId, key: &[u8]) -> Option<Vec<u8>> {
    key.strip_prefix(journal_entry_prefix(journal_id).as_slice()).map(<[u8]>::to_vec)
}

/// Encode the prefix of a journal's per-object value counters.
#[must_use]
pub fn journal_counter_prefix(journal_id: JournalId) -> Vec<u8> {
    let mut key = journal_prefix(journal_id);
    key.extend_from_slice(b"V/");
    key
}

/// Encode the key of a journal's counter for one object.
#[must_use]
pub fn journal_counter_key(journal_id: JournalId, id: &ObjectId) -> Vec<u8> {
    let mut key = journal_counter_prefix(journal_id);
    key.extend_from_slice(id.as_bytes());
    key
}

/// Decode the object id out of a journal counter key.
#[must_use]
pub fn decode_journal_counter_key(journal_id: JournalId, key: &[u8]) -> Option<ObjectId> {
    decode_object_id(journal_counter_prefix(journal_id).as_slice(), key)
}

/// Decode the journal id out of any key under the `J/` namespace.
#[must_use]
pub fn decode_journal_id(key: &[u8]) -> Option<JournalId> {
    let suffix = key.strip_prefix(PREFIX_JOURNAL)?;
    let bytes: [u8; 8] = suffix.get(..8)?.try_into().ok()?;
    Some(JournalId::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(byte: u8) -> ObjectId {
        ObjectId::from_bytes([byte; 32])
    }

    #[test]
    fn object_key_roundtrip() {
        let id = oid(3);
        let key = object_key(&id);
        assert_eq!(decode_object_id(PREFIX_OBJECT, &key), Some(id));
        assert_eq!(decode_object_id(PREFIX_REFCOUNT, &key), None);
    }

    #[test]
    fn commit_key_roundtrip() {
        let id = CommitId::from_object_id(oid(5));
        assert_eq!(decode_commit_id(PREFIX_COMMIT, &commit_key(&id)), Some(id));
        assert_eq!(decode_commit_id(PREFIX_HEAD, &head_key(&id)), Some(id));
    }

    #[test]
    fn journal_entry_key_roundtrip() {
        let key = journal_entry_key(7, b"user-key");
        assert_eq!(decode_journal_entry_key(7, &key), Some(b"user-key".to_vec()));
        assert_eq!(decode_journal_entry_key(8, &key), None);
        assert_eq!(decode_journal_id(&key), Some(7));
    }

    #[test]
    fn journal_counter_key_roundtrip() {
        let id = oid(9);
        let key = journal_counter_key(2, &id);
        assert_eq!(decode_journal_counter_key(2, &key), Some(id));
        assert_eq!(decode_journal_id(&key), Some(2));
    }

    #[test]
    fn journal_keys_sort_by_id_then_kind() {
        // Entries of journal 1 sort before any state of journal 2.
        let e1 = journal_entry_key(1, b"zzz");
        let v2 = journal_counter_key(2, &oid(0));
        assert!(e1 < v2);
    }

    #[test]
    fn namespaces_are_disjoint() {
        let id = oid(1);
        let keys =
            [object_key(&id), refcount_key(&id), untracked_key(&id), sync_status_key(&id)];
        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
