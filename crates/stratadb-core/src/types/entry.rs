//! Tree entries and staged changes.

use serde::{Deserialize, Serialize};

use super::ObjectId;

/// The maximum length of a user key in bytes.
pub const MAX_KEY_SIZE: usize = 256;

/// Fetch priority of a value.
///
/// `Eager` content must be resident to satisfy reads; `Lazy` content may be
/// fetched on demand by the synchronization layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// The value must be fetched before the entry is readable.
    Eager,
    /// The value may be fetched on demand.
    Lazy,
}

impl Priority {
    /// Encode the priority as a single byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Eager => 0,
            Self::Lazy => 1,
        }
    }

    /// Decode a priority from its byte encoding.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Eager),
            1 => Some(Self::Lazy),
            _ => None,
        }
    }
}

/// A single key-to-object binding inside a B-tree node.
///
/// Entries are ordered by lexicographic comparison of their keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// The user key.
    pub key: Vec<u8>,
    /// The id of the object holding the value.
    pub object_id: ObjectId,
    /// Fetch priority of the value.
    pub priority: Priority,
}

impl Entry {
    /// Create a new entry.
    #[must_use]
    pub fn new(key: impl Into<Vec<u8>>, object_id: ObjectId, priority: Priority) -> Self {
        Self { key: key.into(), object_id, priority }
    }
}

/// One element of the change stream consumed by the B-tree builder.
///
/// Streams of changes must be strictly ascending by key with no duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryChange {
    /// Insert a new binding or update an existing one.
    Insert(Entry),
    /// Remove the binding for a key.
    Delete(Vec<u8>),
}

impl EntryChange {
    /// The key this change applies to.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Insert(entry) => &entry.key,
            Self::Delete(key) => key,
        }
    }
}
