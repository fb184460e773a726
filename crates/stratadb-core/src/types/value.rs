//! Values returned by snapshot reads.

use serde::{Deserialize, Serialize};

use super::ObjectId;

/// Values up to this many bytes are returned inline; larger values are
/// returned as references to their backing object.
pub const INLINE_VALUE_THRESHOLD: usize = 65_536;

/// A value read from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// The value bytes, inlined.
    Inline(Vec<u8>),
    /// A reference to the object holding a large value.
    Reference {
        /// The id of the backing object.
        id: ObjectId,
        /// The total size of the value in bytes.
        size: u64,
    },
}

impl Value {
    /// The total size of the value in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        match self {
            Self::Inline(bytes) => bytes.len() as u64,
            Self::Reference { size, .. } => *size,
        }
    }

    /// The inline bytes, if this value is inlined.
    #[must_use]
    pub fn as_inline(&self) -> Option<&[u8]> {
        match self {
            Self::Inline(bytes) => Some(bytes),
            Self::Reference { .. } => None,
        }
    }
}

/// Synchronization status of an object with respect to remote peers.
///
/// The engine marks every object produced by a local commit `Unsynced`; the
/// synchronization layer flips it to `Synced` once the object has been
/// uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    /// The object exists locally but has not been shipped to peers.
    Unsynced,
    /// The object is known to remote peers.
    Synced,
}

impl SyncStatus {
    /// Encode the status as a single byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Unsynced => 0,
            Self::Synced => 1,
        }
    }

    /// Decode a status from its byte encoding.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Unsynced),
            1 => Some(Self::Synced),
            _ => None,
        }
    }
}
