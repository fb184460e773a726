//! Identifiers for stored objects and pages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Content-addressed identifier of a stored blob.
///
/// An `ObjectId` is the domain-separated blake3 hash of an object's
/// serialized content: equal ids imply equal bytes, and an object, once
/// written, is immutable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    /// The number of bytes in an object id.
    pub const LEN: usize = 32;

    /// The all-zero id, used as a sentinel that never addresses real content.
    pub const ZERO: Self = Self([0; 32]);

    /// Create an `ObjectId` from raw hash bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse an `ObjectId` from a byte slice.
    ///
    /// Returns `None` if the slice is not exactly [`ObjectId::LEN`] bytes.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Get the raw hash bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns `true` if this is the all-zero sentinel.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 32]
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight hex characters are enough to tell ids apart in logs.
        write!(f, "ObjectId(")?;
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "…)")
    }
}

/// Client-chosen identifier of a page.
///
/// Pages are independent key-value maps with their own commit graphs; the
/// page id namespaces all of a page's state in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(Vec<u8>);

impl PageId {
    /// The maximum length of a page id in bytes.
    pub const MAX_LEN: usize = 64;

    /// Create a `PageId` from raw bytes, truncated to [`PageId::MAX_LEN`].
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        let mut bytes = bytes.into();
        bytes.truncate(Self::MAX_LEN);
        Self(bytes)
    }

    /// Get the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex encoding of the id, used as the page's logical table name.
    #[must_use]
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.0.len() * 2);
        for byte in &self.0 {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

impl From<&str> for PageId {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes().to_vec())
    }
}
