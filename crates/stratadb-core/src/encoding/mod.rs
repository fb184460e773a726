//! Persistent binary encodings.
//!
//! Everything `StrataDB` stores durably goes through this module: the key
//! namespaces that partition a page's keyspace, the node and commit formats
//! that content addressing hashes over, and the journal's staged-value
//! format. All encodings are deterministic and big-endian so byte equality
//! tracks logical equality.

pub mod commit;
pub mod journal;
pub mod keys;
pub mod node;


use crate::error::CoreError;

/// Encode a `u64` as big-endian bytes.
#[must_use]
pub fn encode_u64(value: u64) -> [u8; 8] {
    value.to_be_bytes()
}

/// Decode a big-endian `u64`.
///
/// # Errors
///
/// Returns [`CoreError::Encoding`] if the slice is not exactly 8 bytes.
pub fn decode_u64(bytes: &[u8]) -> Result<u64, CoreError> {
    let bytes: [u8; 8] = bytes
        .try_into()
        .map_err(|_| CoreError::Encoding(format!("expected 8 bytes, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Encode an `i64` as big-endian bytes.
#[must_use]
pub fn encode_i64(value: i64) -> [u8; 8] {
    value.to_be_bytes()
}

/// Decode a big-endian `i64`.
///
/// # Errors
///
/// Returns [`CoreError::Encoding`] if the slice is not exactly 8 bytes.
pub fn decode_i64(bytes: &[u8]) -> Result<i64, CoreError> {
    let bytes: [u8; 8] = bytes
        .try_into()
        .map_err(|_| CoreError::Encoding(format!("expected 8 bytes, got {}", bytes.len())))?;
    Ok(i64::from_be_bytes(bytes))
}
