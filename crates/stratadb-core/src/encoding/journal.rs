//! Binary encoding of staged journal entries.
//!
//! A journal stages either a value binding or a tombstone per key. The value
//! under `J/<jid>/E/<key>` is `[0x00]` for a tombstone or
//! `[0x01][object_id 32][priority u8]` for a binding.

use crate::error::CoreError;
use crate::types::{ObjectId, Priority};

const TAG_TOMBSTONE: u8 = 0x00;
const TAG_VALUE: u8 = 0x01;

/// A value staged in a journal for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedValue {
    /// The key is deleted by this journal.
    Tombstone,
    /// The key is bound to an object by this journal.
    Value {
        /// The id of the object holding the value.
        object_id: ObjectId,
        /// Fetch priority of the value.
        priority: Priority,
    },
}

impl StagedValue {
    /// The staged object id, if this is a binding.
    #[must_use]
    pub const fn object_id(&self) -> Option<&ObjectId> {
        match self {
            Self::Tombstone => None,
            Self::Value { object_id, .. } => Some(object_id),
        }
    }
}

/// Serialize a staged value.
#[must_use]
pub fn encode_staged_value(value: &StagedValue) -> Vec<u8> {
    match value {
        StagedValue::Tombstone => vec![TAG_TOMBSTONE],
        StagedValue::Value { object_id, priority } => {
            let mut out = Vec::with_capacity(34);
            out.push(TAG_VALUE);
            out.extend_from_slice(object_id.as_bytes());
            out.push(priority.as_byte());
            out
        }
    }
}

/// Deserialize a staged value.
///
/// # Errors
///
/// Returns [`CoreError::Encoding`] if the bytes are malformed.
pub fn decode_staged_value(bytes: &[u8]) -> Result<StagedValue, CoreError> {
    match bytes {
        [TAG_TOMBSTONE] => Ok(StagedValue::Tombstone),
        [TAG_VALUE, rest @ ..] if rest.len() == ObjectId::LEN + 1 => {
            let object_id = ObjectId::from_slice(&rest[..ObjectId::LEN])
                .ok_or_else(|| CoreError::Encoding("bad staged object id".into()))?;
            let priority = Priority::from_byte(rest[ObjectId::LEN])
                .ok_or_else(|| CoreError::Encoding("bad staged priority".into()))?;
            Ok(StagedValue::Value { object_id, priority })
        }
        _ => Err(CoreError::Encoding("malformed staged value".into())),
    }
}
