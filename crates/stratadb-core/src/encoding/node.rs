//! Binary encoding of B-tree nodes.
//!
//! A node's object id is the domain-tagged hash of this encoding, so the
//! format must be deterministic: entries appear in key order and all integers
//! are big-endian.
//!
//! Format: `[level u8][entry_count u32][entries…]` where each entry is
//! `[key_len u16][key][object_id 32][priority u8]`. In leaf nodes (level 0)
//! an entry binds a user key to a value object; in interior nodes an entry's
//! `object_id` names a child node and its `key` is the greatest user key in
//! that child's subtree.

use crate::error::CoreError;
use crate::hash;
use crate::types::{Entry, ObjectId, Priority};

/// In-memory form of a stored B-tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeData {
    /// Height of the node: 0 for leaves.
    pub level: u8,
    /// Ordered entries (leaf bindings or child references).
    pub entries: Vec<Entry>,
}

impl NodeData {
    /// Create an empty leaf node.
    #[must_use]
    pub fn empty_leaf() -> Self {
        Self { level: 0, entries: Vec::new() }
    }

    /// Returns `true` if this is a leaf node.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }

    /// The content-derived id of this node.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        hash::hash_node(&encode_node(self))
    }
}

/// The root id of an empty tree: the id of an empty leaf node.
#[must_use]
pub fn empty_root_id() -> ObjectId {
    NodeData::empty_leaf().id()
}

/// Serialize a node.
#[must_use]
pub fn encode_node(node: &NodeData) -> Vec<u8> {
    let payload: usize = node.entries.iter().map(|e| 2 + e.key.len() + 33).sum();
    let mut out = Vec::with_capacity(5 + payload);
    out.push(node.level);
    out.extend_from_slice(&(node.entries.len() as u32).to_be_bytes());
    for entry in &node.entries {
        debug_assert!(entry.key.len() <= u16::MAX as usize);
        out.extend_from_slice(&(entry.key.len() as u16).to_be_bytes());
        out.extend_from_slice(&entry.key);
        out.extend_from_slice(entry.object_id.as_bytes());
        out.push(entry.priority.as_byte());
    }
    out
}

/// Deserialize a node.
///
/// # Errors
///
/// Returns [`CoreError::Encoding`] if the bytes are truncated or malformed.
pub fn decode_node(bytes: &[u8]) -> Result<NodeData, CoreError> {
    let mut reader = Reader::new(bytes);
    let level = reader.read_u8()?;
    let count = reader.read_u32()? as usize;

    let mut entries = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let key_len = reader.read_u16()? as usize;
        let key = reader.read_bytes(key_len)?.to_vec();
        let object_id = ObjectId::from_slice(reader.read_bytes(ObjectId::LEN)?)
            .ok_or_else(|| CoreError::Encoding("bad object id".into()))?;
        let priority = Priority::from_byte(reader.read_u8()?)
            .ok_or_else(|| CoreError::Encoding("bad priority byte".into()))?;
        entries.push(Entry { key, object_id, priority });
    }
    if !reader.is_empty() {
        return Err(CoreError::Encoding("trailing bytes after node".into()));
    }
    Ok(NodeData { level, entries })
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CoreError> {
        if self.bytes.len() < len {
            return Err(CoreError::Encoding(format!(
                "truncated node: wanted {len} bytes, have {}",
                self.bytes.len()
            )));
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn read_u8(&mut self) -> Result<u8, CoreError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, CoreError> {
        let bytes: [u8; 2] = self.read_bytes(2)?.try_into().unwrap();
        Ok(u16::from_be_bytes(bytes))
    }

    fn read_u32(&mut self) -> Result<u32, CoreError> {
        let bytes: [u8; 4] = self.read_bytes(4)?.try_into().unwrap();
        Ok(u32::from_be_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(byte: u8) -> ObjectId {
        ObjectId::from_bytes([byte; 32])
    }

    #[test]
    fn empty_leaf_roundtrip() {
        let node = NodeData::empty_leaf();
        let decoded = decode_node(&encode_node(&node)).unwrap();
        assert_eq!(decoded, node);
        assert!(decoded.is_leaf());
    }

    #[test]
    fn node_roundtrip() {
        let node = NodeData {
            level: 2,
            entries: vec![
                Entry::new(b"alpha".to_vec(), oid(1), Priority::Eager),
                Entry::new(b"beta".to_vec(), oid(2), Priority::Lazy),
            ],
        };
        assert_eq!(decode_node(&encode_node(&node)).unwrap(), node);
    }

    #[test]
    fn id_tracks_content() {
        let a = NodeData {
            level: 0,
            entries: vec![Entry::new(b"k".to_vec(), oid(1), Priority::Eager)],
        };
        let mut b = a.clone();
        assert_eq!(a.id(), b.id());
        b.entries[0].priority = Priority::Lazy;
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn empty_root_id_is_stable() {
        assert_eq!(empty_root_id(), empty_root_id());
        assert!(!empty_root_id().is_zero());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_node(&[]).is_err());
        assert!(decode_node(&[0, 0, 0, 0, 5]).is_err());
        // Trailing bytes after a valid empty leaf.
        let mut bytes = encode_node(&NodeData::empty_leaf());
        bytes.push(0xff);
        assert!(decode_node(&bytes).is_err());
    }
}
