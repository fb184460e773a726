//! Domain-separated content hashing.
//!
//! Every persistent object in `StrataDB` is addressed by the blake3 hash of
//! its serialized content. Each object kind hashes under its own domain tag,
//! so a value blob, a tree node, and a commit record with identical bytes can
//! never collide.

use crate::types::ObjectId;

/// Domain tag for value blobs.
pub const DOMAIN_VALUE: &str = "strata-value-v1";
/// Domain tag for B-tree nodes.
pub const DOMAIN_NODE: &str = "strata-node-v1";
/// Domain tag for commit records.
pub const DOMAIN_COMMIT: &str = "strata-commit-v1";
/// Domain tag for node-boundary decisions in the B-tree builder.
pub const DOMAIN_BOUNDARY: &str = "strata-boundary-v1";

/// Hash raw bytes under the given domain tag.
#[must_use]
pub fn hash_with_domain(domain: &str, data: &[u8]) -> ObjectId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain.as_bytes());
    hasher.update(b":");
    hasher.update(data);
    ObjectId::from_bytes(*hasher.finalize().as_bytes())
}

/// Hash a value blob.
#[must_use]
pub fn hash_value(data: &[u8]) -> ObjectId {
    hash_with_domain(DOMAIN_VALUE, data)
}

/// Hash a serialized B-tree node.
#[must_use]
pub fn hash_node(data: &[u8]) -> ObjectId {
    hash_with_domain(DOMAIN_NODE, data)
}

/// Hash a serialized commit record.
#[must_use]
pub fn hash_commit(data: &[u8]) -> ObjectId {
    hash_with_domain(DOMAIN_COMMIT, data)
}

/// Derive the deterministic chunking weight of a key or child id.
///
/// The B-tree builder terminates a node when the low bits of this value hit
/// the boundary pattern, which makes node boundaries a pure function of
/// content. The weight is the first eight bytes of the domain-tagged hash.
#[must_use]
pub fn boundary_weight(data: &[u8]) -> u64 {
    let id = hash_with_domain(DOMAIN_BOUNDARY, data);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&id.as_bytes()[..8]);
    u64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic() {
        assert_eq!(hash_value(b"hello"), hash_value(b"hello"));
        assert_eq!(hash_node(b"hello"), hash_node(b"hello"));
    }

    #[test]
    fn domains_are_separated() {
        let data = b"same content";
        assert_ne!(hash_value(data), hash_node(data));
        assert_ne!(hash_node(data), hash_commit(data));
        assert_ne!(hash_value(data), hash_commit(data));
    }

    #[test]
    fn boundary_weight_is_stable() {
        assert_eq!(boundary_weight(b"key"), boundary_weight(b"key"));
        assert_ne!(boundary_weight(b"key"), boundary_weight("другое".as_bytes()));
    }
}
