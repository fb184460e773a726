//! Redb table definitions and key encoding utilities.
//!
//! Redb requires static table names, so logical tables (one per page) are
//! multiplexed into a single physical table by prefixing each key with its
//! logical table name and a separator byte. Table names never contain the
//! separator, so the encoding is unambiguous and preserves per-table key
//! order.

use redb::TableDefinition;

/// The physical table that stores all key-value pairs.
pub const DATA_TABLE: TableDefinition<'static, &[u8], &[u8]> = TableDefinition::new("strata_data");

/// Separator byte between table name and key in the encoded key.
pub const KEY_SEPARATOR: u8 = 0x00;

/// Encode a logical table name and key into a physical key.
///
/// The format is: `<table_name><separator><key>`.
pub fn encode_key(table: &str, key: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(table.len() + 1 + key.len());
    encoded.extend_from_slice(table.as_bytes());
    encoded.push(KEY_SEPARATOR);
    encoded.extend_from_slice(key);
    encoded
}

/// Decode a physical key into its logical table name and original key.
///
/// Returns `None` if the key is malformed (missing separator).
pub fn decode_key(encoded: &[u8]) -> Option<(&str, &[u8])> {
    let sep_pos = encoded.iter().position(|&b| b == KEY_SEPARATOR)?;
    let table = std::str::from_utf8(&encoded[..sep_pos]).ok()?;
    let key = &encoded[sep_pos + 1..];
    Some((table, key))
}

/// Create the end key for range scans over a whole logical table.
/// This is the first physical key that would NOT belong to the table.
pub fn table_end_key(table: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(table.len() + 1);
    key.extend_from_slice(table.as_bytes());
    key.push(KEY_SEPARATOR + 1);
    key
}

/// Create the exclusive end key for range scans over a key prefix within a
/// logical table.
///
/// This is the byte successor of `encode_key(table, prefix)`; when the
/// encoded prefix is all `0xFF` (unreachable in practice since table names
/// are ASCII) the scan falls back to the table end.
pub fn prefix_end_key(table: &str, prefix: &[u8]) -> Vec<u8> {
    let mut end = encode_key(table, prefix);
    while let Some(&last) = end.last() {
        if last < 0xFF {
            *end.last_mut().unwrap() = last + 1;
            return end;
        }
        end.pop();
    }
    table_end_key(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_key() {
        let encoded = encode_key("pages", b"page:123");
        let (table, key) = decode_key(&encoded).unwrap();
        assert_eq!(table, "pages");
        assert_eq!(key, b"page:123");
    }

    #[test]
    fn encode_decode_empty_key() {
        let encoded = encode_key("config", b"");
        let (table, key) = decode_key(&encoded).unwrap();
        assert_eq!(table, "config");
        assert_eq!(key, b"");
    }

    #[test]
    fn key_ordering_groups_tables() {
        let key_a = encode_key("pages", b"a");
        let key_b = encode_key("pages", b"b");
        let key_other = encode_key("zother", b"a");
        assert!(key_a < key_b);
        assert!(key_b < key_other);
    }

    #[test]
    fn table_range_covers_all_table_keys() {
        let end = table_end_key("pages");
        assert!(encode_key("pages", b"anything").as_slice() < end.as_slice());
        assert!(encode_key("zother", b"a").as_slice() >= end.as_slice());
    }

    #[test]
    fn prefix_end_bounds_the_prefix() {
        let end = prefix_end_key("pages", b"ab");
        assert!(encode_key("pages", b"ab").as_slice() < end.as_slice());
        assert!(encode_key("pages", b"ab\xff\xff").as_slice() < end.as_slice());
        assert!(encode_key("pages", b"ac").as_slice() >= end.as_slice());
    }

    #[test]
    fn prefix_end_carries_past_trailing_ff() {
        let end = prefix_end_key("t", b"a\xff");
        assert!(encode_key("t", b"a\xff\x01").as_slice() < end.as_slice());
        assert!(encode_key("t", b"b").as_slice() >= end.as_slice());
    }
}
