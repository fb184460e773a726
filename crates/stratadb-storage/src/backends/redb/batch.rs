//! Redb write-batch implementation.

use redb::{ReadableTable, WriteTransaction};

use crate::engine::{StorageError, WriteBatch};

use super::tables::{encode_key, DATA_TABLE};

/// An atomic write batch backed by a Redb write transaction.
///
/// All puts and deletes become visible together on [`WriteBatch::commit`];
/// reads through the batch observe its own staged writes.
pub struct RedbBatch {
    tx: WriteTransaction,
}

impl RedbBatch {
    /// Wrap a Redb write transaction.
    pub(crate) const fn new(tx: WriteTransaction) -> Self {
        Self { tx }
    }
}

impl WriteBatch for RedbBatch {
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let encoded = encode_key(table, key);
        match self.tx.open_table(DATA_TABLE) {
            Ok(t) => match t.get(encoded.as_slice()) {
                Ok(Some(value)) => Ok(Some(value.value().to_vec())),
                Ok(None) => Ok(None),
                Err(e) => Err(StorageError::Internal(e.to_string())),
            },
            // No data table means no data, which is not an error.
            Err(redb::TableError::TableDoesNotExist(_)) => Ok(None),
            Err(e) => Err(StorageError::Internal(e.to_string())),
        }
    }

    fn put(&mut self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let encoded = encode_key(table, key);
        let mut t =
            self.tx.open_table(DATA_TABLE).map_err(|e| StorageError::Internal(e.to_string()))?;
        t.insert(encoded.as_slice(), value).map_err(|e| StorageError::Internal(e.to_string()))?;
        Ok(())
    }

    fn delete(&mut self, table: &str, key: &[u8]) -> Result<(), StorageError> {
        let encoded = encode_key(table, key);
        match self.tx.open_table(DATA_TABLE) {
            Ok(mut t) => {
                t.remove(encoded.as_slice())
                    .map_err(|e| StorageError::Internal(e.to_string()))?;
                Ok(())
            }
            // Table doesn't exist, so the key definitely doesn't exist.
            Err(redb::TableError::TableDoesNotExist(_)) => Ok(()),
            Err(e) => Err(StorageError::Internal(e.to_string())),
        }
    }

    fn commit(self) -> Result<(), StorageError> {
        self.tx.commit().map_err(|e| StorageError::Batch(e.to_string()))
    }

    fn rollback(self) -> Result<(), StorageError> {
        // Ignore abort result - we're rolling back anyway.
        drop(self.tx.abort());
        Ok(())
    }
}
