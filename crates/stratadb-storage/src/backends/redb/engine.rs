//! Redb engine implementation.

use std::path::Path;

use redb::{Database, ReadableTable};

use crate::engine::{KeyValue, StorageEngine, StorageError};

use super::batch::RedbBatch;
use super::tables::{decode_key, encode_key, prefix_end_key, DATA_TABLE};

/// Configuration options for the Redb backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedbConfig {
    /// Cache size in bytes. If not set, uses Redb's default.
    pub cache_size: Option<usize>,
}

impl RedbConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache size.
    #[must_use]
    pub const fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = Some(size);
        self
    }
}

/// A storage backend backed by Redb.
///
/// Redb is a pure-Rust embedded database with ACID transactions; batch
/// commits are durable when they return.
///
/// # Example
///
/// ```ignore
/// use stratadb_storage::backends::RedbEngine;
/// use stratadb_storage::{StorageEngine, WriteBatch};
///
/// let engine = RedbEngine::open("store.redb")?;
/// let mut batch = engine.batch()?;
/// batch.put("pages", b"key", b"value")?;
/// batch.commit()?;
/// ```
pub struct RedbEngine {
    /// The underlying Redb database.
    db: Database,
}

impl RedbEngine {
    /// Open or create a database at the given path with default
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the database cannot be opened or
    /// created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_with_config(path, RedbConfig::default())
    }

    /// Open or create a database at the given path with custom
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the database cannot be opened or
    /// created.
    pub fn open_with_config(
        path: impl AsRef<Path>,
        config: RedbConfig,
    ) -> Result<Self, StorageError> {
        let mut builder = Database::builder();
        if let Some(cache_size) = config.cache_size {
            builder.set_cache_size(cache_size);
        }
        let db = builder.create(path.as_ref()).map_err(|e| StorageError::Open(e.to_string()))?;
        Ok(Self { db })
    }

    /// Create an in-memory database for testing.
    ///
    /// The database is lost when the engine is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the database cannot be created.
    pub fn in_memory() -> Result<Self, StorageError> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(|e| StorageError::Open(e.to_string()))?;
        Ok(Self { db })
    }
}

impl StorageEngine for RedbEngine {
    type Batch<'a> = RedbBatch;

    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let tx = self.db.begin_read().map_err(|e| StorageError::Batch(e.to_string()))?;
        let encoded = encode_key(table, key);
        match tx.open_table(DATA_TABLE) {
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

    fn scan_prefix(
        &self,
        table: &str,
        prefix: &[u8],
        after: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<KeyValue>, StorageError> {
        // Resuming strictly after a key means starting at its immediate byte
        // successor, which is the key with 0x00 appended.
        let start = match after {
            Some(after) => {
                let mut start = encode_key(table, after);
                start.push(0x00);
                start
            }
            None => encode_key(table, prefix),
        };
        let end = prefix_end_key(table, prefix);
        if start >= end {
            return Ok(Vec::new());
        }

        let tx = self.db.begin_read().map_err(|e| StorageError::Batch(e.to_string()))?;
        let t = match tx.open_table(DATA_TABLE) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Internal(e.to_string())),
        };

        let range = t
            .range(start.as_slice()..end.as_slice())
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        let mut entries = Vec::with_capacity(limit.min(1024));
        for result in range {
            if entries.len() >= limit {
                break;
            }
            let (k, v) = result.map_err(|e| StorageError::Internal(e.to_string()))?;
            if let Some((_, original_key)) = decode_key(k.value()) {
                entries.push((original_key.to_vec(), v.value().to_vec()));
            }
        }
        Ok(entries)
    }

    fn batch(&self) -> Result<Self::Batch<'_>, StorageError> {
        let tx = self.db.begin_write().map_err(|e| StorageError::Batch(e.to_string()))?;
        Ok(RedbBatch::new(tx))
    }
}
