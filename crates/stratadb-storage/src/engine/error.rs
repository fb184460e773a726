//! Storage error types.
//!
//! This module defines the error types for backend operations. All errors
//! implement [`std::error::Error`] and provide descriptive messages.

use thiserror::Error;

/// Errors that can occur in backend operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The database could not be opened or created.
    #[error("failed to open database: {0}")]
    Open(String),

    /// A batch error occurred (failed to begin, commit, or abort).
    #[error("batch error: {0}")]
    Batch(String),

    /// A conflict occurred due to concurrent modification.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// The database is corrupted.
    #[error("database corruption detected: {0}")]
    Corruption(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred in the storage backend.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors include transient conditions like conflicts that
    /// may succeed on retry; corruption is never recoverable.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Batch(_) | Self::Io(_))
    }

    /// Returns `true` if this error indicates irrecoverable corruption.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption(_))
    }
}

/// Result type alias for backend operations.
pub type StorageResult<T> = Result<T, StorageError>;
