//! Error types for `StrataDB`.
//!
//! This module provides the [`enum@Error`] type for all engine operations and
//! the [`Status`] codes surfaced at the external boundary.

use thiserror::Error;

use stratadb_core::CoreError;
use stratadb_storage::StorageError;

/// Status codes surfaced to the layer above the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The operation succeeded.
    Ok,
    /// The requested key does not exist.
    KeyNotFound,
    /// The operation is not valid in the current state.
    IllegalState,
    /// A recoverable input/output failure.
    IoError,
    /// Irrecoverable corruption or an engine bug.
    InternalError,
    /// The operation was cooperatively cancelled.
    Interrupted,
}

/// Errors that can occur when using the `StrataDB` engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested key was not found.
    #[error("key not found")]
    KeyNotFound,

    /// The operation is not valid in the current state (closed handle,
    /// failed explicit journal, and similar).
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A data stream did not match its advertised size.
    #[error("stream size mismatch: advertised {advertised}, got {actual}")]
    StreamSizeMismatch {
        /// The size the caller advertised.
        advertised: i64,
        /// The number of bytes actually read.
        actual: u64,
    },

    /// A caller-supplied argument was out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A backend error occurred.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// An encoding error occurred.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Irrecoverable corruption: a referenced object is missing or a node
    /// failed its content-hash check. The page is quarantined.
    #[error("corruption: {0}")]
    Corruption(String),

    /// The page refuses mutations after observing corruption.
    #[error("page is quarantined after corruption")]
    Quarantined,

    /// The operation was cooperatively cancelled.
    #[error("interrupted")]
    Interrupted,
}

impl Error {
    /// The status code this error maps to at the engine boundary.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::KeyNotFound => Status::KeyNotFound,
            Self::IllegalState(_) => Status::IllegalState,
            Self::StreamSizeMismatch { .. } | Self::InvalidArgument(_) => Status::IoError,
            Self::Storage(err) => {
                if err.is_corruption() {
                    Status::InternalError
                } else {
                    Status::IoError
                }
            }
            Self::Core(_) | Self::Corruption(_) | Self::Quarantined => Status::InternalError,
            Self::Interrupted => Status::Interrupted,
        }
    }

    /// Returns `true` if this error must quarantine the page.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Corruption(_) | Self::Core(_) => true,
            Self::Storage(err) => err.is_corruption(),
            _ => false,
        }
    }

    /// Create an illegal-state error.
    #[must_use]
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    /// Create a corruption error.
    #[must_use]
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }
}

/// A specialized `Result` type for `StrataDB` operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(Error::KeyNotFound.status(), Status::KeyNotFound);
        assert_eq!(Error::illegal_state("closed").status(), Status::IllegalState);
        assert_eq!(
            Error::StreamSizeMismatch { advertised: 5, actual: 7 }.status(),
            Status::IoError
        );
        assert_eq!(Error::corruption("bad node").status(), Status::InternalError);
        assert_eq!(Error::Interrupted.status(), Status::Interrupted);
        assert_eq!(
            Error::Storage(StorageError::Corruption("x".into())).status(),
            Status::InternalError
        );
        assert_eq!(
            Error::Storage(StorageError::Internal("x".into())).status(),
            Status::IoError
        );
    }

    #[test]
    fn fatal_errors_quarantine() {
        assert!(Error::corruption("x").is_fatal());
        assert!(!Error::KeyNotFound.is_fatal());
        assert!(!Error::Interrupted.is_fatal());
    }
}
