//! Error types for the core crate.

use thiserror::Error;

/// Errors that can occur in the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An encoding or decoding error occurred.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A key exceeded the maximum allowed size.
    #[error("key too large: {actual} bytes (max {max})")]
    KeyTooLarge {
        /// The size of the offending key.
        actual: usize,
        /// The maximum allowed key size.
        max: usize,
    },

    /// A validation error occurred.
    #[error("validation error: {0}")]
    Validation(String),
}
