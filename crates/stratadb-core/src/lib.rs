//! `StrataDB` Core
//!
//! This crate provides the fundamental types shared by the `StrataDB` storage
//! and engine crates.
//!
//! # Modules
//!
//! - [`types`] - Core data types (ObjectId, CommitId, Entry, Value, Commit)
//! - [`hash`] - Domain-separated content hashing
//! - [`encoding`] - Persistent binary encodings and key namespaces
//! - [`error`] - Error types

pub mod encoding;
pub mod error;
pub mod hash;
pub mod types;

// Re-export commonly used types
pub use error::CoreError;
pub use types::{
    Commit, CommitId, Entry, EntryChange, ObjectId, PageId, Priority, SyncStatus, Value,
    INLINE_VALUE_THRESHOLD, MAX_KEY_SIZE,
};
