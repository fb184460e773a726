//! `StrataDB` Storage
//!
//! This crate provides the key-value backend abstraction and backend
//! implementations for `StrataDB`.
//!
//! # Modules
//!
//! - [`engine`] - Backend traits and abstractions
//! - [`backends`] - Concrete backend implementations

pub mod backends;
pub mod engine;

pub use engine::{KeyValue, StorageEngine, StorageError, StorageResult, WriteBatch};
