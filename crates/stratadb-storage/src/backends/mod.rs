//! Storage backend implementations.
//!
//! This module contains concrete implementations of the backend traits.

pub mod redb;

pub use self::redb::RedbEngine;
