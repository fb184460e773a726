//! Redb storage backend.
//!
//! Implements the backend traits using the Redb embedded database. Logical
//! tables are multiplexed into one physical Redb table by key prefixing, and
//! write batches map onto Redb write transactions, which are atomic and
//! durable on commit.

mod batch;
mod engine;
mod tables;

pub use batch::RedbBatch;
pub use engine::{RedbConfig, RedbEngine};
