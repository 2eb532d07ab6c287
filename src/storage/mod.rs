//! Storage Module
//!
//! Persistent storage layer using SSTable-like format.
//!
//! ## Responsibilities
//! - Persist flushed memtables to disk in sorted format
//! - Point lookups and ordered range stepping for snapshots
//! - Hand out the current table set as a cheap, immutable list of `Arc`s
//!
//! Tables are never rewritten or deleted once published, which is what lets
//! a snapshot keep reading the set it captured.

mod sstable;
mod manager;

pub use sstable::{SSTable, SSTableBuilder, SSTableReader};
pub use manager::StorageManager;
