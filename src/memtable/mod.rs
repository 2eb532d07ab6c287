//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Single-writer/multi-reader access pattern
//! - Keep every version written since the last flush, tagged with its commit
//!   sequence, so snapshots can read "as of" their sequence
//! - Track size for flush triggers
//! - Ordered iteration for SSTable creation
//!
//! ## Data Structure Choice
//! BTreeMap of key → version list, wrapped in RwLock:
//! - Ordered keys (required for SSTable generation and range scans)
//! - Versions are appended in commit order, newest last
//! - A full memtable is retired whole (snapshots may still hold it) and
//!   replaced by a fresh one, so it is never cleared in place

mod table;

use bytes::Bytes;

pub use table::{MemTable, MemTableIterator};

/// Entry stored in the MemTable
#[derive(Debug, Clone, PartialEq)]
pub enum MemTableEntry {
    /// A live value
    Value(Bytes),

    /// A tombstone (deleted key)
    Tombstone,
}

impl MemTableEntry {
    /// The value, or None for a tombstone
    pub fn into_value(self) -> Option<Bytes> {
        match self {
            MemTableEntry::Value(v) => Some(v),
            MemTableEntry::Tombstone => None,
        }
    }
}
