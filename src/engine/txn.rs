//! Read-write transactions
//!
//! Reads see the transaction's own pending writes over the snapshot taken at
//! `begin`. Writes are buffered and applied atomically by `commit`; dropping
//! the transaction discards them. Commits are last-writer-wins: there is no
//! conflict detection.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::Result;
use crate::wal::Operation;

use super::{Engine, Snapshot};

/// A read-write transaction
pub struct Transaction<'e> {
    engine: &'e Engine,
    snapshot: Snapshot,
    /// key → new value, `None` for a delete
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'e> Transaction<'e> {
    pub(crate) fn new(engine: &'e Engine, snapshot: Snapshot) -> Self {
        Self {
            engine,
            snapshot,
            pending: BTreeMap::new(),
        }
    }

    /// Get a value, including this transaction's own writes
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        match self.pending.get(key) {
            Some(Some(value)) => Ok(Some(Bytes::copy_from_slice(value))),
            Some(None) => Ok(None),
            None => self.snapshot.get(key),
        }
    }

    pub fn set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.pending.insert(key.into(), Some(value.into()));
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.pending.insert(key.into(), None);
    }

    /// Number of buffered writes
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply every buffered write atomically, returning the commit sequence
    pub fn commit(self) -> Result<u64> {
        let operations = self
            .pending
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => Operation::Put { key, value },
                None => Operation::Delete { key },
            })
            .collect();
        self.engine.apply(operations)
    }

    /// Drop every buffered write
    pub fn discard(self) {}
}
