//! Snapshots and snapshot iteration
//!
//! A snapshot reads as of one commit sequence. It owns `Arc`s to the memtable
//! and SSTables that existed when it was taken, so it stays valid (and
//! unchanged) while the engine keeps committing and flushing. Dropping it
//! releases them.

use std::ops::Bound;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;
use crate::memtable::{MemTable, MemTableEntry};
use crate::storage::SSTableReader;

/// Point-in-time, read-only view of the key space
#[derive(Clone)]
pub struct Snapshot {
    seq: u64,
    memtable: Arc<MemTable>,
    /// Newest first
    tables: Arc<[Arc<SSTableReader>]>,
}

impl Snapshot {
    pub(crate) fn new(seq: u64, memtable: Arc<MemTable>, tables: Vec<Arc<SSTableReader>>) -> Self {
        Self {
            seq,
            memtable,
            tables: tables.into(),
        }
    }

    /// Sequence number this snapshot reads at
    pub fn sequence(&self) -> u64 {
        self.seq
    }

    /// Get a value by key
    ///
    /// Search order:
    /// 1. MemTable (versions at or before the snapshot sequence)
    /// 2. SSTables (newest to oldest)
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        if let Some(entry) = self.memtable.get_at(key, self.seq) {
            return Ok(entry.into_value());
        }
        for table in self.tables.iter() {
            if !table.might_contain(key) {
                continue;
            }
            if let Some(entry) = table.get(key)? {
                return Ok(entry.into_value());
            }
        }
        Ok(None)
    }

    /// Ordered cursor over this snapshot, unpositioned until `seek`
    pub fn iter(&self) -> SnapshotIter {
        let mut cursors = Vec::with_capacity(self.tables.len() + 1);
        cursors.push(Cursor::new(Source::Mem(Arc::clone(&self.memtable))));
        for table in self.tables.iter() {
            cursors.push(Cursor::new(Source::Table(Arc::clone(table))));
        }
        SnapshotIter {
            seq: self.seq,
            cursors,
            current: None,
        }
    }
}

/// One sorted input of the merge. Lower index in `SnapshotIter::cursors`
/// means newer data.
enum Source {
    Mem(Arc<MemTable>),
    Table(Arc<SSTableReader>),
}

impl Source {
    fn entry_after(&self, from: Bound<&[u8]>, seq: u64) -> Result<Option<(Vec<u8>, MemTableEntry)>> {
        match self {
            Source::Mem(memtable) => Ok(memtable.first_after(from, seq)),
            Source::Table(table) => table.entry_after(from),
        }
    }
}

struct Cursor {
    source: Source,
    /// Next entry this source would yield
    peeked: Option<(Vec<u8>, MemTableEntry)>,
}

impl Cursor {
    fn new(source: Source) -> Self {
        Self { source, peeked: None }
    }

    fn peeked_key(&self) -> Option<&[u8]> {
        self.peeked.as_ref().map(|(k, _)| k.as_slice())
    }
}

/// Merging forward iterator over a snapshot
///
/// Yields each live key once, newest version wins, tombstones hidden.
pub struct SnapshotIter {
    seq: u64,
    cursors: Vec<Cursor>,
    current: Option<(Vec<u8>, Bytes)>,
}

impl SnapshotIter {
    /// Position at the first live key `>= key`
    pub fn seek(&mut self, key: &[u8]) -> Result<()> {
        for cursor in &mut self.cursors {
            cursor.peeked = cursor.source.entry_after(Bound::Included(key), self.seq)?;
        }
        self.settle()
    }

    /// Move to the next live key
    pub fn next(&mut self) -> Result<()> {
        let Some((key, _)) = self.current.take() else {
            return Ok(());
        };
        self.advance_past(&key)?;
        self.settle()
    }

    /// True while positioned on an entry
    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    /// True while positioned on an entry whose key starts with `prefix`
    pub fn valid_for_prefix(&self, prefix: &[u8]) -> bool {
        self.key().is_some_and(|k| k.starts_with(prefix))
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(k, _)| k.as_slice())
    }

    pub fn value(&self) -> Option<&Bytes> {
        self.current.as_ref().map(|(_, v)| v)
    }

    /// Choose the smallest pending key; skip it if its newest version is a
    /// tombstone.
    fn settle(&mut self) -> Result<()> {
        loop {
            let Some(min) = self.cursors.iter().filter_map(Cursor::peeked_key).min() else {
                self.current = None;
                return Ok(());
            };
            let min = min.to_vec();

            // First cursor holding `min` is the newest source
            let winner = self
                .cursors
                .iter()
                .find_map(|c| c.peeked.as_ref().filter(|(k, _)| *k == min).map(|(_, e)| e.clone()));

            match winner {
                Some(MemTableEntry::Value(value)) => {
                    self.current = Some((min, value));
                    return Ok(());
                }
                _ => self.advance_past(&min)?,
            }
        }
    }

    fn advance_past(&mut self, key: &[u8]) -> Result<()> {
        for cursor in &mut self.cursors {
            if cursor.peeked_key() == Some(key) {
                cursor.peeked = cursor.source.entry_after(Bound::Excluded(key), self.seq)?;
            }
        }
        Ok(())
    }
}
