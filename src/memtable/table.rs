//! MemTable implementation
//!
//! BTreeMap-based multi-version memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;

use super::MemTableEntry;

/// Per-version bookkeeping overhead counted towards the size limit
const VERSION_OVERHEAD: usize = 16;

type Versions = Vec<(u64, MemTableEntry)>;

/// In-memory table for recent writes
pub struct MemTable {
    /// key → versions in ascending sequence order
    data: RwLock<BTreeMap<Vec<u8>, Versions>>,
    /// Approximate size in bytes (keys, values, per-version overhead)
    size: AtomicUsize,
    /// Number of distinct keys
    entry_count: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
            entry_count: AtomicUsize::new(0),
        }
    }

    /// Record a value for `key` at sequence `seq`, returning the new size
    pub fn put(&self, key: Vec<u8>, value: impl Into<Bytes>, seq: u64) -> usize {
        self.insert(key, MemTableEntry::Value(value.into()), seq)
    }

    /// Record a tombstone for `key` at sequence `seq`, returning the new size
    pub fn delete(&self, key: Vec<u8>, seq: u64) -> usize {
        self.insert(key, MemTableEntry::Tombstone, seq)
    }

    fn insert(&self, key: Vec<u8>, entry: MemTableEntry, seq: u64) -> usize {
        let value_len = match &entry {
            MemTableEntry::Value(v) => v.len(),
            MemTableEntry::Tombstone => 0,
        };
        let mut data = self.data.write();
        let added = match data.get_mut(key.as_slice()) {
            Some(versions) => {
                versions.push((seq, entry));
                value_len + VERSION_OVERHEAD
            }
            None => {
                let added = key.len() + value_len + VERSION_OVERHEAD;
                data.insert(key, vec![(seq, entry)]);
                self.entry_count.fetch_add(1, Ordering::Relaxed);
                added
            }
        };
        self.size.fetch_add(added, Ordering::Relaxed) + added
    }

    /// Latest entry for `key`
    pub fn get(&self, key: &[u8]) -> Option<MemTableEntry> {
        self.get_at(key, u64::MAX)
    }

    /// Newest entry for `key` written at or before `seq`
    pub fn get_at(&self, key: &[u8], seq: u64) -> Option<MemTableEntry> {
        let data = self.data.read();
        data.get(key).and_then(|versions| visible(versions, seq).cloned())
    }

    /// First key after `from` that has a version visible at `seq`
    pub fn first_after(
        &self,
        from: Bound<&[u8]>,
        seq: u64,
    ) -> Option<(Vec<u8>, MemTableEntry)> {
        let data = self.data.read();
        data.range::<[u8], _>((from, Bound::Unbounded))
            .find_map(|(key, versions)| visible(versions, seq).map(|e| (key.clone(), e.clone())))
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.entry_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    /// Check if should flush (size > limit)
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() >= size_limit
    }

    /// Latest version of every key, in sorted key order (for flush)
    pub fn iter(&self) -> MemTableIterator {
        let data = self.data.read();
        let entries: Vec<(Vec<u8>, MemTableEntry)> = data
            .iter()
            .filter_map(|(key, versions)| versions.last().map(|(_, e)| (key.clone(), e.clone())))
            .collect();
        MemTableIterator {
            inner: entries.into_iter(),
        }
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

fn visible(versions: &Versions, seq: u64) -> Option<&MemTableEntry> {
    versions
        .iter()
        .rev()
        .find(|(version, _)| *version <= seq)
        .map(|(_, entry)| entry)
}

/// Iterator over MemTable entries
pub struct MemTableIterator {
    inner: std::vec::IntoIter<(Vec<u8>, MemTableEntry)>,
}

impl Iterator for MemTableIterator {
    type Item = (Vec<u8>, MemTableEntry);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_visible_by_sequence() {
        let memtable = MemTable::new();
        memtable.put(b"k".to_vec(), b"v1".to_vec(), 1);
        memtable.put(b"k".to_vec(), b"v2".to_vec(), 5);
        memtable.delete(b"k".to_vec(), 9);

        assert_eq!(memtable.get_at(b"k", 0), None);
        assert_eq!(
            memtable.get_at(b"k", 4),
            Some(MemTableEntry::Value(Bytes::from_static(b"v1")))
        );
        assert_eq!(
            memtable.get_at(b"k", 8),
            Some(MemTableEntry::Value(Bytes::from_static(b"v2")))
        );
        assert_eq!(memtable.get(b"k"), Some(MemTableEntry::Tombstone));
        assert_eq!(memtable.entry_count(), 1);
    }

    #[test]
    fn test_first_after_skips_invisible_keys() {
        let memtable = MemTable::new();
        memtable.put(b"a".to_vec(), b"1".to_vec(), 1);
        memtable.put(b"b".to_vec(), b"2".to_vec(), 7);
        memtable.put(b"c".to_vec(), b"3".to_vec(), 2);

        let (key, _) = memtable.first_after(Bound::Excluded(&b"a"[..]), 3).unwrap();
        assert_eq!(key, b"c".to_vec());
        assert!(memtable.first_after(Bound::Excluded(&b"c"[..]), 3).is_none());
    }
}
