//! Storage Manager
//!
//! Manages multiple SSTables and coordinates reads/writes.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup
//! - Create new SSTables from MemTable flushes
//! - Hand snapshots the current table list

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::memtable::{MemTable, MemTableEntry};

use super::{SSTable, SSTableBuilder, SSTableReader};

/// Manages the storage layer
///
/// ## Concurrency:
/// - `sstables`: Protected by RwLock (many concurrent readers, exclusive writer)
/// - Readers are shared through `Arc` and do their own file locking, so
///   lookups only need the read lock
/// - `next_sstable_id`: Atomic counter (lock-free)
pub struct StorageManager {
    /// Directory where SSTables are stored
    data_dir: PathBuf,

    /// Open SSTable readers, ordered newest → oldest
    sstables: RwLock<Vec<Arc<SSTableReader>>>,

    /// Next ID for creating new SSTables (atomic, lock-free)
    next_sstable_id: AtomicU64,
}

impl StorageManager {
    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist (unless read-only)
    /// 2. Discover existing SSTable files, removing abandoned temp files
    /// 3. Open readers for each (loads indexes into RAM)
    /// 4. Order by ID descending (newest first)
    pub fn open(path: &Path, read_only: bool) -> Result<Self> {
        if !read_only {
            fs::create_dir_all(path)?;
        }

        let mut sstable_ids: Vec<u64> = Vec::new();
        if path.is_dir() {
            for entry in fs::read_dir(path)? {
                let file_path = entry?.path();
                if !file_path.is_file() {
                    continue;
                }
                if let Some(id) = Self::parse_sstable_id(&file_path) {
                    sstable_ids.push(id);
                } else if !read_only && file_path.extension().is_some_and(|ext| ext == "tmp") {
                    tracing::debug!("Removing abandoned SSTable {}", file_path.display());
                    fs::remove_file(&file_path)?;
                }
            }
        }

        // Newest first (highest ID first)
        sstable_ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut sstables = Vec::with_capacity(sstable_ids.len());
        for id in &sstable_ids {
            let reader = SSTableReader::open(&Self::sstable_path_with_dir(path, *id))?;
            sstables.push(Arc::new(reader));
        }

        let next_id = sstable_ids.first().map(|&id| id + 1).unwrap_or(1);
        tracing::debug!(
            "Storage at {} opened with {} SSTables",
            path.display(),
            sstables.len()
        );

        Ok(Self {
            data_dir: path.to_path_buf(),
            sstables: RwLock::new(sstables),
            next_sstable_id: AtomicU64::new(next_id),
        })
    }

    /// Flush a MemTable to a new SSTable
    ///
    /// Writes the latest version of every key (tombstones included), opens a
    /// reader for the new file and puts it at the front of the list.
    pub fn flush(&self, memtable: &MemTable) -> Result<SSTable> {
        if memtable.is_empty() {
            return Err(Error::Storage("Cannot flush empty MemTable".to_string()));
        }

        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = self.sstable_path(id);

        let mut builder = SSTableBuilder::new(&path)?;
        for (key, entry) in memtable.iter() {
            match entry {
                MemTableEntry::Value(v) => builder.add(&key, &v)?,
                MemTableEntry::Tombstone => builder.add_tombstone(&key)?,
            }
        }
        let metadata = builder.finish()?;

        let reader = SSTableReader::open(&path)?;
        self.sstables.write().insert(0, Arc::new(reader));

        tracing::debug!(
            "Flushed {} entries to {} ({} bytes)",
            metadata.entry_count,
            path.display(),
            metadata.file_size
        );
        Ok(metadata)
    }

    /// The current tables, newest first
    pub fn tables(&self) -> Vec<Arc<SSTableReader>> {
        self.sstables.read().clone()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn sstable_path(&self, id: u64) -> PathBuf {
        Self::sstable_path_with_dir(&self.data_dir, id)
    }

    fn sstable_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("sstable_{:06}.sst", id))
    }

    /// "sstable_000042.sst" → Some(42)
    fn parse_sstable_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        name.strip_prefix("sstable_")?.parse().ok()
    }
}
