//! Engine Module
//!
//! The ordered, transactional key-value engine underneath the record layer.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTable, and Storage
//! - Atomic multi-key commits (one WAL entry per transaction)
//! - Point-in-time snapshots for reads and ordered iteration
//! - Durable, batched sequences
//! - Trigger flushes when MemTable is full
//! - Manage crash recovery on startup

mod sequence;
mod snapshot;
mod txn;

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::memtable::MemTable;
use crate::storage::StorageManager;
use crate::wal::{Operation, WalRecovery, WalWriter};

pub use sequence::Sequence;
pub use snapshot::{Snapshot, SnapshotIter};
pub use txn::Transaction;

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR) with MVCC
///
/// - **Commits** (transaction commit/flush): Serialized by `write_lock`
///   - Must acquire: write_lock → WAL → memtable → storage (on flush)
///   - Each commit gets the next sequence number; its writes become visible
///     atomically when `last_seq` is published
///
/// - **Reads**: go through a `Snapshot`, which pins a sequence number, the
///   memtable that was active and the SSTable list at creation time
///   - Flushing retires the memtable instead of clearing it, so a snapshot
///     keeps reading exactly what it captured
pub struct Engine {
    config: Config,

    /// Write-ahead log; `None` when opened read-only
    wal: Option<Mutex<WalWriter>>,

    /// Active memtable, swapped for a fresh one on flush
    memtable: RwLock<Arc<MemTable>>,

    /// Persistent storage manager (internal RwLock on sstables vec)
    storage: StorageManager,

    /// Serializes commits and flushes
    write_lock: Mutex<()>,

    /// Sequence number of the last visible commit
    last_seq: AtomicU64,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Open/create data directory (read-only requires it to exist)
    /// 2. Load existing SSTables
    /// 3. Replay the WAL into a memtable
    /// 4. Flush recovered entries and reset the WAL (skipped when read-only)
    pub fn open(config: &Config) -> Result<Self> {
        let read_only = config.read_only;
        let storage_dir = config.data_dir.join(Self::SSTABLE_DIR);
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        if read_only {
            if !config.data_dir.is_dir() {
                return Err(Error::NotFound);
            }
        } else {
            fs::create_dir_all(&storage_dir)?;
        }

        let storage = StorageManager::open(&storage_dir, read_only)?;
        let memtable = MemTable::new();
        let mut last_seq = 0;

        if wal_path.exists() {
            let (entries, result) = if read_only {
                WalRecovery::read(&wal_path)?
            } else {
                WalRecovery::recover(&wal_path)?
            };
            if result.entries_recovered > 0 || result.entries_corrupted > 0 {
                tracing::debug!(
                    "WAL recovery: {} entries recovered, {} corrupted, last_lsn={}",
                    result.entries_recovered,
                    result.entries_corrupted,
                    result.last_lsn
                );
            }

            for entry in entries {
                last_seq += 1;
                for operation in entry.operations {
                    match operation {
                        Operation::Put { key, value } => {
                            memtable.put(key, value, last_seq);
                        }
                        Operation::Delete { key } => {
                            memtable.delete(key, last_seq);
                        }
                    }
                }
            }
        }

        let (memtable, wal) = if read_only {
            (memtable, None)
        } else {
            let mut wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;
            // Recovered data goes to an SSTable before the WAL is reset
            let memtable = if memtable.is_empty() {
                memtable
            } else {
                tracing::debug!("Flushing {} recovered entries to SSTable", memtable.entry_count());
                storage.flush(&memtable)?;
                wal.truncate()?;
                MemTable::new()
            };
            (memtable, Some(Mutex::new(wal)))
        };

        tracing::debug!(
            "Engine opened at {} (read_only={}, sstables={})",
            config.data_dir.display(),
            read_only,
            storage.sstable_count()
        );

        Ok(Self {
            config: config.clone(),
            wal,
            memtable: RwLock::new(Arc::new(memtable)),
            storage,
            write_lock: Mutex::new(()),
            last_seq: AtomicU64::new(last_seq),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(&config)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Capture a point-in-time view of the whole key space
    pub fn snapshot(&self) -> Snapshot {
        // Holding the memtable slot keeps the (memtable, tables) pair
        // consistent with respect to a concurrent flush.
        let slot = self.memtable.read();
        let seq = self.last_seq.load(Ordering::Acquire);
        Snapshot::new(seq, Arc::clone(&slot), self.storage.tables())
    }

    /// Run `f` against a fresh snapshot
    pub fn view<T>(&self, f: impl FnOnce(&Snapshot) -> Result<T>) -> Result<T> {
        f(&self.snapshot())
    }

    /// Get the latest value of a key
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.snapshot().get(key)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Start a read-write transaction
    pub fn begin(&self) -> Result<Transaction<'_>> {
        if self.is_read_only() {
            return Err(Error::ReadOnly);
        }
        Ok(Transaction::new(self, self.snapshot()))
    }

    /// Run `f` in a transaction and commit it if `f` succeeds
    pub fn update<T>(&self, f: impl FnOnce(&mut Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut txn = self.begin()?;
        let out = f(&mut txn)?;
        txn.commit()?;
        Ok(out)
    }

    /// Put a single key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.update(|txn| {
            txn.set(key, value);
            Ok(())
        })
    }

    /// Delete a single key
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.update(|txn| {
            txn.delete(key);
            Ok(())
        })
    }

    /// Durable, batched counter stored under `key`
    pub fn sequence(self: &Arc<Self>, key: &[u8], bandwidth: u64) -> Result<Sequence> {
        Sequence::new(Arc::clone(self), key.to_vec(), bandwidth)
    }

    /// Apply a batch atomically
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Append one WAL entry (durability)
    /// 3. Insert every operation into the memtable at the next sequence
    /// 4. Publish the sequence (visibility)
    /// 5. Flush if the memtable is full
    pub(crate) fn apply(&self, operations: Vec<Operation>) -> Result<u64> {
        let wal = self.wal.as_ref().ok_or(Error::ReadOnly)?;
        let _write_guard = self.write_lock.lock();

        if operations.is_empty() {
            return Ok(self.last_seq.load(Ordering::Acquire));
        }

        wal.lock().append(&operations)?;

        let seq = self.last_seq.load(Ordering::Acquire) + 1;
        let memtable = Arc::clone(&self.memtable.read());
        for operation in operations {
            match operation {
                Operation::Put { key, value } => {
                    memtable.put(key, value, seq);
                }
                Operation::Delete { key } => {
                    memtable.delete(key, seq);
                }
            }
        }
        self.last_seq.store(seq, Ordering::Release);

        if memtable.should_flush(self.config.memtable_size_limit) {
            // The commit is already durable in the WAL; a failed flush is
            // retried on the next commit.
            if let Err(e) = self.flush_locked() {
                tracing::warn!("Flush after commit {} failed: {}", seq, e);
            }
        }
        Ok(seq)
    }

    /// Flush memtable to disk (public API)
    ///
    /// Forces a flush regardless of memtable size
    pub fn flush(&self) -> Result<()> {
        if self.is_read_only() {
            return Err(Error::ReadOnly);
        }
        let _write_guard = self.write_lock.lock();
        self.flush_locked()
    }

    /// Internal flush implementation (called with write lock held)
    fn flush_locked(&self) -> Result<()> {
        let Some(wal) = self.wal.as_ref() else {
            return Ok(());
        };

        {
            let mut slot = self.memtable.write();
            if slot.is_empty() {
                return Ok(());
            }
            self.storage.flush(&slot)?;
            // Retire, don't clear: live snapshots still read the old one
            *slot = Arc::new(MemTable::new());
        }

        wal.lock().truncate()
    }

    /// Close the engine gracefully
    ///
    /// Flushes any pending data and syncs to disk
    pub fn close(&self) -> Result<()> {
        let Some(wal) = self.wal.as_ref() else {
            return Ok(());
        };
        let _write_guard = self.write_lock.lock();
        self.flush_locked()?;
        wal.lock().sync()?;
        tracing::debug!("Engine at {} closed", self.config.data_dir.display());
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn is_read_only(&self) -> bool {
        self.wal.is_none()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Sequence number of the last visible commit
    pub fn last_sequence(&self) -> u64 {
        self.last_seq.load(Ordering::Acquire)
    }

    /// Get the current memtable size
    pub fn memtable_size(&self) -> usize {
        self.memtable.read().size()
    }

    /// Get the memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.read().entry_count()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
