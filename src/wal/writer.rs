//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::Result;

use super::entry::now_millis;
use super::{Operation, WalEntry, WalReader};

/// Writes entries to the WAL file
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    /// LSN of the last appended entry (0 = none yet)
    current_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries appended since the last fsync
    unsynced: usize,
}

impl WalWriter {
    /// Open or create a WAL file
    ///
    /// An existing file is scanned so new entries continue its LSN sequence.
    /// The caller is expected to have repaired a torn tail first
    /// (see `WalRecovery::recover`).
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let mut current_lsn = 0;
        if path.exists() {
            let mut reader = WalReader::open(path)?;
            while let Some(entry) = reader.next_entry()? {
                current_lsn = entry.lsn;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            current_lsn,
            sync_strategy,
            unsynced: 0,
        })
    }

    /// Append one commit to the WAL, returning its LSN
    ///
    /// The entry is handed to the OS before returning; fsync follows the
    /// configured strategy.
    pub fn append(&mut self, operations: &[Operation]) -> Result<u64> {
        let lsn = self.current_lsn + 1;
        let bytes = WalEntry::encode(lsn, now_millis(), operations)?;
        self.writer.write_all(&bytes)?;
        self.writer.flush()?;
        self.current_lsn = lsn;
        self.unsynced += 1;

        let should_sync = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced >= count.max(1),
        };
        if should_sync {
            self.sync()?;
        }
        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Drop every entry (their contents are durable elsewhere)
    ///
    /// LSNs keep counting from where they were.
    pub fn truncate(&mut self) -> Result<()> {
        self.writer.flush()?;
        let file = self.writer.get_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.sync_all()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Get the current LSN
    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
