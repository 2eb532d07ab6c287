//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::{Error, Result};

use super::{WalEntry, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries skipped
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether the WAL was truncated (partial writes removed)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries
    /// 2. Stop at the first corrupted entry (later entries cannot be trusted
    ///    to be ordered after a hole)
    /// 3. Truncate the file after the last valid entry
    /// 4. Return all valid entries in order
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let (entries, mut result, valid_len) = Self::scan(path)?;

        let file_len = std::fs::metadata(path)?.len();
        if valid_len < file_len {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_len)?;
            file.sync_all()?;
            result.was_truncated = true;
            tracing::warn!(
                "WAL {} truncated from {} to {} bytes ({} corrupted entries)",
                path.display(),
                file_len,
                valid_len,
                result.entries_corrupted
            );
        }

        Ok((entries, result))
    }

    /// Read all valid entries without touching the file
    ///
    /// Used by read-only opens.
    pub fn read(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let (entries, mut result, valid_len) = Self::scan(path)?;
        result.was_truncated = valid_len < std::fs::metadata(path)?.len();
        Ok((entries, result))
    }

    fn scan(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult, u64)> {
        let mut reader = WalReader::open(path)?;
        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();

        loop {
            match reader.next_entry() {
                Ok(Some(entry)) => {
                    result.entries_recovered += 1;
                    result.last_lsn = entry.lsn;
                    entries.push(entry);
                }
                Ok(None) => break,
                Err(Error::WalCorruption(reason)) => {
                    tracing::warn!("WAL {}: {}", path.display(), reason);
                    result.entries_corrupted += 1;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok((entries, result, reader.position()))
    }
}
