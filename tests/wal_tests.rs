//! Tests for the Write-Ahead Log
//!
//! These tests verify:
//! - Writer LSN assignment, reopen and truncation
//! - Reader handling of torn tails
//! - Recovery from clean, torn and corrupted logs

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use bowdb::config::WalSyncStrategy;
use bowdb::wal::{Operation, WalReader, WalRecovery, WalWriter, HEADER_SIZE};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn put(key: &str, value: &str) -> Operation {
    Operation::Put {
        key: key.as_bytes().to_vec(),
        value: value.as_bytes().to_vec(),
    }
}

/// Write `count` single-put entries using WalWriter
fn write_entries_via_writer(path: &Path, count: usize) {
    let mut writer = WalWriter::open(path, WalSyncStrategy::EveryWrite).unwrap();
    for i in 0..count {
        writer
            .append(&[put(&format!("key{}", i), &format!("value{}", i))])
            .unwrap();
    }
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).unwrap().len()
}

/// LSNs of every entry the reader returns before it stops
fn read_lsns(path: &Path) -> Vec<u64> {
    let mut reader = WalReader::open(path).unwrap();
    let mut lsns = Vec::new();
    while let Some(entry) = reader.next_entry().unwrap() {
        lsns.push(entry.lsn);
    }
    lsns
}

fn append_raw(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

// =============================================================================
// Writer Tests
// =============================================================================

#[test]
fn test_writer_assigns_sequential_lsns() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    assert_eq!(writer.current_lsn(), 0);
    assert_eq!(writer.append(&[put("a", "1")]).unwrap(), 1);
    assert_eq!(writer.append(&[put("b", "2"), put("c", "3")]).unwrap(), 2);
    assert_eq!(writer.current_lsn(), 2);
    assert_eq!(writer.path(), wal_path.as_path());
}

#[test]
fn test_writer_reopen_continues_lsn() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 5);

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.current_lsn(), 5);
    assert_eq!(writer.append(&[put("x", "y")]).unwrap(), 6);
}

#[test]
fn test_writer_batched_sync() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer =
            WalWriter::open(&wal_path, WalSyncStrategy::EveryNEntries { count: 3 }).unwrap();
        for i in 0..5 {
            writer.append(&[put(&format!("k{}", i), "v")]).unwrap();
        }
    }

    // Every append is flushed to the file even when not yet fsynced
    let (entries, _) = WalRecovery::read(&wal_path).unwrap();
    assert_eq!(entries.len(), 5);
}

#[test]
fn test_writer_truncate_keeps_lsn() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    writer.append(&[put("a", "1")]).unwrap();
    writer.append(&[put("b", "2")]).unwrap();

    writer.truncate().unwrap();
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), 0);

    assert_eq!(writer.append(&[put("c", "3")]).unwrap(), 3);
    let (entries, _) = WalRecovery::read(&wal_path).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].lsn, 3);
}

// =============================================================================
// Reader Tests
// =============================================================================

#[test]
fn test_reader_reads_all_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 4);

    assert_eq!(read_lsns(&wal_path), vec![1, 2, 3, 4]);
}

#[test]
fn test_reader_stops_at_torn_header() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 2);
    let valid_len = fs::metadata(&wal_path).unwrap().len();
    append_raw(&wal_path, &[0xAB; HEADER_SIZE / 2]);

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(reader.next_entry().unwrap().is_some());
    assert!(reader.next_entry().unwrap().is_some());
    assert!(reader.next_entry().unwrap().is_none());
    assert_eq!(reader.position(), valid_len);
    // Stays at the end
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn test_reader_stops_at_torn_payload() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 1);
    let valid_len = file_len(&wal_path);
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(&[put("key", "a longer value")]).unwrap();
    }
    let file = OpenOptions::new().write(true).open(&wal_path).unwrap();
    file.set_len(file_len(&wal_path) - 3).unwrap();

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(reader.next_entry().unwrap().is_some());
    assert!(reader.next_entry().unwrap().is_none());
    assert_eq!(reader.position(), valid_len);
}

#[test]
fn test_reader_reports_checksum_mismatch() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 1);
    let mut bytes = fs::read(&wal_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    fs::write(&wal_path, &bytes).unwrap();

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(matches!(reader.next_entry(), Err(bowdb::Error::WalCorruption(_))));
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result.entries_recovered, 0);
    assert_eq!(result.entries_corrupted, 0);
    assert_eq!(result.last_lsn, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_multiple_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 10);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 10);
    assert_eq!(result.entries_recovered, 10);
    assert_eq!(result.last_lsn, 10);
    assert!(!result.was_truncated);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.lsn, (i + 1) as u64);
    }
}

#[test]
fn test_recover_preserves_batches() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer
            .append(&[put("k1", "v1"), Operation::Delete { key: b"k0".to_vec() }])
            .unwrap();
        writer.append(&[put("k2", "v2")]).unwrap();
    }

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 2);
    assert_eq!(entries[0].operations.len(), 2);
    assert!(matches!(entries[0].operations[1], Operation::Delete { .. }));
    assert_eq!(entries[1].operations[0].key(), b"k2");
}

#[test]
fn test_recover_truncates_torn_tail() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 3);
    let valid_len = fs::metadata(&wal_path).unwrap().len();
    append_raw(&wal_path, &[0x01, 0x02, 0x03]);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 3);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), valid_len);
}

#[test]
fn test_recover_stops_at_corrupted_entry() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 2);
    let valid_len = file_len(&wal_path);
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(&[put("k", "v")]).unwrap();
        writer.append(&[put("k", "w")]).unwrap();
    }

    // Break the CRC of entry 3; entry 4 behind it is intact
    let mut bytes = fs::read(&wal_path).unwrap();
    bytes[valid_len as usize + 10] ^= 0xFF;
    fs::write(&wal_path, &bytes).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.last_lsn, 2);
    assert!(result.was_truncated);
    assert_eq!(file_len(&wal_path), valid_len);
}

#[test]
fn test_read_does_not_modify_file() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 2);
    append_raw(&wal_path, &[0xFF; 5]);
    let len_before = file_len(&wal_path);

    let (entries, result) = WalRecovery::read(&wal_path).unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(result.entries_recovered, 2);
    assert!(result.was_truncated);
    assert_eq!(file_len(&wal_path), len_before);
}
