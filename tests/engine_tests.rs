//! Tests for Engine
//!
//! These tests verify:
//! - Basic get/put/delete operations
//! - Atomic multi-key transactions
//! - Snapshot isolation across commits and flushes
//! - Flush to SSTable
//! - Crash recovery from WAL
//! - Read-only mode
//! - Concurrent access patterns

use std::sync::Arc;
use std::thread;

use bowdb::config::{Config, WalSyncStrategy};
use bowdb::engine::{Engine, SnapshotIter};
use bowdb::Error;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .wal_sync_strategy(WalSyncStrategy::EveryWrite) // Sync every write for test reliability
        .memtable_size_limit(1024 * 1024) // 1 MB
        .build();
    let engine = Engine::open(&config).unwrap();
    (temp_dir, engine)
}

fn setup_temp_engine_with_small_memtable() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .wal_sync_strategy(WalSyncStrategy::EveryWrite)
        .memtable_size_limit(100) // Very small to trigger flushes
        .build();
    let engine = Engine::open(&config).unwrap();
    (temp_dir, engine)
}

fn reopen(path: &std::path::Path, read_only: bool) -> bowdb::Result<Engine> {
    let config = Config::builder()
        .data_dir(path)
        .read_only(read_only)
        .wal_sync_strategy(WalSyncStrategy::EveryWrite)
        .build();
    Engine::open(&config)
}

fn get(engine: &Engine, key: &[u8]) -> Option<Vec<u8>> {
    engine.get(key).unwrap().map(|v| v.to_vec())
}

fn collect_keys(mut iter: SnapshotIter, prefix: &[u8]) -> Vec<Vec<u8>> {
    iter.seek(prefix).unwrap();
    let mut keys = Vec::new();
    while iter.valid_for_prefix(prefix) {
        keys.push(iter.key().unwrap().to_vec());
        iter.next().unwrap();
    }
    keys
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_engine_open_creates_directories() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("mydb");

    let config = Config::builder().data_dir(&data_dir).build();
    let _engine = Engine::open(&config).unwrap();

    assert!(data_dir.exists());
    assert!(data_dir.join("sstables").exists());
    assert!(data_dir.join("wal.log").exists());
}

#[test]
fn test_engine_put_get() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"hello", b"world").unwrap();
    assert_eq!(get(&engine, b"hello"), Some(b"world".to_vec()));
    assert_eq!(get(&engine, b"nonexistent"), None);
}

#[test]
fn test_engine_put_overwrite() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"key", b"value1").unwrap();
    engine.put(b"key", b"value2").unwrap();

    assert_eq!(get(&engine, b"key"), Some(b"value2".to_vec()));
}

#[test]
fn test_engine_delete() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"key", b"value").unwrap();
    engine.delete(b"key").unwrap();
    assert_eq!(get(&engine, b"key"), None);

    // Deleting a missing key is not an error
    engine.delete(b"nonexistent").unwrap();
}

#[test]
fn test_engine_commit_sequences_increase() {
    let (_temp, engine) = setup_temp_engine();
    assert_eq!(engine.last_sequence(), 0);

    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();
    assert_eq!(engine.last_sequence(), 2);
}

// =============================================================================
// Transaction Tests
// =============================================================================

#[test]
fn test_transaction_commits_atomically() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"gone", b"x").unwrap();

    let mut txn = engine.begin().unwrap();
    txn.set(b"a".as_slice(), b"1".as_slice());
    txn.set(b"b".as_slice(), b"2".as_slice());
    txn.delete(b"gone".as_slice());
    assert_eq!(txn.len(), 3);

    // Nothing visible before commit
    assert_eq!(get(&engine, b"a"), None);
    let seq = txn.commit().unwrap();

    assert_eq!(seq, engine.last_sequence());
    assert_eq!(get(&engine, b"a"), Some(b"1".to_vec()));
    assert_eq!(get(&engine, b"b"), Some(b"2".to_vec()));
    assert_eq!(get(&engine, b"gone"), None);
}

#[test]
fn test_transaction_reads_own_writes() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"k", b"committed").unwrap();

    let mut txn = engine.begin().unwrap();
    assert_eq!(txn.get(b"k").unwrap().as_deref(), Some(&b"committed"[..]));
    txn.set(b"k".as_slice(), b"pending".as_slice());
    assert_eq!(txn.get(b"k").unwrap().as_deref(), Some(&b"pending"[..]));
    txn.delete(b"k".as_slice());
    assert_eq!(txn.get(b"k").unwrap(), None);
}

#[test]
fn test_transaction_discard() {
    let (_temp, engine) = setup_temp_engine();

    let mut txn = engine.begin().unwrap();
    txn.set(b"k".as_slice(), b"v".as_slice());
    txn.discard();

    assert_eq!(get(&engine, b"k"), None);
    assert_eq!(engine.last_sequence(), 0);
}

#[test]
fn test_update_rolls_back_on_error() {
    let (_temp, engine) = setup_temp_engine();

    let result: bowdb::Result<()> = engine.update(|txn| {
        txn.set(b"k".as_slice(), b"v".as_slice());
        Err(Error::Storage("abort".to_string()))
    });

    assert!(result.is_err());
    assert_eq!(get(&engine, b"k"), None);
}

#[test]
fn test_view_reads_snapshot() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"k", b"v").unwrap();

    let len = engine
        .view(|snapshot| Ok(snapshot.get(b"k")?.map(|v| v.len())))
        .unwrap();
    assert_eq!(len, Some(1));
}

// =============================================================================
// Snapshot Tests
// =============================================================================

#[test]
fn test_snapshot_ignores_later_commits() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();

    let snapshot = engine.snapshot();
    engine.put(b"a", b"changed").unwrap();
    engine.delete(b"b").unwrap();
    engine.put(b"c", b"3").unwrap();

    assert_eq!(snapshot.get(b"a").unwrap().as_deref(), Some(&b"1"[..]));
    assert_eq!(snapshot.get(b"b").unwrap().as_deref(), Some(&b"2"[..]));
    assert_eq!(snapshot.get(b"c").unwrap(), None);
    assert_eq!(collect_keys(snapshot.iter(), b""), vec![b"a".to_vec(), b"b".to_vec()]);
}

#[test]
fn test_snapshot_survives_flush() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"a", b"1").unwrap();

    let snapshot = engine.snapshot();
    engine.flush().unwrap();
    engine.put(b"b", b"2").unwrap();

    assert_eq!(collect_keys(snapshot.iter(), b""), vec![b"a".to_vec()]);
    assert_eq!(
        collect_keys(engine.snapshot().iter(), b""),
        vec![b"a".to_vec(), b"b".to_vec()]
    );
}

#[test]
fn test_snapshot_iter_merges_memtable_and_sstables() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"p/1", b"old").unwrap();
    engine.put(b"p/3", b"x").unwrap();
    engine.put(b"q/1", b"y").unwrap();
    engine.flush().unwrap();

    engine.put(b"p/1", b"new").unwrap();
    engine.put(b"p/2", b"z").unwrap();
    engine.delete(b"p/3").unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(
        collect_keys(snapshot.iter(), b"p/"),
        vec![b"p/1".to_vec(), b"p/2".to_vec()]
    );

    let mut iter = snapshot.iter();
    iter.seek(b"p/1").unwrap();
    assert_eq!(iter.value().map(|v| v.to_vec()), Some(b"new".to_vec()));
}

// =============================================================================
// Flush Tests
// =============================================================================

#[test]
fn test_engine_manual_flush() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"key", b"value").unwrap();
    assert_eq!(engine.memtable_entry_count(), 1);
    assert_eq!(engine.sstable_count(), 0);

    engine.flush().unwrap();

    assert_eq!(engine.memtable_entry_count(), 0);
    assert_eq!(engine.sstable_count(), 1);
    assert_eq!(get(&engine, b"key"), Some(b"value".to_vec()));
}

#[test]
fn test_engine_auto_flush_on_size_limit() {
    let (_temp, engine) = setup_temp_engine_with_small_memtable();

    for i in 0..10 {
        let key = format!("key{:02}", i);
        let value = format!("value_that_is_definitely_long_enough_{:02}", i);
        engine.put(key.as_bytes(), value.as_bytes()).unwrap();
    }

    assert!(
        engine.sstable_count() >= 1,
        "Expected at least 1 SSTable after writing data exceeding memtable limit, got {}",
        engine.sstable_count()
    );
    for i in 0..10 {
        let key = format!("key{:02}", i);
        assert!(get(&engine, key.as_bytes()).is_some(), "Key {} should exist", key);
    }
}

#[test]
fn test_engine_flush_empty_memtable() {
    let (_temp, engine) = setup_temp_engine();

    engine.flush().unwrap();
    assert_eq!(engine.sstable_count(), 0);
}

#[test]
fn test_deleted_key_stays_deleted_after_flush() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"key", b"value").unwrap();
    engine.flush().unwrap();
    engine.delete(b"key").unwrap();
    engine.flush().unwrap();

    assert_eq!(engine.sstable_count(), 2);
    assert_eq!(get(&engine, b"key"), None);
}

// =============================================================================
// Crash Recovery Tests
// =============================================================================

#[test]
fn test_engine_recovery_from_wal() {
    let temp_dir = TempDir::new().unwrap();

    // Don't call close(): data is only in the WAL
    {
        let engine = reopen(temp_dir.path(), false).unwrap();
        engine.put(b"key1", b"value1").unwrap();
        engine.put(b"key2", b"value2").unwrap();
        engine.delete(b"key1").unwrap();
        engine.put(b"key3", b"value3").unwrap();
    }

    let engine = reopen(temp_dir.path(), false).unwrap();

    // Recovered data is flushed on open
    assert_eq!(engine.sstable_count(), 1);
    assert_eq!(get(&engine, b"key1"), None);
    assert_eq!(get(&engine, b"key2"), Some(b"value2".to_vec()));
    assert_eq!(get(&engine, b"key3"), Some(b"value3".to_vec()));
}

#[test]
fn test_engine_recovers_whole_transactions() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = reopen(temp_dir.path(), false).unwrap();
        engine
            .update(|txn| {
                txn.set(b"a".as_slice(), b"1".as_slice());
                txn.set(b"b".as_slice(), b"2".as_slice());
                Ok(())
            })
            .unwrap();
    }

    let engine = reopen(temp_dir.path(), false).unwrap();
    assert_eq!(get(&engine, b"a"), Some(b"1".to_vec()));
    assert_eq!(get(&engine, b"b"), Some(b"2".to_vec()));
}

#[test]
fn test_engine_no_data_loss_after_repeated_recovery() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = reopen(temp_dir.path(), false).unwrap();
        engine.put(b"key", b"value").unwrap();
    }
    {
        let engine = reopen(temp_dir.path(), false).unwrap();
        assert_eq!(get(&engine, b"key"), Some(b"value".to_vec()));
    }

    let engine = reopen(temp_dir.path(), false).unwrap();
    assert_eq!(get(&engine, b"key"), Some(b"value".to_vec()));
    assert_eq!(engine.sstable_count(), 1);
}

#[test]
fn test_engine_close_flushes_data() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = reopen(temp_dir.path(), false).unwrap();
        engine.put(b"key", b"value").unwrap();
        engine.close().unwrap();
    }

    let engine = reopen(temp_dir.path(), false).unwrap();
    assert_eq!(get(&engine, b"key"), Some(b"value".to_vec()));
    assert_eq!(engine.sstable_count(), 1);
}

// =============================================================================
// Read-Only Tests
// =============================================================================

#[test]
fn test_read_only_requires_existing_directory() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("missing");

    assert!(matches!(reopen(&missing, true), Err(Error::NotFound)));
    assert!(!missing.exists());
}

#[test]
fn test_read_only_sees_unflushed_data_and_rejects_writes() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = reopen(temp_dir.path(), false).unwrap();
        engine.put(b"flushed", b"1").unwrap();
        engine.flush().unwrap();
        engine.put(b"in_wal", b"2").unwrap();
    }
    let wal_len = std::fs::metadata(temp_dir.path().join("wal.log")).unwrap().len();

    let engine = reopen(temp_dir.path(), true).unwrap();
    assert!(engine.is_read_only());
    assert_eq!(get(&engine, b"flushed"), Some(b"1".to_vec()));
    assert_eq!(get(&engine, b"in_wal"), Some(b"2".to_vec()));

    assert!(matches!(engine.put(b"k", b"v"), Err(Error::ReadOnly)));
    assert!(matches!(engine.begin().err(), Some(Error::ReadOnly)));
    assert!(matches!(engine.flush(), Err(Error::ReadOnly)));
    engine.close().unwrap();

    // The WAL was neither replayed into an SSTable nor truncated
    let wal_len_after = std::fs::metadata(temp_dir.path().join("wal.log")).unwrap().len();
    assert_eq!(wal_len, wal_len_after);
    assert_eq!(engine.sstable_count(), 1);
}

// =============================================================================
// Sequence Tests
// =============================================================================

#[test]
fn test_sequence_values_are_unique_across_threads() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(reopen(temp_dir.path(), false).unwrap());
    let sequence = Arc::new(engine.sequence(b"\x00counter", 16).unwrap());

    let mut handles = vec![];
    for _ in 0..4 {
        let sequence = Arc::clone(&sequence);
        handles.push(thread::spawn(move || {
            (0..50).map(|_| sequence.next().unwrap()).collect::<Vec<u64>>()
        }));
    }

    let mut all: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), 200);
}

// =============================================================================
// Accessor Tests
// =============================================================================

#[test]
fn test_engine_accessors() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().to_path_buf();

    let config = Config::builder()
        .data_dir(&data_dir)
        .memtable_size_limit(1024)
        .build();
    let engine = Engine::open(&config).unwrap();

    assert_eq!(engine.data_dir(), data_dir);
    assert!(data_dir.join("sstables").is_dir());
    assert_eq!(engine.memtable_size(), 0);
    assert_eq!(engine.memtable_entry_count(), 0);
    assert_eq!(engine.sstable_count(), 0);
    assert_eq!(engine.config().memtable_size_limit, 1024);
    assert!(!engine.is_read_only());
}

// =============================================================================
// Concurrent Access Tests
// =============================================================================

#[test]
fn test_engine_concurrent_reads() {
    let (_temp, engine) = setup_temp_engine();
    let engine = Arc::new(engine);

    for i in 0..100 {
        engine
            .put(format!("key{}", i).as_bytes(), format!("value{}", i).as_bytes())
            .unwrap();
    }

    let mut handles = vec![];
    for _ in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..100 {
                let key = format!("key{}", i);
                let expected = format!("value{}", i);
                assert_eq!(get(&engine, key.as_bytes()), Some(expected.into_bytes()));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_engine_concurrent_writes() {
    let (_temp, engine) = setup_temp_engine();
    let engine = Arc::new(engine);

    let mut handles = vec![];
    for t in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..25 {
                let key = format!("thread{}_key{}", t, i);
                let value = format!("thread{}_value{}", t, i);
                engine.put(key.as_bytes(), value.as_bytes()).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.last_sequence(), 100);
    for t in 0..4 {
        for i in 0..25 {
            let key = format!("thread{}_key{}", t, i);
            let expected = format!("thread{}_value{}", t, i);
            assert_eq!(get(&engine, key.as_bytes()), Some(expected.into_bytes()));
        }
    }
}

// =============================================================================
// Edge Cases
// =============================================================================

#[test]
fn test_engine_empty_value() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"key", b"").unwrap();
    assert_eq!(get(&engine, b"key"), Some(Vec::new()));
}

#[test]
fn test_engine_large_value() {
    let (_temp, engine) = setup_temp_engine();

    let large_value = vec![0xAB; 100_000]; // 100 KB
    engine.put(b"large_key", &large_value).unwrap();
    assert_eq!(get(&engine, b"large_key"), Some(large_value));
}

#[test]
fn test_engine_binary_data() {
    let (_temp, engine) = setup_temp_engine();

    let key = b"\x00\x01\x02\xFF\xFE";
    let value = b"\xFF\x00\xAB\xCD\x00";

    engine.put(key, value).unwrap();
    assert_eq!(get(&engine, key), Some(value.to_vec()));
}
