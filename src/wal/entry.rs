//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries. One entry holds every
//! operation of one committed transaction, so replay is all-or-nothing per
//! commit.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Header size: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Largest data section accepted when reading (256 MB)
pub const MAX_ENTRY_SIZE: u32 = 256 * 1024 * 1024;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operations committed together
    pub operations: Vec<Operation>,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl Operation {
    pub fn key(&self) -> &[u8] {
        match self {
            Operation::Put { key, .. } | Operation::Delete { key } => key,
        }
    }
}

#[derive(Serialize)]
struct PayloadRef<'a> {
    timestamp: u64,
    operations: &'a [Operation],
}

#[derive(Deserialize)]
struct Payload {
    timestamp: u64,
    operations: Vec<Operation>,
}

impl WalEntry {
    /// Serialize a commit to the on-disk format
    pub(crate) fn encode(lsn: u64, timestamp: u64, operations: &[Operation]) -> Result<Vec<u8>> {
        let data = bincode::serialize(&PayloadRef {
            timestamp,
            operations,
        })?;
        if data.len() > MAX_ENTRY_SIZE as usize {
            return Err(Error::Storage(format!(
                "WAL entry too large: {} bytes (max {})",
                data.len(),
                MAX_ENTRY_SIZE
            )));
        }
        let len = data.len() as u32;
        let crc = compute_crc(lsn, len, &data);

        let mut buf = Vec::with_capacity(HEADER_SIZE + data.len());
        buf.extend_from_slice(&lsn.to_le_bytes());
        buf.extend_from_slice(&crc.to_le_bytes());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&data);
        Ok(buf)
    }

    /// Validate and decode an entry whose header was already parsed
    pub(crate) fn from_parts(lsn: u64, crc: u32, data: &[u8]) -> Result<Self> {
        let actual = compute_crc(lsn, data.len() as u32, data);
        if actual != crc {
            return Err(Error::WalCorruption(format!(
                "CRC mismatch at lsn {}: stored {:#010x}, computed {:#010x}",
                lsn, crc, actual
            )));
        }
        let payload: Payload = bincode::deserialize(data)
            .map_err(|e| Error::WalCorruption(format!("Undecodable entry at lsn {}: {}", lsn, e)))?;
        Ok(Self {
            lsn,
            operations: payload.operations,
            timestamp: payload.timestamp,
        })
    }
}

/// Split a header into (lsn, crc, len)
pub(crate) fn decode_header(header: &[u8]) -> (u64, u32, u32) {
    let mut lsn = [0u8; 8];
    lsn.copy_from_slice(&header[0..8]);
    let mut crc = [0u8; 4];
    crc.copy_from_slice(&header[8..12]);
    let mut len = [0u8; 4];
    len.copy_from_slice(&header[12..16]);
    (
        u64::from_le_bytes(lsn),
        u32::from_le_bytes(crc),
        u32::from_le_bytes(len),
    )
}

fn compute_crc(lsn: u64, len: u32, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&lsn.to_le_bytes());
    hasher.update(&len.to_le_bytes());
    hasher.update(data);
    hasher.finalize()
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(key: &str, value: &str) -> Operation {
        Operation::Put {
            key: key.as_bytes().to_vec(),
            value: value.as_bytes().to_vec(),
        }
    }

    /// Decode a buffer produced by `encode`
    fn decode(bytes: &[u8]) -> Result<WalEntry> {
        let (lsn, crc, len) = decode_header(&bytes[..HEADER_SIZE]);
        assert_eq!(len as usize, bytes.len() - HEADER_SIZE);
        WalEntry::from_parts(lsn, crc, &bytes[HEADER_SIZE..])
    }

    #[test]
    fn test_encode_decode_batch() {
        let ops = vec![put("a", "1"), Operation::Delete { key: b"b".to_vec() }];
        let bytes = WalEntry::encode(7, 1234, &ops).unwrap();

        let entry = decode(&bytes).unwrap();
        assert_eq!(entry.lsn, 7);
        assert_eq!(entry.timestamp, 1234);
        assert_eq!(entry.operations, ops);
    }

    #[test]
    fn test_header_layout() {
        let bytes = WalEntry::encode(42, now_millis(), &[put("k", "v")]).unwrap();
        let (lsn, crc, len) = decode_header(&bytes[..HEADER_SIZE]);

        assert_eq!(&bytes[0..8], &42u64.to_le_bytes());
        assert_eq!(lsn, 42);
        assert_eq!(len as usize, bytes.len() - HEADER_SIZE);
        assert_eq!(crc, compute_crc(42, len, &bytes[HEADER_SIZE..]));
    }

    #[test]
    fn test_flipped_bit_is_corruption() {
        let mut bytes = WalEntry::encode(1, 0, &[put("key", "value")]).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        assert!(matches!(decode(&bytes), Err(Error::WalCorruption(_))));
    }

    #[test]
    fn test_empty_batch() {
        let bytes = WalEntry::encode(3, 0, &[]).unwrap();
        assert!(decode(&bytes).unwrap().operations.is_empty());
    }
}
