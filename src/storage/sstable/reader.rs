//! SSTable Reader
//!
//! Opens SSTable files and provides O(log n) key lookups and ordered range
//! stepping via an in-memory index. The file handle sits behind a mutex so one
//! reader can be shared (`Arc`) between the engine and any number of
//! snapshots.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::Path;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::memtable::MemTableEntry;

use super::{le_u32, le_u64, FOOTER_SIZE, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Reader for SSTable files with in-memory index for O(log n) lookups
pub struct SSTableReader {
    /// File handle for reading entries
    file: Mutex<BufReader<File>>,
    /// In-memory index: key → file offset
    index: BTreeMap<Vec<u8>, u64>,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Validates header and data checksum, then loads the entire index into
    /// memory.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(Error::Storage(format!(
                "SSTable {} is too short ({} bytes)",
                path.display(),
                file_size
            )));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        if &header[0..4] != MAGIC {
            return Err(Error::Storage(format!(
                "Invalid SSTable magic in {}: got {:?}",
                path.display(),
                &header[0..4]
            )));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(Error::Storage(format!(
                "Unsupported SSTable version: {}",
                version
            )));
        }
        let entry_count = le_u64(&header, 6);

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;
        let index_offset = le_u64(&footer, 0);
        let data_crc = le_u32(&footer, 8);
        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(Error::Storage(format!(
                "SSTable {} has invalid index offset {}",
                path.display(),
                index_offset
            )));
        }

        // Verify the data block checksum
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = index_offset - HEADER_SIZE;
        let mut chunk = vec![0u8; 64 * 1024];
        while remaining > 0 {
            let n = remaining.min(chunk.len() as u64) as usize;
            file.read_exact(&mut chunk[..n])?;
            hasher.update(&chunk[..n]);
            remaining -= n as u64;
        }
        if hasher.finalize() != data_crc {
            return Err(Error::Storage(format!(
                "SSTable {} failed data checksum",
                path.display()
            )));
        }

        // Index block: [key_len(4)][offset(8)][key]
        let index_block_size = file_size - FOOTER_SIZE - index_offset;
        let mut index_data = vec![0u8; index_block_size as usize];
        file.read_exact(&mut index_data)?;

        let mut index = BTreeMap::new();
        let mut pos = 0;
        while pos + 12 <= index_data.len() {
            let key_len = le_u32(&index_data, pos) as usize;
            let offset = le_u64(&index_data, pos + 4);
            pos += 12;
            if pos + key_len > index_data.len() {
                return Err(Error::Storage(format!(
                    "SSTable {} has a truncated index",
                    path.display()
                )));
            }
            index.insert(index_data[pos..pos + key_len].to_vec(), offset);
            pos += key_len;
        }
        if index.len() as u64 != entry_count {
            return Err(Error::Storage(format!(
                "SSTable {} indexes {} entries, header says {}",
                path.display(),
                index.len(),
                entry_count
            )));
        }

        Ok(Self {
            file: Mutex::new(BufReader::new(file)),
            index,
        })
    }

    /// Look up a key
    ///
    /// Returns:
    /// - `Ok(Some(Value))`: key found with value
    /// - `Ok(Some(Tombstone))`: key found but deleted
    /// - `Ok(None)`: key not in this SSTable
    pub fn get(&self, key: &[u8]) -> Result<Option<MemTableEntry>> {
        match self.index.get(key) {
            Some(&offset) => self.read_entry_at(offset).map(Some),
            None => Ok(None),
        }
    }

    /// First entry with a key after `from`
    pub fn entry_after(&self, from: Bound<&[u8]>) -> Result<Option<(Vec<u8>, MemTableEntry)>> {
        let next = self
            .index
            .range::<[u8], _>((from, Bound::Unbounded))
            .next()
            .map(|(key, &offset)| (key.clone(), offset));
        match next {
            Some((key, offset)) => Ok(Some((key, self.read_entry_at(offset)?))),
            None => Ok(None),
        }
    }

    fn read_entry_at(&self, offset: u64) -> Result<MemTableEntry> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; 8];
        file.read_exact(&mut header)?;
        let key_len = le_u32(&header, 0);
        let val_len = le_u32(&header, 4);

        // Skip the key (the index already told us which one it is)
        file.seek_relative(key_len as i64)?;

        if val_len == TOMBSTONE_MARKER {
            return Ok(MemTableEntry::Tombstone);
        }
        let mut value = vec![0u8; val_len as usize];
        file.read_exact(&mut value)?;
        Ok(MemTableEntry::Value(Bytes::from(value)))
    }

    /// Get the minimum key in this SSTable (for range filtering)
    pub fn min_key(&self) -> Option<&[u8]> {
        self.index.keys().next().map(|k| k.as_slice())
    }

    /// Get the maximum key in this SSTable (for range filtering)
    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.keys().next_back().map(|k| k.as_slice())
    }

    /// Quick check if a key might be in this SSTable (range check)
    /// Returns false only if the key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => key >= min && key <= max,
            _ => false,
        }
    }
}
