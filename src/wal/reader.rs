//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::error::{Error, Result};

use super::entry::decode_header;
use super::{WalEntry, HEADER_SIZE, MAX_ENTRY_SIZE};

/// Reads entries from the WAL file
///
/// A short read at the end of the file (torn header or torn data) ends the
/// stream with `Ok(None)` and marks the reader as torn; a checksum mismatch is
/// reported as `WalCorruption`.
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset just past the last entry read successfully
    position: u64,
    torn: bool,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            torn: false,
        })
    }

    /// Read the next entry from the WAL
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        if self.torn {
            return Ok(None);
        }

        let mut header = [0u8; HEADER_SIZE];
        match read_full(&mut self.reader, &mut header)? {
            0 => return Ok(None),
            n if n < HEADER_SIZE => {
                self.torn = true;
                return Ok(None);
            }
            _ => {}
        }

        let (lsn, crc, len) = decode_header(&header);
        if len > MAX_ENTRY_SIZE {
            return Err(Error::WalCorruption(format!(
                "Entry length {} at lsn {} exceeds maximum",
                len, lsn
            )));
        }

        let mut data = vec![0u8; len as usize];
        if read_full(&mut self.reader, &mut data)? < data.len() {
            self.torn = true;
            return Ok(None);
        }

        let entry = WalEntry::from_parts(lsn, crc, &data)?;
        self.position += (HEADER_SIZE + data.len()) as u64;
        Ok(Some(entry))
    }

    /// Offset just past the last valid entry
    pub fn position(&self) -> u64 {
        self.position
    }
}

/// Like `read_exact`, but reports how much was read instead of failing on EOF
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
