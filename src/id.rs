//! Generated record keys
//!
//! `Id` is the default key type for records and the key minted for records
//! written without one. An id is 8 bytes laid out so that ids sort roughly by
//! creation time:
//!
//! ```text
//! ┌──────────────────────────────┬───────────┬──────────────┐
//! │ time since 2014-09-01 (39b)  │ seq (8b)  │ random (16b) │
//! │ in 10ms units                │           │ per process  │
//! └──────────────────────────────┴───────────┴──────────────┘
//! ```
//!
//! The text form is unpadded base64url (11 characters). The all-zero id is
//! "nil": it encodes to an empty key and an empty string, and means "no key
//! yet".

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::key::{DecodeKey, EncodeKey};

/// Size of an id in bytes
pub const ID_SIZE: usize = 8;

/// 8-byte unique identifier
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id([u8; ID_SIZE]);

impl Id {
    /// The empty id
    pub const NIL: Id = Id([0; ID_SIZE]);

    /// Generate a new unique id
    pub fn new() -> Self {
        let value = generator().lock().next_id();
        Id(value.to_be_bytes())
    }

    pub fn from_bytes(bytes: [u8; ID_SIZE]) -> Self {
        Id(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }

    /// Parse the text form produced by `Display`
    pub fn parse(text: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(text)
            .map_err(|e| Error::InvalidId(e.to_string()))?;
        let raw: [u8; ID_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            Error::InvalidId(format!("input must be exactly {} bytes long", ID_SIZE))
        })?;
        Ok(Id(raw))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            return Ok(());
        }
        f.write_str(&URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self)
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Id::parse(s)
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text.is_empty() {
            return Ok(Id::NIL);
        }
        Id::parse(&text).map_err(serde::de::Error::custom)
    }
}

impl EncodeKey for Id {
    fn encode_key(&self, out: &mut Vec<u8>) -> Result<()> {
        if !self.is_nil() {
            out.extend_from_slice(&self.0);
        }
        Ok(())
    }
}

impl DecodeKey for Id {
    fn decode_key(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            *self = Id::NIL;
            return Ok(());
        }
        self.0 = bytes.try_into().map_err(|_| {
            Error::key_type::<Id>(format!("expected {} bytes, found {}", ID_SIZE, bytes.len()))
        })?;
        Ok(())
    }
}

// =============================================================================
// Generator
// =============================================================================

/// 2014-09-01T00:00:00Z in Unix milliseconds
const EPOCH_MILLIS: u64 = 1_409_529_600_000;
const TIME_UNIT_MILLIS: u64 = 10;
const TIME_BITS: u32 = 39;
const SEQUENCE_BITS: u32 = 8;
const MACHINE_BITS: u32 = 16;

struct IdGenerator {
    /// Time units of the last id
    elapsed: u64,
    sequence: u64,
    /// Random per-process value filling the low bits
    machine: u64,
}

impl IdGenerator {
    fn new() -> Self {
        Self {
            elapsed: 0,
            sequence: 0,
            machine: u64::from(rand::random::<u16>()),
        }
    }

    fn next_id(&mut self) -> u64 {
        let sequence_mask = (1 << SEQUENCE_BITS) - 1;
        let current = elapsed_units();

        if self.elapsed < current {
            self.elapsed = current;
            self.sequence = 0;
        } else {
            self.sequence = (self.sequence + 1) & sequence_mask;
            if self.sequence == 0 {
                // Sequence wrapped within one time unit: borrow the next
                // unit and wait for the clock to reach it.
                self.elapsed += 1;
                let ahead = self.elapsed.saturating_sub(current) * TIME_UNIT_MILLIS;
                thread::sleep(Duration::from_millis(ahead));
            }
        }

        let time = self.elapsed & ((1 << TIME_BITS) - 1);
        (time << (SEQUENCE_BITS + MACHINE_BITS)) | (self.sequence << MACHINE_BITS) | self.machine
    }
}

fn elapsed_units() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    now.saturating_sub(EPOCH_MILLIS) / TIME_UNIT_MILLIS
}

fn generator() -> &'static Mutex<IdGenerator> {
    static GENERATOR: OnceLock<Mutex<IdGenerator>> = OnceLock::new();
    GENERATOR.get_or_init(|| Mutex::new(IdGenerator::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_new_ids_are_unique_and_not_nil() {
        let mut seen = HashSet::new();
        for _ in 0..2_000 {
            let id = Id::new();
            assert!(!id.is_nil());
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn test_text_form_roundtrip() {
        let id = Id::new();
        let text = id.to_string();
        assert_eq!(text.len(), 11);
        assert_eq!(Id::parse(&text).unwrap(), id);
        assert_eq!(text.parse::<Id>().unwrap(), id);
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let short = URL_SAFE_NO_PAD.encode([1u8, 2, 3]);
        assert!(matches!(Id::parse(&short), Err(Error::InvalidId(_))));
        assert!(matches!(Id::parse("not base64!"), Err(Error::InvalidId(_))));
    }

    #[test]
    fn test_nil_encodes_empty() {
        assert_eq!(Id::NIL.to_string(), "");
        assert!(Id::NIL.to_key_bytes().unwrap().is_empty());
        assert_eq!(serde_json::to_string(&Id::NIL).unwrap(), "\"\"");

        let back: Id = serde_json::from_str("\"\"").unwrap();
        assert!(back.is_nil());
    }

    #[test]
    fn test_json_uses_text_form() {
        let id = Id::from_bytes([1, 2, 3, 4, 5, 6, 7, 8]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        assert_eq!(serde_json::from_str::<Id>(&json).unwrap(), id);
    }
}
