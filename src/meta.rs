//! Database metadata
//!
//! The metadata document maps bucket names to their namespace ids. It lives
//! under a reserved key and is rewritten whole whenever a bucket is created.
//!
//! ## Key Space Layout
//! ```text
//! [0x00, 0x00]            bucket id counter (u64, big-endian)
//! [0x00, 0x01]            metadata document (JSON)
//! [0x00..0x07, ..]        reserved
//! [bucket id (2B)] ++ key records
//! ```
//!
//! Bucket ids start at `8 * 256` so the first byte of a record key is never in
//! the reserved range.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::{Snapshot, Transaction};
use crate::error::{Error, Result};

/// Format version of the metadata document and key layout
pub const VERSION: u32 = 1;

/// Width of a bucket id in bytes
pub const BUCKET_ID_SIZE: usize = 2;

/// Key of the bucket id counter
pub const BUCKET_ID_SEQUENCE: [u8; 2] = [0x00, 0x00];

/// Key of the metadata document
pub const META_KEY: [u8; 2] = [0x00, 0x01];

/// Bucket ids below this value are reserved
pub const BUCKET_ID_OFFSET: u64 = 8 * 256;

/// Maximum number of buckets in one database
pub const MAX_BUCKETS: u32 = u16::MAX as u32 - BUCKET_ID_OFFSET as u32;

/// Namespace of one bucket: the first two bytes of its record keys
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketId([u8; BUCKET_ID_SIZE]);

impl BucketId {
    /// Id for the `counter`-th bucket ever created
    pub fn from_counter(counter: u64) -> Result<Self> {
        if counter >= u64::from(MAX_BUCKETS) {
            return Err(Error::CapacityExceeded { max: MAX_BUCKETS });
        }
        let id = (counter + BUCKET_ID_OFFSET) as u16;
        Ok(BucketId(id.to_be_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; BUCKET_ID_SIZE] {
        &self.0
    }

    pub fn value(&self) -> u16 {
        u16::from_be_bytes(self.0)
    }
}

impl fmt::Debug for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketId({:#06x})", self.value())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketMeta {
    #[serde(rename = "Id")]
    pub id: BucketId,
}

/// The metadata document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(rename = "Version")]
    pub version: u32,
    #[serde(rename = "Buckets")]
    pub buckets: HashMap<String, BucketMeta>,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            version: VERSION,
            buckets: HashMap::new(),
        }
    }
}

impl Meta {
    /// Read the document, `None` if the database was never initialized
    pub fn load(snapshot: &Snapshot) -> Result<Option<Meta>> {
        let Some(raw) = snapshot.get(&META_KEY)? else {
            return Ok(None);
        };
        let meta: Meta = serde_json::from_slice(&raw)?;
        if meta.version != VERSION {
            return Err(Error::VersionMismatch {
                found: meta.version,
                expected: VERSION,
            });
        }
        Ok(Some(meta))
    }

    /// Stage the document in `txn`
    pub fn store(&self, txn: &mut Transaction<'_>) -> Result<()> {
        let raw = serde_json::to_vec(self)?;
        txn.set(META_KEY.as_slice(), raw);
        Ok(())
    }

    pub fn bucket(&self, name: &str) -> Option<BucketId> {
        self.buckets.get(name).map(|b| b.id)
    }

    /// Copy of the document with one more bucket
    pub fn with_bucket(&self, name: &str, id: BucketId) -> Meta {
        let mut next = self.clone();
        next.buckets.insert(name.to_string(), BucketMeta { id });
        next
    }
}
