//! Buckets
//!
//! A bucket is a named collection of records. All of its records share a
//! 2-byte namespace prefix in the engine's key space:
//!
//! ```text
//! internal key = bucket id (2B, big-endian) ++ encoded record key
//! ```
//!
//! Records without a key (no key field, or an empty one) are stored under a
//! freshly minted `Id`, in the form the record's key type can read back
//! (text for `String` keys, raw bytes otherwise).

use bytes::Bytes;

use crate::codec::{Codec, ValueCodec};
use crate::db::Db;
use crate::error::{Error, Result};
use crate::id::Id;
use crate::iter::Iter;
use crate::key::{DecodeKey, EncodeKey};
use crate::meta::{BucketId, BUCKET_ID_SIZE};
use crate::record::{extract_key, inject_key, Record};
use crate::watch::{Change, Subscription};

/// A collection of records in a database
///
/// Cheap to create; holds no state beyond its namespace. A bucket that could
/// not be resolved returns the resolution error from every operation.
pub struct Bucket<'db, C: Codec = ValueCodec> {
    db: &'db Db<C>,
    id: std::result::Result<BucketId, Error>,
}

impl<'db, C: Codec> Bucket<'db, C> {
    pub(crate) fn new(db: &'db Db<C>, id: BucketId) -> Self {
        Self { db, id: Ok(id) }
    }

    pub(crate) fn failed(db: &'db Db<C>, err: Error) -> Self {
        Self { db, id: Err(err) }
    }

    /// Namespace of this bucket, or the error it was created with
    pub fn id(&self) -> Result<BucketId> {
        self.id.clone()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store a record, replacing any record with the same key
    ///
    /// Returns the encoded key the record was stored under. When the record
    /// has no key a new `Id` is minted; `record` itself is not modified (see
    /// `insert`).
    pub fn put<R: Record>(&self, record: &R) -> Result<Vec<u8>> {
        let id = self.writable()?;
        let mut key = extract_key(record)?;
        if key.is_empty() {
            key = mint_key::<R>();
        }
        let value = self.db.codec().marshal(record)?;
        self.write(id, key, value)
    }

    /// Like `put`, but a minted key is also written into the record
    ///
    /// The key field must be able to hold an `Id` (`Id`, `String`, `Vec<u8>`,
    /// `u64`, ...); otherwise nothing is stored and the key error is returned.
    pub fn insert<R: Record>(&self, record: &mut R) -> Result<Vec<u8>> {
        let id = self.writable()?;
        let mut key = extract_key(record)?;
        if key.is_empty() {
            key = mint_key::<R>();
            inject_key(record, &key)?;
        }
        let value = self.db.codec().marshal(&*record)?;
        self.write(id, key, value)
    }

    /// Store raw bytes under `key`, bypassing the value codec
    ///
    /// An empty key mints a new `Id` (raw bytes). Returns the encoded key used.
    pub fn put_bytes<K: EncodeKey + ?Sized>(&self, key: &K, value: &[u8]) -> Result<Vec<u8>> {
        let id = self.writable()?;
        let mut key = key.to_key_bytes()?;
        if key.is_empty() {
            key = Id::new().as_bytes().to_vec();
        }
        self.write(id, key, value.to_vec())
    }

    /// Remove the record stored under `key`
    ///
    /// Deleting a missing record is not an error.
    pub fn delete<K: EncodeKey + ?Sized>(&self, key: &K) -> Result<()> {
        let id = self.writable()?;
        let key = key.to_key_bytes()?;
        let internal = internal_key(id, &key);

        self.db.engine().update(|txn| {
            txn.delete(internal);
            Ok(())
        })?;
        tracing::trace!("Deleted {:?} from {:?}", Bytes::copy_from_slice(&key), id);

        self.db.watchers().publish(id, Change::Delete { key: key.into() });
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read the record stored under `key` into `out`
    ///
    /// The key field of `out` is set from `key` before the read, so it holds
    /// the key even when the stored value left it empty. Returns
    /// `Error::NotFound` when there is no such record.
    pub fn get<K: EncodeKey + ?Sized, R: Record>(&self, key: &K, out: &mut R) -> Result<()> {
        let id = self.id()?;
        let key = key.to_key_bytes()?;
        inject_key(out, &key)?;

        let value = self
            .db
            .engine()
            .snapshot()
            .get(&internal_key(id, &key))?
            .ok_or(Error::NotFound)?;

        self.db.codec().unmarshal_into(&value, out)?;
        inject_key(out, &key)
    }

    /// Read raw bytes stored under `key` into `buf`, reusing its allocation
    pub fn get_bytes<K: EncodeKey + ?Sized>(&self, key: &K, mut buf: Vec<u8>) -> Result<Vec<u8>> {
        let id = self.id()?;
        let key = key.to_key_bytes()?;
        let value = self
            .db
            .engine()
            .snapshot()
            .get(&internal_key(id, &key))?
            .ok_or(Error::NotFound)?;

        buf.clear();
        buf.extend_from_slice(&value);
        Ok(buf)
    }

    /// Iterate over every record, in key order
    pub fn iter<R: Record>(&self) -> Iter<R, C> {
        match self.id() {
            Ok(id) => {
                let snapshot = self.db.engine().snapshot();
                Iter::new(&snapshot, id.as_bytes().to_vec(), self.db.codec().clone())
            }
            Err(e) => Iter::failed(e),
        }
    }

    /// Iterate over the records whose encoded key starts with `prefix`
    pub fn prefix<R: Record, K: EncodeKey + ?Sized>(&self, prefix: &K) -> Iter<R, C> {
        let prefix = self
            .id()
            .and_then(|id| prefix.to_key_bytes().map(|key| internal_key(id, &key)));
        let prefix = match prefix {
            Ok(prefix) => prefix,
            Err(e) => return Iter::failed(e),
        };
        Iter::new(&self.db.engine().snapshot(), prefix, self.db.codec().clone())
    }

    /// Receive every change committed to this bucket from now on
    pub fn subscribe<R: Record>(&self) -> Result<Subscription<R, C>> {
        let id = self.id()?;
        let receiver = self.db.watchers().subscribe(id);
        Ok(Subscription::new(receiver, self.db.codec().clone()))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Bucket id, if writes are allowed
    fn writable(&self) -> Result<BucketId> {
        if self.db.is_read_only() {
            return Err(Error::ReadOnly);
        }
        self.id()
    }

    fn write(&self, id: BucketId, key: Vec<u8>, value: Vec<u8>) -> Result<Vec<u8>> {
        let internal = internal_key(id, &key);
        let published = self
            .db
            .watchers()
            .has_subscribers(id)
            .then(|| Bytes::copy_from_slice(&value));

        self.db.engine().update(|txn| {
            txn.set(internal, value);
            Ok(())
        })?;
        tracing::trace!("Put {:?} into {:?}", Bytes::copy_from_slice(&key), id);

        if let Some(value) = published {
            let change = Change::Put {
                key: Bytes::copy_from_slice(&key),
                value,
            };
            self.db.watchers().publish(id, change);
        }
        Ok(key)
    }
}

/// Fresh key for a record of type `R` written without one
fn mint_key<R: Record>() -> Vec<u8> {
    <R::Key as DecodeKey>::mint_key(&Id::new())
}

fn internal_key(id: BucketId, key: &[u8]) -> Vec<u8> {
    let mut internal = Vec::with_capacity(BUCKET_ID_SIZE + key.len());
    internal.extend_from_slice(id.as_bytes());
    internal.extend_from_slice(key);
    internal
}
