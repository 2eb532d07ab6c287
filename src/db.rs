//! Database handle
//!
//! `Db` owns the engine, the metadata document, the bucket id allocator and
//! the value codec, and hands out `Bucket`s.
//!
//! ## Bucket Resolution
//! ```text
//! bucket(name)
//!   │
//!   ├─ meta.read(): known? ──────────────► Bucket(id)
//!   │
//!   ├─ read-only? ───────────────────────► Bucket(Err(NotFound))
//!   │
//!   ├─ counter.next() + offset            (no metadata lock held)
//!   │
//!   └─ meta.write(): known now? ─────────► Bucket(id), number forfeited
//!        │
//!        ├─ allocation failed? ───────────► Bucket(Err(..))
//!        ├─ commit copy of meta + bucket  (in-memory meta untouched on failure)
//!        └─ swap copy in ────────────────► Bucket(id)
//! ```

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bucket::Bucket;
use crate::codec::{Codec, ValueCodec};
use crate::config::Config;
use crate::engine::{Engine, Sequence};
use crate::error::{Error, Result};
use crate::meta::{BucketId, Meta, BUCKET_ID_SEQUENCE};
use crate::watch::Watchers;

/// Bucket ids leased from the durable counter at a time
const BUCKET_ID_LEASE: u64 = 1000;

/// An open database
///
/// `C` is the value codec shared by every bucket. `Db::open` uses the
/// built-in codec named by `Config::format`; `Db::open_with_codec` takes any
/// other.
pub struct Db<C: Codec = ValueCodec> {
    engine: Arc<Engine>,

    /// In-memory copy of the metadata document; replaced only after the new
    /// version has been committed
    meta: RwLock<Meta>,

    /// Bucket id allocator; `None` when read-only
    bucket_ids: Option<Sequence>,

    codec: C,

    read_only: bool,

    watchers: Watchers,
}

impl Db {
    /// Open or create a database with the codec selected by `config.format`
    pub fn open(config: Config) -> Result<Db> {
        let codec = ValueCodec::from(config.format);
        Db::open_with_codec(config, codec)
    }

    /// Open with default config at `path`
    pub fn open_path(path: impl AsRef<Path>) -> Result<Db> {
        Self::open(Config::builder().data_dir(path.as_ref()).build())
    }
}

impl<C: Codec> Db<C> {
    /// Open or create a database that stores values with `codec`
    ///
    /// On startup:
    /// 1. Open the engine (replays the WAL)
    /// 2. Load the metadata document, or write an empty one on first open
    ///
    /// Bucket ids are leased on the first bucket creation, so opening and
    /// closing an existing database writes nothing. `config.format` is
    /// ignored.
    ///
    /// A read-only open never creates anything: a missing directory is
    /// `Error::NotFound` and a directory without a database is
    /// `Error::Uninitialized`.
    pub fn open_with_codec(config: Config, codec: C) -> Result<Db<C>> {
        let engine = Arc::new(Engine::open(&config)?);
        let read_only = config.read_only;

        let meta = match Meta::load(&engine.snapshot())? {
            Some(meta) => meta,
            None if read_only => {
                return Err(Error::Uninitialized(config.data_dir.clone()));
            }
            None => {
                let meta = Meta::default();
                engine.update(|txn| meta.store(txn))?;
                tracing::info!("Initialized database at {}", config.data_dir.display());
                meta
            }
        };

        let bucket_ids = if read_only {
            None
        } else {
            Some(engine.sequence(&BUCKET_ID_SEQUENCE, BUCKET_ID_LEASE)?)
        };

        tracing::info!(
            "Opened database at {} ({} buckets, read_only={}, codec={})",
            config.data_dir.display(),
            meta.buckets.len(),
            read_only,
            std::any::type_name::<C>()
        );

        Ok(Db {
            engine,
            meta: RwLock::new(meta),
            bucket_ids,
            codec,
            read_only,
            watchers: Watchers::default(),
        })
    }

    /// Get the bucket called `name`, creating it if needed
    ///
    /// Errors are latched in the returned bucket and reported by each of its
    /// operations.
    pub fn bucket(&self, name: &str) -> Bucket<'_, C> {
        match self.resolve_or_create(name) {
            Ok(id) => Bucket::new(self, id),
            Err(e) => {
                tracing::debug!("Bucket {:?} unavailable: {}", name, e);
                Bucket::failed(self, e)
            }
        }
    }

    /// Names of all buckets, in no particular order
    pub fn buckets(&self) -> Vec<String> {
        self.meta.read().buckets.keys().cloned().collect()
    }

    /// The underlying engine
    ///
    /// Writing to it directly can corrupt bucket data and metadata.
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Return unused bucket ids and close the engine
    pub fn close(self) -> Result<()> {
        if let Some(bucket_ids) = &self.bucket_ids {
            bucket_ids.release()?;
        }
        self.engine.close()?;
        tracing::info!("Closed database at {}", self.engine.data_dir().display());
        Ok(())
    }

    // =========================================================================
    // Crate-internal
    // =========================================================================

    pub(crate) fn codec(&self) -> &C {
        &self.codec
    }

    pub(crate) fn watchers(&self) -> &Watchers {
        &self.watchers
    }

    fn resolve_or_create(&self, name: &str) -> Result<BucketId> {
        if let Some(id) = self.meta.read().bucket(name) {
            return Ok(id);
        }
        let Some(bucket_ids) = self.bucket_ids.as_ref() else {
            return Err(Error::NotFound);
        };

        // A lease may hit the engine; readers of meta must not wait on it
        let allocated = bucket_ids.next().and_then(BucketId::from_counter);

        let mut meta = self.meta.write();
        // Someone may have created it while no lock was held
        if let Some(id) = meta.bucket(name) {
            return Ok(id);
        }

        let id = allocated?;
        let next = meta.with_bucket(name, id);
        self.engine.update(|txn| next.store(txn))?;
        *meta = next;

        tracing::debug!("Created bucket {:?} with {:?}", name, id);
        Ok(id)
    }
}
