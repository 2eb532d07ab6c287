//! Record iteration
//!
//! An `Iter` walks one bucket (optionally narrowed to a key prefix) over the
//! snapshot taken when it was created: records put afterwards are not seen,
//! and records deleted afterwards still are.
//!
//! ## States
//! ```text
//! Created ──next──► Positioned ──next──► ... ──► Exhausted
//!    │                  │                           │
//!    └──────────────────┴──── close / error ────────┴──► Closed
//! ```
//! Leaving the prefix, `close`, a decode error or dropping the iterator
//! releases the snapshot.

use std::marker::PhantomData;

use bytes::Bytes;

use crate::codec::{Codec, ValueCodec};
use crate::engine::{Snapshot, SnapshotIter};
use crate::error::{Error, Result};
use crate::meta::BUCKET_ID_SIZE;
use crate::record::{inject_key, Record};

/// Cursor over the records of a bucket
pub struct Iter<R, C: Codec = ValueCodec> {
    /// `None` once exhausted, closed or failed
    cursor: Option<SnapshotIter>,
    /// Bucket id plus the optional key prefix
    prefix: Vec<u8>,
    codec: Option<C>,
    advanced: bool,
    err: Option<Error>,
    /// Whether `Iterator::next` already yielded `err`
    err_yielded: bool,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record, C: Codec> Iter<R, C> {
    pub(crate) fn new(snapshot: &Snapshot, prefix: Vec<u8>, codec: C) -> Self {
        let mut cursor = snapshot.iter();
        let mut iter = Self {
            cursor: None,
            prefix,
            codec: Some(codec),
            advanced: false,
            err: None,
            err_yielded: false,
            _record: PhantomData,
        };
        match cursor.seek(&iter.prefix) {
            Ok(()) => iter.cursor = Some(cursor),
            Err(e) => iter.err = Some(e),
        }
        iter
    }

    pub(crate) fn failed(err: Error) -> Self {
        Self {
            cursor: None,
            prefix: Vec::new(),
            codec: None,
            advanced: false,
            err: Some(err),
            err_yielded: false,
            _record: PhantomData,
        }
    }

    /// Decode the next record into `out`
    ///
    /// Returns `false` when there are no more records or an error occurred;
    /// check `err` to tell them apart.
    pub fn next_into(&mut self, out: &mut R) -> bool {
        match self.step() {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => return self.fail(e),
        }
        match self.decode_into(out) {
            Ok(()) => true,
            Err(e) => self.fail(e),
        }
    }

    /// The error that stopped iteration, if any
    ///
    /// Still available after the iterator closed itself.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Release the snapshot; further calls to `next_into` return `false`
    pub fn close(&mut self) {
        self.cursor = None;
    }

    /// Move to the next entry inside the prefix
    fn step(&mut self) -> Result<bool> {
        if self.err.is_some() {
            return Ok(false);
        }
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(false);
        };
        if self.advanced {
            cursor.next()?;
        }
        self.advanced = true;

        if !cursor.valid_for_prefix(&self.prefix) {
            self.close();
            return Ok(false);
        }
        Ok(true)
    }

    /// Record key (namespace stripped) and value at the cursor
    fn current(&self) -> Result<(&[u8], &Bytes)> {
        let cursor = self.cursor.as_ref().ok_or_else(not_positioned)?;
        match (cursor.key(), cursor.value()) {
            (Some(key), Some(value)) if key.len() >= BUCKET_ID_SIZE => {
                Ok((&key[BUCKET_ID_SIZE..], value))
            }
            _ => Err(not_positioned()),
        }
    }

    fn decode_into(&self, out: &mut R) -> Result<()> {
        let codec = self.codec.as_ref().ok_or_else(not_positioned)?;
        let (key, value) = self.current()?;
        codec.unmarshal_into(value, out)?;
        inject_key(out, key)
    }

    fn decode(&self) -> Result<R> {
        let codec = self.codec.as_ref().ok_or_else(not_positioned)?;
        let (key, value) = self.current()?;
        let mut record: R = codec.unmarshal(value)?;
        inject_key(&mut record, key)?;
        Ok(record)
    }

    fn fail(&mut self, err: Error) -> bool {
        tracing::debug!("Iteration stopped: {}", err);
        self.err = Some(err);
        self.close();
        false
    }
}

impl<R: Record, C: Codec> Iterator for Iter<R, C> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Result<R>> {
        let step = self
            .step()
            .and_then(|more| if more { self.decode().map(Some) } else { Ok(None) });
        match step {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => self.take_err(),
            Err(e) => {
                self.fail(e);
                self.take_err()
            }
        }
    }
}

fn not_positioned() -> Error {
    Error::Storage("iterator is not positioned on a record".to_string())
}

impl<R, C: Codec> Iter<R, C> {
    /// The latched error, yielded once through `Iterator::next`
    fn take_err(&mut self) -> Option<Result<R>> {
        if self.err_yielded {
            return None;
        }
        let err = self.err.clone()?;
        self.err_yielded = true;
        Some(Err(err))
    }
}
