//! Bucket change subscriptions
//!
//! Every committed put or delete on a bucket is fanned out to the
//! subscriptions of that bucket over unbounded crossbeam channels. Events are
//! published after the engine commit returns, in commit order per writer.
//! Values travel encoded and are decoded by the receiving `Subscription`, so
//! subscribers of one bucket may read it with different record types.
//!
//! A dropped `Subscription` is removed the next time its bucket publishes.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::Duration;

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use crate::codec::{Codec, ValueCodec};
use crate::error::{Error, Result};
use crate::meta::BucketId;
use crate::record::{inject_key, Record};

/// A committed change, as sent over the channel
#[derive(Debug, Clone)]
pub(crate) enum Change {
    Put { key: Bytes, value: Bytes },
    Delete { key: Bytes },
}

/// A committed change decoded for a subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum Event<R> {
    /// A record was written; its key field holds the key it was written under
    Put(R),
    /// The record with this encoded key was deleted
    Delete(Vec<u8>),
}

/// Subscriber registry of one database
#[derive(Default)]
pub(crate) struct Watchers {
    senders: Mutex<HashMap<BucketId, Vec<Sender<Change>>>>,
}

impl Watchers {
    pub(crate) fn subscribe(&self, bucket: BucketId) -> Receiver<Change> {
        let (tx, rx) = channel::unbounded();
        self.senders.lock().entry(bucket).or_default().push(tx);
        rx
    }

    pub(crate) fn publish(&self, bucket: BucketId, change: Change) {
        let mut senders = self.senders.lock();
        let Some(list) = senders.get_mut(&bucket) else {
            return;
        };
        list.retain(|tx| tx.send(change.clone()).is_ok());
        if list.is_empty() {
            senders.remove(&bucket);
            tracing::trace!("Last subscription of {:?} dropped", bucket);
        }
    }

    pub(crate) fn has_subscribers(&self, bucket: BucketId) -> bool {
        self.senders.lock().contains_key(&bucket)
    }
}

/// Stream of changes to one bucket
pub struct Subscription<R, C: Codec = ValueCodec> {
    receiver: Receiver<Change>,
    codec: C,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record, C: Codec> Subscription<R, C> {
    pub(crate) fn new(receiver: Receiver<Change>, codec: C) -> Self {
        Self {
            receiver,
            codec,
            _record: PhantomData,
        }
    }

    /// Block until the next change
    ///
    /// Returns `Error::Closed` once the database is gone.
    pub fn recv(&self) -> Result<Event<R>> {
        let change = self.receiver.recv().map_err(|_| Error::Closed)?;
        self.decode(change)
    }

    /// Wait up to `timeout` for the next change
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Event<R>>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(change) => self.decode(change).map(Some),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Closed),
        }
    }

    /// Next change if one is already waiting
    pub fn try_recv(&self) -> Result<Option<Event<R>>> {
        match self.receiver.try_recv() {
            Ok(change) => self.decode(change).map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::Closed),
        }
    }

    fn decode(&self, change: Change) -> Result<Event<R>> {
        match change {
            Change::Put { key, value } => {
                let mut record: R = self.codec.unmarshal(&value)?;
                inject_key(&mut record, &key)?;
                Ok(Event::Put(record))
            }
            Change::Delete { key } => Ok(Event::Delete(key.to_vec())),
        }
    }
}
