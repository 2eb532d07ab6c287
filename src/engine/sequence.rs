//! Durable batched sequences
//!
//! A `Sequence` leases `bandwidth` numbers at a time from a counter stored
//! under one key. The first lease is taken by the first `next`, and numbers
//! are handed out from memory until the lease runs out. `release` writes the
//! first unused number back, and writes nothing when no lease is outstanding.
//! If the process dies with a lease outstanding, the unused part of it is
//! skipped forever: numbers are unique and increasing, not dense.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};

use super::Engine;

struct LeaseState {
    /// Next number to hand out
    next: u64,
    /// End (exclusive) of the current lease
    leased: u64,
}

/// Monotonic counter backed by the engine
pub struct Sequence {
    engine: Arc<Engine>,
    key: Vec<u8>,
    bandwidth: u64,
    state: Mutex<LeaseState>,
}

impl Sequence {
    pub(crate) fn new(engine: Arc<Engine>, key: Vec<u8>, bandwidth: u64) -> Result<Self> {
        if bandwidth == 0 {
            return Err(Error::Storage("sequence bandwidth must be positive".to_string()));
        }
        Ok(Self {
            engine,
            key,
            bandwidth,
            state: Mutex::new(LeaseState { next: 0, leased: 0 }),
        })
    }

    /// Next number of the sequence
    pub fn next(&self) -> Result<u64> {
        let mut state = self.state.lock();
        if state.next >= state.leased {
            self.lease(&mut state)?;
        }
        let value = state.next;
        state.next += 1;
        Ok(value)
    }

    /// Return the unused part of the lease to the stored counter
    pub fn release(&self) -> Result<()> {
        let mut state = self.state.lock();
        let next = state.next;
        // Nothing leased, or the lease is used up and already stored
        if next == state.leased {
            return Ok(());
        }
        self.engine.update(|txn| {
            txn.set(self.key.as_slice(), next.to_be_bytes());
            Ok(())
        })?;
        state.leased = next;
        Ok(())
    }

    fn lease(&self, state: &mut LeaseState) -> Result<()> {
        let (start, end) = self.engine.update(|txn| {
            let start = match txn.get(&self.key)? {
                Some(stored) => decode_counter(&stored)?,
                None => 0,
            };
            let end = start.checked_add(self.bandwidth).ok_or_else(|| {
                Error::Storage("sequence exhausted".to_string())
            })?;
            txn.set(self.key.as_slice(), end.to_be_bytes());
            Ok((start, end))
        })?;
        tracing::debug!("Leased sequence numbers {}..{}", start, end);
        state.next = start;
        state.leased = end;
        Ok(())
    }
}

fn decode_counter(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Storage(format!("sequence counter has {} bytes, expected 8", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}
