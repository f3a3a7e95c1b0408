//! Single-slot, latest-wins handoff between the stream and pipeline threads.
//!
//! The producer overwrites the slot; the consumer always takes the newest value
//! and learns how many were dropped in between. A value is moved in and out of
//! the slot whole under the mutex, so the consumer can never see a partially
//! written one.

use crate::error::PipelineError;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::trace;

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
    /// Sequence of the last published value.
    produced: u64,
    /// Sequence of the last received value.
    received: u64,
    /// Highest sequence the consumer finished with.
    processed: u64,
    dropped: u64,
    closed: bool,
}

/// A value taken from the handoff.
#[derive(Debug)]
pub struct Received<T> {
    pub sequence: u64,
    pub value: T,
    /// Values overwritten since the previous receive.
    pub dropped: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandoffStats {
    pub produced: u64,
    pub received: u64,
    pub processed: u64,
    pub dropped: u64,
}

#[derive(Debug)]
pub struct Handoff<T> {
    slot: Mutex<Slot<T>>,
    available: Condvar,
    processed: Condvar,
}

impl<T> Default for Handoff<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Handoff<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                produced: 0,
                received: 0,
                processed: 0,
                dropped: 0,
                closed: false,
            }),
            available: Condvar::new(),
            processed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn put(&self, slot: &mut Slot<T>, value: T) -> u64 {
        if slot.value.replace(value).is_some() {
            slot.dropped += 1;
            trace!(sequence = slot.produced, "Dropped unconsumed value");
        }
        slot.produced += 1;
        self.available.notify_one();
        slot.produced
    }

    /// Store `value`, replacing any value the consumer has not taken yet.
    /// Never blocks on the consumer.
    pub fn publish(&self, value: T) -> Result<u64, PipelineError> {
        let mut slot = self.lock();
        if slot.closed {
            return Err(PipelineError::Closed);
        }
        Ok(self.put(&mut slot, value))
    }

    /// Wait until the consumer has finished everything it received, then store
    /// `value`. Used for lockstep pacing, where no value may be dropped.
    pub fn publish_when_processed(&self, value: T) -> Result<u64, PipelineError> {
        let mut slot = self.lock();
        while !slot.closed && (slot.value.is_some() || slot.processed < slot.received) {
            slot = self.processed.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
        if slot.closed {
            return Err(PipelineError::Closed);
        }
        Ok(self.put(&mut slot, value))
    }

    /// Block until a value is available and take the newest one.
    pub fn recv_latest(&self) -> Result<Received<T>, PipelineError> {
        let mut slot = self.lock();
        loop {
            if slot.closed {
                return Err(PipelineError::Closed);
            }
            if let Some(value) = slot.value.take() {
                let dropped = slot.produced - slot.received - 1;
                slot.received = slot.produced;
                // an empty slot may unblock a lockstep producer once processed
                self.processed.notify_all();
                return Ok(Received {
                    sequence: slot.produced,
                    value,
                    dropped,
                });
            }
            slot = self.available.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Take the newest value without blocking.
    pub fn try_recv_latest(&self) -> Option<Received<T>> {
        let mut slot = self.lock();
        if slot.closed {
            return None;
        }
        let value = slot.value.take()?;
        let dropped = slot.produced - slot.received - 1;
        slot.received = slot.produced;
        self.processed.notify_all();
        Some(Received {
            sequence: slot.produced,
            value,
            dropped,
        })
    }

    /// Consumer is done with everything up to `sequence`.
    pub fn mark_processed(&self, sequence: u64) {
        let mut slot = self.lock();
        slot.processed = slot.processed.max(sequence);
        self.processed.notify_all();
    }

    /// Wake every waiter; all later calls fail with [`PipelineError::Closed`].
    pub fn close(&self) {
        let mut slot = self.lock();
        slot.closed = true;
        slot.value = None;
        self.available.notify_all();
        self.processed.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn stats(&self) -> HandoffStats {
        let slot = self.lock();
        HandoffStats {
            produced: slot.produced,
            received: slot.received,
            processed: slot.processed,
            dropped: slot.dropped,
        }
    }
}
