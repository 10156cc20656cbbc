//! DeliveryQueue - bounded per-destination FIFO with explicit overflow policy
//!
//! Backed by an `async_channel` pair. Producers never wait longer than the
//! configured block timeout; the single consumer sees the end of the stream
//! once the queue is closed and empty.

use std::sync::Arc;
use std::time::Duration;

use async_channel::{Receiver, Sender, TrySendError};
use contracts::{Event, OverflowPolicy};

/// Result of a single enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Event accepted
    Enqueued,
    /// Event accepted after evicting the oldest queued event
    EvictedOldest,
    /// Queue full, new event dropped
    Rejected,
    /// Queue stayed full for the whole block timeout, new event dropped
    TimedOut,
    /// Queue no longer accepts events (draining)
    Closed,
}

impl EnqueueOutcome {
    /// Whether the new event made it into the queue
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Enqueued | Self::EvictedOldest)
    }
}

/// Bounded FIFO of events for one destination
#[derive(Debug)]
pub struct DeliveryQueue {
    tx: Sender<Arc<Event>>,
    rx: Receiver<Arc<Event>>,
}

impl DeliveryQueue {
    /// Create a queue with fixed capacity (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Enqueue according to `policy`
    pub async fn push(&self, event: Arc<Event>, policy: &OverflowPolicy) -> EnqueueOutcome {
        match policy {
            OverflowPolicy::DropOldest => match self.tx.force_send(event) {
                Ok(None) => EnqueueOutcome::Enqueued,
                Ok(Some(_evicted)) => EnqueueOutcome::EvictedOldest,
                Err(_) => EnqueueOutcome::Closed,
            },
            OverflowPolicy::DropNewest => match self.tx.try_send(event) {
                Ok(()) => EnqueueOutcome::Enqueued,
                Err(TrySendError::Full(_)) => EnqueueOutcome::Rejected,
                Err(TrySendError::Closed(_)) => EnqueueOutcome::Closed,
            },
            OverflowPolicy::Block { timeout_ms } => {
                let timeout = Duration::from_millis(*timeout_ms);
                match tokio::time::timeout(timeout, self.tx.send(event)).await {
                    Ok(Ok(())) => EnqueueOutcome::Enqueued,
                    Ok(Err(_)) => EnqueueOutcome::Closed,
                    Err(_) => EnqueueOutcome::TimedOut,
                }
            }
        }
    }

    /// Take the next event, suspending while the queue is empty
    ///
    /// Returns `None` once the queue is closed and empty.
    pub async fn pop(&self) -> Option<Arc<Event>> {
        self.rx.recv().await.ok()
    }

    /// Stop accepting new events and wake every waiter
    pub fn close(&self) {
        self.tx.close();
    }

    /// Remove and return everything still queued
    pub fn drain_remaining(&self) -> Vec<Arc<Event>> {
        std::iter::from_fn(|| self.rx.try_recv().ok()).collect()
    }
}
