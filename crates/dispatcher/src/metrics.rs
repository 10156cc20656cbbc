//! Sink metrics for observability
//!
//! Atomic per-destination counters, mirrored into the `metrics` facade with
//! a `sink` label.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};

use metrics::{counter, gauge};

/// Delivery worker lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Starting = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics for a single sink
#[derive(Debug)]
pub struct SinkMetrics {
    name: String,
    state: AtomicU8,
    /// Current queue length
    queue_len: AtomicUsize,
    /// Events accepted into the queue
    enqueued: AtomicU64,
    /// Events the destination accepted
    delivered: AtomicU64,
    /// Delivery attempts, including retries
    attempts: AtomicU64,
    /// Attempts after the first one
    retries: AtomicU64,
    /// Events dropped on a fatal failure
    failed: AtomicU64,
    /// Events dropped after the last retry
    exhausted: AtomicU64,
    /// Events dropped by the overflow policy
    dropped_overflow: AtomicU64,
    /// Events still queued when the worker was stopped
    dropped_shutdown: AtomicU64,
}

impl SinkMetrics {
    /// Create new metrics instance
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: AtomicU8::new(WorkerState::Starting as u8),
            queue_len: AtomicUsize::new(0),
            enqueued: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
            dropped_overflow: AtomicU64::new(0),
            dropped_shutdown: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
        gauge!("event_exporter_worker_state", "sink" => self.name.clone()).set(state as u8 as f64);
    }

    /// Get current queue length
    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    /// Set current queue length
    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
        gauge!("event_exporter_queue_length", "sink" => self.name.clone()).set(len as f64);
    }

    pub fn inc_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        counter!("event_exporter_events_enqueued_total", "sink" => self.name.clone()).increment(1);
    }

    pub fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        counter!("event_exporter_events_delivered_total", "sink" => self.name.clone())
            .increment(1);
    }

    pub fn inc_attempts(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        counter!("event_exporter_delivery_retries_total", "sink" => self.name.clone())
            .increment(1);
    }

    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.record_drop("fatal", 1);
    }

    pub fn inc_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
        self.record_drop("exhausted", 1);
    }

    pub fn inc_dropped_overflow(&self) {
        self.dropped_overflow.fetch_add(1, Ordering::Relaxed);
        self.record_drop("overflow", 1);
    }

    pub fn add_dropped_shutdown(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.dropped_shutdown.fetch_add(count, Ordering::Relaxed);
        self.record_drop("shutdown", count);
    }

    fn record_drop(&self, reason: &'static str, count: u64) {
        counter!(
            "event_exporter_events_dropped_total",
            "sink" => self.name.clone(),
            "reason" => reason
        )
        .increment(count);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            state: self.state(),
            queue_len: self.queue_len(),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
            dropped_shutdown: self.dropped_shutdown.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub state: WorkerState,
    pub queue_len: usize,
    pub enqueued: u64,
    pub delivered: u64,
    pub attempts: u64,
    pub retries: u64,
    pub failed: u64,
    pub exhausted: u64,
    pub dropped_overflow: u64,
    pub dropped_shutdown: u64,
}

impl MetricsSnapshot {
    /// Every event that left the pipeline without being delivered
    pub fn dropped_total(&self) -> u64 {
        self.failed + self.exhausted + self.dropped_overflow + self.dropped_shutdown
    }
}
