//! Source selection and ingestion metrics

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::counter;

use crate::error::IngestionError;

/// Which source the process reads events from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// JSON lines on standard input
    Stdin,
    /// Synthetic events
    Mock,
    /// JSON lines read from a file
    File(PathBuf),
}

impl FromStr for SourceSpec {
    type Err = IngestionError;

    /// `stdin` / `-`, `mock`, anything else is a file path
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(IngestionError::InvalidSource(s.to_string())),
            "stdin" | "-" => Ok(Self::Stdin),
            "mock" => Ok(Self::Mock),
            path => Ok(Self::File(PathBuf::from(path))),
        }
    }
}

/// Mock source configuration
#[derive(Debug, Clone)]
pub struct MockSourceConfig {
    /// Number of events to emit, `None` for unbounded
    pub count: Option<u64>,

    /// Pause between events
    pub interval: Duration,

    /// Namespaces cycled through
    pub namespaces: Vec<String>,

    /// Reasons cycled through
    pub reasons: Vec<String>,
}

impl Default for MockSourceConfig {
    fn default() -> Self {
        Self {
            count: Some(10),
            interval: Duration::from_millis(100),
            namespaces: vec!["default".into(), "prod".into(), "kube-system".into()],
            reasons: vec![
                "Scheduled".into(),
                "Pulled".into(),
                "Started".into(),
                "BackOff".into(),
                "OOMKilled".into(),
            ],
        }
    }
}

/// Per-source counters
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    source: String,

    /// Events handed to the handler
    events_emitted: AtomicU64,

    /// Lines that did not parse as an event
    malformed: AtomicU64,

    /// Well-formed records ignored (deletions, blank lines)
    skipped: AtomicU64,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn record_emitted(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
        counter!("event_exporter_source_events_total", "source" => self.source.clone())
            .increment(1);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
        counter!("event_exporter_source_malformed_total", "source" => self.source.clone())
            .increment(1);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_emitted: u64,
    pub malformed: u64,
    pub skipped: u64,
}
