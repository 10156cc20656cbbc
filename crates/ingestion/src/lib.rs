//! # Ingestion
//!
//! Event sources feeding the dispatcher.
//!
//! Responsibilities:
//! - Read events as JSON lines from stdin or a file (`StreamEventSource`)
//! - Generate synthetic events for demos and tests (`MockEventSource`)
//! - Skip and count malformed records instead of failing the stream
//!
//! ## Usage Example
//!
//! ```ignore
//! use contracts::EventSource;
//! use ingestion::StreamEventSource;
//!
//! let mut source = StreamEventSource::stdin();
//! let produced = source.run(&dispatcher).await?;
//! ```

mod config;
mod error;
mod mock;
mod stream;

use contracts::{ContractError, EventHandler, EventSource};

pub use config::{IngestionMetrics, MetricsSnapshot, MockSourceConfig, SourceSpec};
pub use error::{IngestionError, Result};
pub use mock::MockEventSource;
pub use stream::StreamEventSource;

/// Source chosen at runtime
pub enum AnySource {
    Stdin(StreamEventSource<tokio::io::BufReader<tokio::io::Stdin>>),
    File(StreamEventSource<tokio::io::BufReader<tokio::fs::File>>),
    Mock(MockEventSource),
}

impl AnySource {
    /// Open the source described by `spec`
    pub async fn open(spec: &SourceSpec, mock: MockSourceConfig) -> Result<Self> {
        Ok(match spec {
            SourceSpec::Stdin => Self::Stdin(StreamEventSource::stdin()),
            SourceSpec::File(path) => Self::File(StreamEventSource::open(path).await?),
            SourceSpec::Mock => Self::Mock(MockEventSource::new(mock)),
        })
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        match self {
            Self::Stdin(s) => s.metrics(),
            Self::File(s) => s.metrics(),
            Self::Mock(s) => s.metrics(),
        }
    }
}

impl EventSource for AnySource {
    fn name(&self) -> &str {
        match self {
            Self::Stdin(s) => s.name(),
            Self::File(s) => s.name(),
            Self::Mock(s) => s.name(),
        }
    }

    async fn run<H>(&mut self, handler: &H) -> std::result::Result<u64, ContractError>
    where
        H: EventHandler + Sync,
    {
        match self {
            Self::Stdin(s) => s.run(handler).await,
            Self::File(s) => s.run(handler).await,
            Self::Mock(s) => s.run(handler).await,
        }
    }
}
