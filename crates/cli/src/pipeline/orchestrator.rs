//! Pipeline orchestrator - wires the event source into the dispatcher.

use std::future::Future;
use std::time::{Duration, Instant};

use contracts::{EventSource, ExporterConfig};
use dispatcher::{DispatcherBuilder, ShutdownReport};
use ingestion::{AnySource, MockSourceConfig, SourceSpec};
use observability::{
    record_config_loaded, record_delivery_summary, record_source_exhausted, DeliverySummary,
    SinkSummary,
};
use tracing::{error, info, warn};

use super::PipelineStats;
use crate::error::Result;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Loaded exporter configuration
    pub exporter: ExporterConfig,

    /// Where events come from
    pub source: SourceSpec,

    /// Settings used when `source` is [`SourceSpec::Mock`]
    pub mock: MockSourceConfig,

    /// Drain grace override (None = `dispatch.drain_timeout_ms`)
    pub drain_timeout: Option<Duration>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until the source is exhausted or `shutdown` resolves
    ///
    /// Either way the dispatcher drains its queues before this returns. A
    /// failing source is reported in the stats rather than as an error so
    /// the delivery summary is never lost.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let PipelineConfig {
            exporter,
            source,
            mock,
            drain_timeout,
        } = self.config;

        record_config_loaded(exporter.receivers.len(), exporter.routes.len());

        let dispatcher = DispatcherBuilder::new(exporter).build().await?;
        info!(
            destinations = dispatcher.destinations().count(),
            "Dispatcher started"
        );

        let mut source = AnySource::open(&source, mock).await?;
        let source_name = source.name().to_string();
        info!(source = %source_name, "Event source opened");

        tokio::pin!(shutdown);
        let mut source_error = None;
        tokio::select! {
            result = source.run(&dispatcher) => match result {
                Ok(produced) => {
                    info!(source = %source_name, produced, "Event source exhausted");
                    record_source_exhausted(&source_name, produced);
                }
                Err(e) => {
                    error!(source = %source_name, error = %e, "Event source failed");
                    source_error = Some(e.to_string());
                }
            },
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping event source");
            }
        }

        let ingest = source.metrics();

        info!("Draining destination queues...");
        let report = match drain_timeout {
            Some(grace) => dispatcher.stop_with_grace(grace).await,
            None => dispatcher.stop().await,
        };
        for sink in report.forced() {
            warn!(destination = %sink.name, "Destination force-stopped at drain deadline");
        }

        let summary = delivery_summary(&report);
        record_delivery_summary(&summary);

        Ok(PipelineStats {
            duration: start_time.elapsed(),
            source_name,
            events_produced: ingest.events_emitted,
            malformed: ingest.malformed,
            source_error,
            summary,
        })
    }
}

/// Flatten the dispatcher's shutdown report for the observability layer
fn delivery_summary(report: &ShutdownReport) -> DeliverySummary {
    DeliverySummary {
        received: report.stats.received,
        unrouted: report.stats.unrouted,
        shutdown_ms: report.elapsed.as_millis() as u64,
        sinks: report
            .sinks
            .iter()
            .map(|s| SinkSummary {
                name: s.name.clone(),
                kind: s.kind.to_string(),
                delivered: s.metrics.delivered,
                failed: s.metrics.failed,
                exhausted: s.metrics.exhausted,
                dropped_overflow: s.metrics.dropped_overflow,
                dropped_shutdown: s.metrics.dropped_shutdown,
                forced: s.forced,
                released: s.released,
            })
            .collect(),
    }
}
