//! Mock 事件源
//!
//! 用于无集群环境的测试和演示。

use chrono::Utc;
use contracts::{
    ContractError, Event, EventHandler, EventMetadata, EventOrigin, EventSource, ObjectReference,
    Severity,
};
use tracing::{debug, info, instrument, trace};

use crate::config::{IngestionMetrics, MetricsSnapshot, MockSourceConfig};

/// Reasons emitted as `Warning`
const WARNING_REASONS: [&str; 5] = ["BackOff", "OOMKilled", "FailedMount", "Unhealthy", "Evicted"];

/// Mock 事件源
///
/// 按固定间隔生成事件，namespace 与 reason 轮换。
pub struct MockEventSource {
    config: MockSourceConfig,
    metrics: IngestionMetrics,
}

impl MockEventSource {
    pub fn new(config: MockSourceConfig) -> Self {
        Self {
            config,
            metrics: IngestionMetrics::new("mock"),
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 生成第 `seq` 个事件
    pub fn event(&self, seq: u64) -> Event {
        let namespace = pick(&self.config.namespaces, seq, "default");
        let reason = pick(&self.config.reasons, seq, "Started");
        let severity = if WARNING_REASONS.iter().any(|r| *r == reason) {
            Severity::Warning
        } else {
            Severity::Normal
        };
        let pod = format!("app-{}", seq % 4);
        let now = Utc::now();

        Event {
            metadata: EventMetadata {
                name: format!("{pod}.{seq:x}"),
                namespace: namespace.to_string(),
                uid: format!("mock-{seq}"),
                ..Default::default()
            },
            involved_object: ObjectReference {
                kind: "Pod".into(),
                namespace: namespace.to_string(),
                name: pod,
                api_version: "v1".into(),
                ..Default::default()
            },
            reason: reason.to_string(),
            message: format!("mock event #{seq}: {reason}"),
            severity,
            first_timestamp: Some(now),
            last_timestamp: Some(now),
            count: 1,
            source: EventOrigin {
                component: "mock-source".into(),
                host: String::new(),
            },
        }
    }
}

fn pick<'a>(items: &'a [String], seq: u64, fallback: &'a str) -> &'a str {
    if items.is_empty() {
        return fallback;
    }
    &items[(seq % items.len() as u64) as usize]
}

impl EventSource for MockEventSource {
    fn name(&self) -> &str {
        "mock"
    }

    #[instrument(name = "mock_source_run", skip(self, handler), fields(count = ?self.config.count))]
    async fn run<H>(&mut self, handler: &H) -> Result<u64, ContractError>
    where
        H: EventHandler + Sync,
    {
        info!(interval_ms = self.config.interval.as_millis() as u64, "Mock source started");

        let mut seq = 0u64;
        while self.config.count.is_none_or(|count| seq < count) {
            let event = self.event(seq);
            trace!(seq, reason = %event.reason, namespace = %event.namespace(), "Mock event");
            self.metrics.record_emitted();
            handler.on_event(event).await;
            seq += 1;

            if self.config.interval.is_zero() {
                // let shutdown and the delivery workers run between events
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.config.interval).await;
            }
        }

        debug!(emitted = seq, "Mock source exhausted");
        Ok(seq)
    }
}
