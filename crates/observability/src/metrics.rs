//! 投递指标汇总模块
//!
//! 进程级指标，以及关停时的投递结果汇总。

use std::fmt;

use metrics::{counter, gauge, histogram};

/// 记录配置加载结果
pub fn record_config_loaded(receivers: usize, routes: usize) {
    gauge!("event_exporter_receivers").set(receivers as f64);
    gauge!("event_exporter_routes").set(routes as f64);
}

/// 记录事件源结束
pub fn record_source_exhausted(source: &str, produced: u64) {
    counter!(
        "event_exporter_source_exhausted_total",
        "source" => source.to_string()
    )
    .increment(1);
    gauge!(
        "event_exporter_source_produced",
        "source" => source.to_string()
    )
    .set(produced as f64);
}

/// 记录关停汇总
pub fn record_delivery_summary(summary: &DeliverySummary) {
    histogram!("event_exporter_shutdown_duration_ms").record(summary.shutdown_ms as f64);
    for sink in &summary.sinks {
        if sink.forced {
            counter!(
                "event_exporter_sink_forced_stop_total",
                "sink" => sink.name.clone()
            )
            .increment(1);
        }
        gauge!(
            "event_exporter_sink_undelivered",
            "sink" => sink.name.clone()
        )
        .set(sink.dropped() as f64);
    }
}

/// 单个目的地的最终统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkSummary {
    pub name: String,
    pub kind: String,
    pub delivered: u64,
    pub failed: u64,
    pub exhausted: u64,
    pub dropped_overflow: u64,
    pub dropped_shutdown: u64,
    pub forced: bool,
    pub released: bool,
}

impl SinkSummary {
    /// 所有未投递成功的事件
    pub fn dropped(&self) -> u64 {
        self.failed + self.exhausted + self.dropped_overflow + self.dropped_shutdown
    }
}

/// 投递结果汇总
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliverySummary {
    /// 收到的事件数
    pub received: u64,
    /// 无路由匹配的事件数
    pub unrouted: u64,
    /// 关停耗时
    pub shutdown_ms: u64,
    pub sinks: Vec<SinkSummary>,
}

impl DeliverySummary {
    pub fn delivered(&self) -> u64 {
        self.sinks.iter().map(|s| s.delivered).sum()
    }

    pub fn dropped(&self) -> u64 {
        self.sinks.iter().map(SinkSummary::dropped).sum()
    }

    /// 丢弃比例（百分比）
    pub fn drop_rate(&self) -> f64 {
        let total = self.delivered() + self.dropped();
        if total == 0 {
            0.0
        } else {
            self.dropped() as f64 / total as f64 * 100.0
        }
    }
}

impl fmt::Display for DeliverySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Delivery Summary ===")?;
        writeln!(f, "Events received: {}", self.received)?;
        writeln!(f, "Unrouted: {}", self.unrouted)?;
        writeln!(
            f,
            "Delivered: {}, dropped: {} ({:.2}%)",
            self.delivered(),
            self.dropped(),
            self.drop_rate()
        )?;
        writeln!(f, "Shutdown: {} ms", self.shutdown_ms)?;

        for sink in &self.sinks {
            write!(
                f,
                "  {} [{}]: delivered={} failed={} exhausted={} overflow={} shutdown={}",
                sink.name,
                sink.kind,
                sink.delivered,
                sink.failed,
                sink.exhausted,
                sink.dropped_overflow,
                sink.dropped_shutdown
            )?;
            if sink.forced {
                write!(f, " (force-stopped)")?;
            }
            if !sink.released {
                write!(f, " (release failed)")?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> DeliverySummary {
        DeliverySummary {
            received: 10,
            unrouted: 2,
            shutdown_ms: 15,
            sinks: vec![
                SinkSummary {
                    name: "slack-a".into(),
                    kind: "slack".into(),
                    delivered: 6,
                    failed: 1,
                    released: true,
                    ..Default::default()
                },
                SinkSummary {
                    name: "es".into(),
                    kind: "elasticsearch".into(),
                    delivered: 2,
                    exhausted: 1,
                    forced: true,
                    released: true,
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn test_totals() {
        let summary = summary();
        assert_eq!(summary.delivered(), 8);
        assert_eq!(summary.dropped(), 2);
        assert!((summary.drop_rate() - 20.0).abs() < 1e-9);
        assert_eq!(DeliverySummary::default().drop_rate(), 0.0);
    }

    #[test]
    fn test_summary_display() {
        let output = summary().to_string();
        assert!(output.contains("Events received: 10"));
        assert!(output.contains("20.00%"));
        assert!(output.contains("es [elasticsearch]: delivered=2"));
        assert!(output.contains("(force-stopped)"));
    }

    #[test]
    fn test_recorders_without_installed_recorder() {
        // the facade is a no-op until a recorder is installed
        record_config_loaded(3, 2);
        record_source_exhausted("mock", 10);
        record_delivery_summary(&summary());
    }
}
