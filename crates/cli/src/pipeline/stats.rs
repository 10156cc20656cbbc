//! Pipeline statistics.

use std::time::Duration;

use observability::DeliverySummary;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Total duration of the pipeline run
    pub duration: Duration,

    pub source_name: String,

    /// Events handed to the dispatcher
    pub events_produced: u64,

    /// Input records that could not be decoded
    pub malformed: u64,

    /// Set when the source stopped with an error
    pub source_error: Option<String>,

    /// Per-destination delivery outcome
    pub summary: DeliverySummary,
}

impl PipelineStats {
    /// Events per second produced by the source
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.events_produced as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Exporter Statistics ===\n");

        println!("Source: {}", self.source_name);
        println!("  Duration: {:.2}s", self.duration.as_secs_f64());
        println!("  Events produced: {}", self.events_produced);
        println!("  Malformed records: {}", self.malformed);
        println!("  Throughput: {:.2} events/s", self.throughput());
        if let Some(ref e) = self.source_error {
            println!("  Error: {}", e);
        }

        println!("\n{}", self.summary);
    }
}
