//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Event Exporter - routes cluster events to external destinations
#[derive(Parser, Debug)]
#[command(
    name = "event-exporter",
    author,
    version,
    about = "Route cluster events to external destinations",
    long_about = "Reads cluster events, matches them against configured routes and \n\
                  delivers each one to every matching receiver with per-destination \n\
                  queues, retries and graceful draining on shutdown."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "EVENT_EXPORTER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose", env = "EVENT_EXPORTER_QUIET")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "EVENT_EXPORTER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Log level forced by `-v` / `-q`, if any
    pub fn level_override(&self) -> Option<&'static str> {
        if self.quiet {
            return Some("error");
        }
        match self.verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the exporter until the source ends or a signal arrives
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (YAML, TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config.yaml",
        env = "EVENT_EXPORTER_CONFIG"
    )]
    pub config: PathBuf,

    /// Event source: `stdin`, `mock` or a path to a JSON-lines file
    #[arg(long, default_value = "stdin", env = "EVENT_EXPORTER_SOURCE")]
    pub source: String,

    /// Number of events the mock source emits (0 = unlimited)
    #[arg(long, default_value = "100", env = "EVENT_EXPORTER_MOCK_COUNT")]
    pub mock_count: u64,

    /// Pause between mock events in milliseconds
    #[arg(long, default_value = "100", env = "EVENT_EXPORTER_MOCK_INTERVAL_MS")]
    pub mock_interval_ms: u64,

    /// Prometheus scrape port (disabled when unset)
    #[arg(long, env = "EVENT_EXPORTER_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Override the configured drain grace period
    #[arg(long, env = "EVENT_EXPORTER_DRAIN_TIMEOUT_MS")]
    pub drain_timeout_ms: Option<u64>,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(
        short,
        long,
        default_value = "config.yaml",
        env = "EVENT_EXPORTER_CONFIG"
    )]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
