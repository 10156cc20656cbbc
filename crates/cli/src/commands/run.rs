//! `run` command implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use ingestion::{MockSourceConfig, SourceSpec};
use tracing::{info, warn};

use crate::cli::{Cli, RunArgs};
use crate::commands::load_config;
use crate::error::CliError;
use crate::init_logging;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_exporter(cli: &Cli, args: &RunArgs) -> Result<()> {
    // Load and parse configuration before logging: its level drives the filter
    let config = load_config(&args.config)?;
    init_logging(cli, &config.log_level, args.metrics_port)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        routes = config.routes.len(),
        receivers = config.receivers.len(),
        "Configuration loaded"
    );

    let source: SourceSpec = args
        .source
        .parse()
        .with_context(|| format!("Invalid --source '{}'", args.source))?;

    let mock = MockSourceConfig {
        count: (args.mock_count > 0).then_some(args.mock_count),
        interval: Duration::from_millis(args.mock_interval_ms),
        ..Default::default()
    };

    let pipeline = Pipeline::new(PipelineConfig {
        exporter: config,
        source,
        mock,
        drain_timeout: args.drain_timeout_ms.map(Duration::from_millis),
    });

    info!("Starting exporter...");
    let stats = pipeline.run(shutdown_signal()).await?;
    stats.print_summary();

    if let Some(message) = stats.source_error {
        warn!(error = %message, "Exporter stopped after a source failure");
        return Err(CliError::SourceFailed {
            source_name: stats.source_name,
            message,
        }
        .into());
    }

    info!("Event exporter finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
///
/// A handler that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
