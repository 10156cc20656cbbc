//! # Event Exporter CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 事件源与分发引擎编排
//! - 优雅关闭处理

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use commands::{run_exporter, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Execute command; `run` initializes logging once the configured level is known
    let result = match &cli.command {
        Commands::Run(args) => run_exporter(&cli, args).await,
        Commands::Validate(args) => {
            init_logging(&cli, "warn", None)?;
            run_validate(args)
        }
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging based on CLI options
///
/// `-v` / `-q` win over `level`; `RUST_LOG` wins over both.
pub(crate) fn init_logging(cli: &Cli, level: &str, metrics_port: Option<u16>) -> Result<()> {
    observability::init_with_config(observability::ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port,
        default_log_level: cli.level_override().unwrap_or(level).to_string(),
    })
}
