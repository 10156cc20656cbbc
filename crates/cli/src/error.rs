//! Error types for CLI operations.

use std::path::PathBuf;

use contracts::ContractError;
use dispatcher::DispatcherError;
use ingestion::IngestionError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    /// Configuration could not be loaded or is invalid
    #[error("Failed to load configuration from {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: ContractError,
    },

    /// Dispatcher could not be started
    #[error("Failed to start dispatcher: {0}")]
    Startup(#[from] DispatcherError),

    /// Event source could not be opened
    #[error("Failed to open event source: {0}")]
    Source(#[from] IngestionError),

    /// Event source failed while running
    #[error("Event source '{source_name}' failed: {message}")]
    SourceFailed {
        source_name: String,
        message: String,
    },

    /// Generic error wrapper
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn config(path: impl Into<PathBuf>, source: ContractError) -> Self {
        Self::Config {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
