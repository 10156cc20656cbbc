//! Command implementations.

mod run;
mod validate;

use std::path::Path;

use contracts::ExporterConfig;

use crate::error::{CliError, Result};

pub use run::run_exporter;
pub use validate::run_validate;

/// Load and validate the configuration file
pub(crate) fn load_config(path: &Path) -> Result<ExporterConfig> {
    if !path.exists() {
        return Err(CliError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    config_loader::ConfigLoader::load_from_path(path).map_err(|e| CliError::config(path, e))
}
