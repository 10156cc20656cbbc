//! `validate` command implementation.

use std::collections::HashSet;

use anyhow::{Context, Result};
use contracts::ExporterConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;
use crate::commands::load_config;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    log_level: String,
    route_count: usize,
    receivers: Vec<ReceiverSummary>,
}

#[derive(Serialize)]
struct ReceiverSummary {
    name: String,
    kind: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    match load_config(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            let receivers = config
                .receivers
                .iter()
                .map(|r| ReceiverSummary {
                    name: r.name.clone(),
                    kind: r
                        .destination()
                        .map(|d| d.kind().to_string())
                        .unwrap_or_default(),
                })
                .collect();

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    log_level: config.log_level.clone(),
                    route_count: config.routes.len(),
                    receivers,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &ExporterConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.routes.is_empty() {
        warnings.push("No routes configured - every event will be dropped".to_string());
    }

    let routed: HashSet<&str> = config
        .routes
        .iter()
        .flat_map(|r| r.destinations.iter().map(String::as_str))
        .collect();
    for receiver in &config.receivers {
        if !routed.contains(receiver.name.as_str()) {
            warnings.push(format!(
                "Receiver '{}' is not referenced by any route",
                receiver.name
            ));
        }
        if receiver.in_memory.is_some() {
            warnings.push(format!(
                "Receiver '{}' keeps events in memory without bound - test use only",
                receiver.name
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Log level: {}", summary.log_level);
            println!("  Routes: {}", summary.route_count);
            println!("  Receivers: {}", summary.receivers.len());
            for receiver in &summary.receivers {
                println!("    - {} ({})", receiver.name, receiver.kind);
            }
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
