//! Config command - inspect the WhereIsIt configuration
//!
//! Provides the `whereisit config` subcommands:
//! 1. `show`     - Prints the effective configuration (YAML or JSON)
//! 2. `validate` - Checks the file and reports every invalid field
//! 3. `path`     - Prints the path of the file in use

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use whereisit_core::config::Config;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

impl ConfigCommand {
    /// Execute the config command against the already-loaded configuration
    pub async fn execute(&self, config: &Config, path: &Path, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(config, path, format),
            ConfigCommand::Validate => {
                execute_validate(path, format);
                Ok(())
            }
            ConfigCommand::Path => {
                let formatter = get_formatter(matches!(format, OutputFormat::Json));
                if matches!(format, OutputFormat::Json) {
                    formatter.print_json(&serde_json::json!({
                        "config_path": path.display().to_string(),
                        "exists": path.exists(),
                    }));
                } else {
                    println!("{}", path.display());
                }
                Ok(())
            }
        }
    }
}

fn execute_show(config: &Config, path: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(matches!(format, OutputFormat::Json));
    info!(config_path = %path.display(), "Showing configuration");

    let value = redacted(config)?;
    if matches!(format, OutputFormat::Json) {
        formatter.print_json(&value);
        return Ok(());
    }

    formatter.success(&format!("Configuration ({})", path.display()));
    formatter.info("");
    let yaml =
        serde_yaml::to_string(&value).context("Failed to serialize configuration to YAML")?;
    for line in yaml.lines() {
        formatter.info(line);
    }
    Ok(())
}

fn execute_validate(path: &Path, format: OutputFormat) {
    let formatter = get_formatter(matches!(format, OutputFormat::Json));

    let config = match Config::load(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            let message = if path.exists() {
                format!("Failed to parse configuration: {e:#}")
            } else {
                "Configuration file not found. Using defaults.".to_string()
            };
            if matches!(format, OutputFormat::Json) {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": path.display().to_string(),
                    "errors": [message],
                }));
            } else if path.exists() {
                formatter.error(&message);
                formatter.info(&format!("File: {}", path.display()));
            } else {
                formatter.info(&format!("Configuration file not found at {}", path.display()));
                formatter.info("Using default configuration.");
            }
            return;
        }
    };

    info!(config_path = %path.display(), "Validating configuration");
    let errors = config.with_env_overrides().validate();

    if matches!(format, OutputFormat::Json) {
        let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": path.display().to_string(),
            "errors": error_strings,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", path.display()));
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }
}

/// Configuration as a JSON value with the identity API key masked
fn redacted(config: &Config) -> Result<serde_json::Value> {
    let mut value =
        serde_json::to_value(config).context("Failed to serialize configuration to JSON")?;
    if let Some(key) = value.pointer_mut("/identity/api_key") {
        if !key.is_null() {
            *key = serde_json::Value::String("<redacted>".to_string());
        }
    }
    Ok(value)
}
