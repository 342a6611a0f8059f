//! Config command - Show and validate the DriveMirror configuration

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use crate::context::load_config;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: Option<&Path>) -> Result<()> {
        let formatter = get_formatter(format);
        let (path, config) = load_config(config_path)?;

        match self {
            ConfigCommand::Show => {
                if format.is_json() {
                    let json = serde_json::to_value(&config)
                        .context("Failed to serialize configuration to JSON")?;
                    formatter.print_json(&json);
                    return Ok(());
                }
                formatter.success(&format!("Configuration ({})", path.display()));
                let yaml = serde_yaml::to_string(&config)
                    .context("Failed to serialize configuration to YAML")?;
                for line in yaml.lines() {
                    formatter.info(line);
                }
            }
            ConfigCommand::Validate => {
                let errors = config.validate();
                if format.is_json() {
                    let listed: Vec<_> = errors
                        .iter()
                        .map(|e| serde_json::json!({"field": e.field, "message": e.message}))
                        .collect();
                    formatter.print_json(&serde_json::json!({
                        "path": path.display().to_string(),
                        "valid": errors.is_empty(),
                        "errors": listed,
                    }));
                } else if errors.is_empty() {
                    formatter.success(&format!("{} is valid", path.display()));
                } else {
                    for error in &errors {
                        formatter.error(&error.to_string());
                    }
                }
                if !errors.is_empty() {
                    bail!("{} configuration error(s)", errors.len());
                }
            }
        }
        Ok(())
    }
}
