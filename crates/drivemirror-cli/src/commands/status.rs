//! Status command - Display per-account synchronization status
//!
//! With an account argument, shows that account only; otherwise shows every
//! registered account.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use drivemirror_sync::SyncStatus;

use super::parse_key;
use crate::context::AppContext;
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Account email or alias
    pub account: Option<String>,
}

impl StatusCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: Option<&Path>) -> Result<()> {
        let ctx = AppContext::open(config_path).await?;
        let formatter = get_formatter(format);

        let statuses = match &self.account {
            Some(raw) => vec![ctx.service.get_sync_status(&parse_key(raw)?).await?],
            None => {
                let mut statuses = Vec::new();
                for account in ctx.service.list_accounts().await? {
                    statuses.push(ctx.service.get_sync_status(account.key()).await?);
                }
                statuses
            }
        };

        if format.is_json() {
            let value = match (&self.account, statuses.as_slice()) {
                (Some(_), [status]) => serde_json::to_value(status)?,
                _ => serde_json::to_value(&statuses)?,
            };
            formatter.print_json(&value);
            return Ok(());
        }

        if statuses.is_empty() {
            formatter.info("No accounts registered");
            return Ok(());
        }
        for status in &statuses {
            show_status(&*formatter, status);
        }
        Ok(())
    }
}

fn show_status(formatter: &dyn OutputFormatter, status: &SyncStatus) {
    formatter.success(&format!("{} ({})", status.account_key, status.auth_type));
    formatter.field("Status", status.status.as_str());
    formatter.field("Last sync", &last_sync_label(status));
    formatter.field("Files", &status.file_count.to_string());
    if let Some(error) = &status.last_error {
        formatter.field("Last error", error);
    }
    formatter.info("");
}

fn last_sync_label(status: &SyncStatus) -> String {
    match status.last_sync_at {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "Never".to_string(),
    }
}
