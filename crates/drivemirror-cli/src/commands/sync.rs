//! Crawl and sync commands - Run one attempt in the foreground
//!
//! The attempt runs in this process and claims the account the same way a
//! scheduled attempt does, so it fails with "in progress" if the daemon is
//! already working on it. Ctrl-C stops the attempt at its next page
//! boundary; rows applied so far are kept.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use drivemirror_sync::{AttemptHandle, AttemptReport, SyncService};
use tracing::{info, warn};

use super::parse_key;
use crate::context::AppContext;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct CrawlCommand {
    /// Account email or alias
    pub account: String,

    /// Delete rows the crawl did not see (overrides `sync.reconcile_after_crawl`)
    #[arg(long)]
    pub reconcile: bool,
}

impl CrawlCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: Option<&Path>) -> Result<()> {
        let ctx = AppContext::open(config_path).await?;
        let key = parse_key(&self.account)?;
        let reconcile = self.reconcile || ctx.config.sync.reconcile_after_crawl;
        let service = Arc::new(ctx.service.with_reconcile_after_crawl(reconcile));

        info!(account_key = %key, reconcile, "Starting crawl");
        let handle = service.trigger_crawl(&key).await?;
        let report = wait_for(&service, handle).await?;
        print_report(format, &report);
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Account email or alias
    pub account: String,
}

impl SyncCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: Option<&Path>) -> Result<()> {
        let ctx = AppContext::open(config_path).await?;
        let key = parse_key(&self.account)?;

        let service = Arc::new(ctx.service);

        info!(account_key = %key, "Starting incremental sync");
        let handle = service.trigger_incremental_sync(&key).await?;
        let report = wait_for(&service, handle).await?;
        print_report(format, &report);
        Ok(())
    }
}

/// Awaits the attempt, interrupting it on Ctrl-C
async fn wait_for(service: &SyncService, mut handle: AttemptHandle) -> Result<AttemptReport> {
    let joined = tokio::select! {
        joined = &mut handle => joined,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping at the next page boundary");
            service.shutdown();
            handle.await
        }
    };
    let report = joined.context("Attempt task panicked")??;
    Ok(report)
}

fn print_report(format: OutputFormat, report: &AttemptReport) {
    let formatter = get_formatter(format);
    if format.is_json() {
        formatter.print_json(&serde_json::to_value(report).unwrap_or_default());
        return;
    }

    if report.interrupted {
        formatter.warn(&format!("{} interrupted for {}", report.kind, report.account_key));
    } else {
        formatter.success(&format!("{} finished for {}", report.kind, report.account_key));
    }
    formatter.field("Pages", &report.pages.to_string());
    formatter.field("Upserted", &report.upserts.to_string());
    formatter.field("Removed", &report.removals.to_string());
    if report.pruned > 0 {
        formatter.field("Pruned", &report.pruned.to_string());
    }
    if report.retries > 0 {
        formatter.field("Rate limited", &format!("{} retries", report.retries));
    }
    formatter.field("Duration", &format!("{} ms", report.duration_ms));

    if !report.errors.is_empty() {
        formatter.warn(&format!("{} record(s) skipped", report.errors.len()));
        for error in &report.errors {
            formatter.info(error);
        }
    }
}
