//! Accounts command - Register, list and remove mirrored accounts
//!
//! Secrets are read from a file (or `-` for stdin) so they never appear on
//! the command line; the service seals them before they are stored.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use drivemirror_core::domain::Account;
use tracing::info;

use super::parse_key;
use crate::context::AppContext;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum AccountsCommand {
    /// List registered accounts
    List,
    /// Register an OAuth account
    AddOauth {
        /// Google account email; used as the account key
        email: String,
        /// JSON document holding the refresh token (`-` reads stdin)
        #[arg(long)]
        secret_file: PathBuf,
    },
    /// Register a service-account share
    AddServiceAccount {
        /// Account key for the share
        alias: String,
        /// Service-account key JSON (`-` reads stdin)
        #[arg(long)]
        key_file: PathBuf,
        /// Folder shared with the service account (repeatable)
        #[arg(long = "root", required = true)]
        roots: Vec<String>,
    },
    /// Remove an account and all of its mirrored rows
    Remove {
        /// Account email or alias
        account: String,
    },
}

impl AccountsCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: Option<&Path>) -> Result<()> {
        let ctx = AppContext::open(config_path).await?;
        let formatter = get_formatter(format);

        match self {
            AccountsCommand::List => {
                let accounts = ctx.service.list_accounts().await?;
                if format.is_json() {
                    let rows: Vec<_> = accounts.iter().map(account_json).collect();
                    formatter.print_json(&serde_json::Value::Array(rows));
                    return Ok(());
                }
                if accounts.is_empty() {
                    formatter.info("No accounts registered");
                    return Ok(());
                }
                formatter.success(&format!("{} account(s)", accounts.len()));
                for account in &accounts {
                    formatter.info(&format!(
                        "{:<32} {:<9} {}",
                        account.key().as_str(),
                        account.auth_type().as_str(),
                        account.status().as_str()
                    ));
                }
            }
            AccountsCommand::AddOauth { email, secret_file } => {
                let secret = read_secret(secret_file)?;
                let account = ctx.service.register_oauth_account(email, &secret).await?;
                info!(account_key = %account.key(), "Account added");
                report_added(format, &account);
            }
            AccountsCommand::AddServiceAccount {
                alias,
                key_file,
                roots,
            } => {
                let secret = read_secret(key_file)?;
                let account = ctx
                    .service
                    .register_service_account(alias, &secret, roots)
                    .await?;
                info!(account_key = %account.key(), "Account added");
                report_added(format, &account);
            }
            AccountsCommand::Remove { account } => {
                let key = parse_key(account)?;
                ctx.service.delete_account(&key).await?;
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "removed": key.as_str(),
                    }));
                } else {
                    formatter.success(&format!("Removed {key}"));
                }
            }
        }
        Ok(())
    }
}

fn read_secret(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut secret = String::new();
        std::io::stdin()
            .read_to_string(&mut secret)
            .context("Failed to read secret from stdin")?;
        return Ok(secret);
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read secret from {}", path.display()))
}

fn report_added(format: OutputFormat, account: &Account) {
    let formatter = get_formatter(format);
    if format.is_json() {
        formatter.print_json(&account_json(account));
    } else {
        formatter.success(&format!("Added {} ({})", account.key(), account.auth_type()));
        formatter.info("A running daemon schedules it at its next health check; the first attempt is a full crawl");
    }
}

fn account_json(account: &Account) -> serde_json::Value {
    let roots: Vec<&str> = account
        .root_folder_ids()
        .iter()
        .map(|id| id.as_str())
        .collect();
    serde_json::json!({
        "account_key": account.key().as_str(),
        "auth_type": account.auth_type().as_str(),
        "status": account.status().as_str(),
        "root_folder_ids": roots,
        "last_sync_at": account.last_sync_at().map(|t| t.to_rfc3339()),
        "created_at": account.created_at().to_rfc3339(),
    })
}
