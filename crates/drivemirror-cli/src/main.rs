//! DriveMirror CLI - Command-line interface for DriveMirror
//!
//! Provides commands for:
//! - Registering and removing accounts
//! - Running a crawl or incremental sync in the foreground
//! - Viewing per-account sync status
//! - Validating the configuration file

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;
mod output;

use commands::{
    accounts::AccountsCommand,
    config::ConfigCommand,
    status::StatusCommand,
    sync::{CrawlCommand, SyncCommand},
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "drivemirror",
    version,
    about = "Google Drive metadata mirror"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage mirrored accounts
    #[command(subcommand)]
    Accounts(AccountsCommand),
    /// Run a full crawl of one account
    Crawl(CrawlCommand),
    /// Run an incremental sync of one account
    Sync(SyncCommand),
    /// Show synchronization status
    Status(StatusCommand),
    /// Inspect the configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Accounts(cmd) => cmd.execute(format, config_path).await,
        Commands::Crawl(cmd) => cmd.execute(format, config_path).await,
        Commands::Sync(cmd) => cmd.execute(format, config_path).await,
        Commands::Status(cmd) => cmd.execute(format, config_path).await,
        Commands::Config(cmd) => cmd.execute(format, config_path).await,
    }
}
