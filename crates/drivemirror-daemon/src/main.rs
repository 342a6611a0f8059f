//! DriveMirror Daemon - Background mirror synchronization service
//!
//! This binary runs as a systemd user service and handles:
//! - Recovery of accounts left mid-attempt by a previous run
//! - Recurring per-account crawls and incremental syncs
//! - Periodic health checks that restart failed accounts
//! - An optional Prometheus `/metrics` endpoint
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon wires the SQLite mirror store, the Drive lister and the
//! secret box into a `SyncService`, hands it to the `Orchestrator`, and
//! waits for a shutdown signal. Shutdown stops the schedule, which
//! interrupts in-flight attempts at their next page boundary.

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use drivemirror_cache::{DatabasePool, SqliteMirrorStore};
use drivemirror_core::config::{Config, LogFormat, LoggingConfig};
use drivemirror_drive::{DriveLister, SecretBox};
use drivemirror_sync::{Orchestrator, SyncService};
use drivemirror_telemetry::{MetricsRegistry, MetricsServer};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Overrides the configuration file location
const CONFIG_ENV: &str = "DRIVEMIRROR_CONFIG";

// ============================================================================
// DaemonService
// ============================================================================

/// Owns the wired service graph for the lifetime of the process
struct DaemonService {
    config: Config,
    service: Arc<SyncService>,
    orchestrator: Arc<Orchestrator>,
    metrics: Arc<MetricsRegistry>,
    /// Kept so the pool outlives every task that borrows connections
    _db_pool: DatabasePool,
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Opens the store and builds the service graph
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let db_pool = DatabasePool::new(&config.database.path)
            .await
            .context("Failed to open mirror database")?;
        let store = Arc::new(SqliteMirrorStore::new(db_pool.pool().clone()));

        let vault = SecretBox::from_config(&config.vault).context("Failed to open vault")?;
        let lister =
            DriveLister::from_config(&config.drive).context("Failed to create Drive client")?;
        let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics")?);

        let service = Arc::new(
            SyncService::new(store, Arc::new(lister), Arc::new(vault), &config.sync)
                .with_metrics(Arc::clone(&metrics)),
        );
        let orchestrator = Orchestrator::new(Arc::clone(&service), config.scheduler.clone());

        Ok(Self {
            config,
            service,
            orchestrator,
            metrics,
            _db_pool: db_pool,
            shutdown,
        })
    }

    /// Runs until the shutdown token fires
    async fn run(&self) -> Result<()> {
        let metrics_task = self.spawn_metrics_server()?;

        self.orchestrator
            .start()
            .await
            .context("Failed to start orchestrator")?;
        let status = self.orchestrator.status();
        info!(
            accounts = status.scheduled_accounts.len(),
            "Orchestrator running"
        );

        self.shutdown.cancelled().await;
        info!("Shutting down");

        self.orchestrator.stop().await;
        self.service.shutdown();

        if let Some(task) = metrics_task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Metrics server failed"),
                Err(e) => warn!(error = %e, "Metrics server task panicked"),
            }
        }
        Ok(())
    }

    fn spawn_metrics_server(
        &self,
    ) -> Result<Option<tokio::task::JoinHandle<Result<()>>>> {
        let telemetry = &self.config.telemetry;
        if !telemetry.metrics_enabled {
            return Ok(None);
        }
        let server = MetricsServer::new(Arc::clone(&self.metrics), &telemetry.metrics_addr)
            .with_context(|| format!("Invalid metrics address {}", telemetry.metrics_addr))?;
        let shutdown = self.shutdown.clone();
        Ok(Some(tokio::spawn(async move { server.run(shutdown).await })))
    }
}

// ============================================================================
// Configuration and logging
// ============================================================================

fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path)
}

/// Loads the configuration; a missing file means defaults
fn load_config(path: &std::path::Path) -> Result<Config> {
    let config = if path.exists() {
        Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?
    } else {
        Config::default()
    };

    let errors = config.validate();
    if !errors.is_empty() {
        let listed: Vec<String> = errors.iter().map(ToString::to_string).collect();
        bail!(
            "Invalid configuration {}: {}",
            path.display(),
            listed.join("; ")
        );
    }
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);
    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let path = config_path();
    let config = load_config(&path)?;
    init_tracing(&config.logging);

    info!(config_path = %path.display(), "DriveMirror daemon starting (drivemirrord)");

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let daemon = DaemonService::new(config, shutdown_token).await?;
    let result = daemon.run().await;

    match &result {
        Ok(()) => info!("DriveMirror daemon shut down gracefully"),
        Err(e) => error!(error = %e, "DriveMirror daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
