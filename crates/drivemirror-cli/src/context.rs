//! Shared wiring for commands that touch the mirror
//!
//! Commands run in-process against the same database the daemon uses. The
//! store serializes status changes, so a foreground attempt and a daemon
//! attempt on the same account still cannot overlap.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use drivemirror_cache::{DatabasePool, SqliteMirrorStore};
use drivemirror_core::config::Config;
use drivemirror_drive::{DriveLister, SecretBox};
use drivemirror_sync::SyncService;
use tracing::info;

/// Resolves the configuration file path
///
/// An explicit `--config` must exist; the default path may be absent.
pub fn load_config(explicit: Option<&Path>) -> Result<(PathBuf, Config)> {
    match explicit {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            Ok((path.to_path_buf(), config))
        }
        None => {
            let path = Config::default_path();
            let config = Config::load_or_default(&path);
            Ok((path, config))
        }
    }
}

/// Loaded configuration plus a ready [`SyncService`]
pub struct AppContext {
    pub config: Config,
    pub service: SyncService,
}

impl AppContext {
    /// Loads and validates the config, then opens the store and builds the
    /// service with the Drive lister and the secret box
    pub async fn open(config_path: Option<&Path>) -> Result<Self> {
        let (path, config) = load_config(config_path)?;
        let errors = config.validate();
        if !errors.is_empty() {
            let listed: Vec<String> = errors.iter().map(ToString::to_string).collect();
            bail!(
                "Invalid configuration {}: {}",
                path.display(),
                listed.join("; ")
            );
        }
        info!(config_path = %path.display(), "Loaded configuration");

        let pool = DatabasePool::new(&config.database.path)
            .await
            .context("Failed to open mirror database")?;
        let store = Arc::new(SqliteMirrorStore::new(pool.pool().clone()));
        let vault = SecretBox::from_config(&config.vault).context("Failed to open vault")?;
        let lister = DriveLister::from_config(&config.drive)
            .context("Failed to create Drive client")?;

        let service = SyncService::new(store, Arc::new(lister), Arc::new(vault), &config.sync);
        Ok(Self { config, service })
    }
}
