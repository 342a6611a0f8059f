//! Configuration module for DriveMirror.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for DriveMirror.
///
/// Every section is optional in the YAML file; missing sections and fields
/// take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub scheduler: SchedulerConfig,
    pub drive: DriveConfig,
    pub vault: VaultConfig,
    pub logging: LoggingConfig,
    pub telemetry: TelemetryConfig,
}

/// Mirror database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the SQLite file.
    pub path: PathBuf,
}

/// Which part of a shared root a service-account share mirrors.
///
/// The same value drives both the crawl and the incremental query, so the
/// two never disagree about what is in scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareScope {
    /// The roots and every folder below them.
    #[default]
    Subtree,
    /// Only the direct children of each root.
    DirectChildren,
}

/// Crawl / incremental sync behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Records requested per page (Drive accepts 1-1000).
    pub page_size: u32,
    /// Courtesy delay between successive page fetches, in milliseconds.
    pub page_delay_ms: u64,
    /// Wait before retrying a rate-limited request that gave no Retry-After.
    pub default_retry_after_secs: u64,
    /// Upper bound for any single backoff wait.
    pub max_backoff_secs: u64,
    /// Subtracted from `last_sync_at` in the service-account modified-time
    /// query to absorb clock skew between this host and Drive.
    pub watermark_overlap_secs: u64,
    /// Scope of service-account shares.
    pub share_scope: ShareScope,
    /// Delete rows a completed crawl did not see.
    pub reconcile_after_crawl: bool,
}

/// Per-account cadence and health checking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between attempts for OAuth accounts.
    pub oauth_interval_secs: u64,
    /// Seconds between attempts for service-account shares.
    pub sa_share_interval_secs: u64,
    /// Seconds between sweeps that restart accounts in `error`.
    pub health_check_interval_secs: u64,
}

/// Google Drive endpoints and client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Drive v3 REST base URL.
    pub api_base_url: String,
    /// OAuth token endpoint (refresh and JWT-bearer grants).
    pub token_url: String,
    /// OAuth client used for refresh-token exchange.
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: Option<String>,
    /// Process-wide request budget.
    pub requests_per_second: u32,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

/// Where the secret-box key comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Environment variable holding the passphrase; checked first.
    pub key_env: String,
    /// Keyring entry used when the variable is unset.
    pub keyring_service: String,
    pub keyring_user: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    pub format: LogFormat,
}

/// Prometheus endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub metrics_enabled: bool,
    /// Listen address of the `/metrics` endpoint.
    pub metrics_addr: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/drivemirror/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("drivemirror")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("drivemirror")
                .join("mirror.db"),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            page_delay_ms: 100,
            default_retry_after_secs: 5,
            max_backoff_secs: 300,
            watermark_overlap_secs: 60,
            share_scope: ShareScope::Subtree,
            reconcile_after_crawl: false,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            oauth_interval_secs: 300,
            sa_share_interval_secs: 1800,
            health_check_interval_secs: 600,
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.googleapis.com/drive/v3".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            oauth_client_id: None,
            oauth_client_secret: None,
            requests_per_second: 10,
            request_timeout_secs: 30,
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            key_env: "DRIVEMIRROR_VAULT_KEY".to_string(),
            keyring_service: "drivemirror".to_string(),
            keyring_user: "vault-key".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_addr: "127.0.0.1:9464".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.page_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Largest page Drive will return.
const MAX_PAGE_SIZE: u32 = 1000;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut positive = |field: &str, value: u64| {
            if value == 0 {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        };

        // --- scheduler / drive ---
        positive(
            "scheduler.oauth_interval_secs",
            self.scheduler.oauth_interval_secs,
        );
        positive(
            "scheduler.sa_share_interval_secs",
            self.scheduler.sa_share_interval_secs,
        );
        positive(
            "scheduler.health_check_interval_secs",
            self.scheduler.health_check_interval_secs,
        );
        positive(
            "drive.requests_per_second",
            u64::from(self.drive.requests_per_second),
        );
        positive(
            "drive.request_timeout_secs",
            self.drive.request_timeout_secs,
        );

        // --- sync ---
        if self.sync.page_size == 0 || self.sync.page_size > MAX_PAGE_SIZE {
            errors.push(ValidationError {
                field: "sync.page_size".into(),
                message: format!("must be between 1 and {MAX_PAGE_SIZE}"),
            });
        }
        if self.sync.max_backoff_secs < self.sync.default_retry_after_secs {
            errors.push(ValidationError {
                field: "sync.max_backoff_secs".into(),
                message: "must not be smaller than sync.default_retry_after_secs".into(),
            });
        }

        // --- drive ---
        for (field, url) in [
            ("drive.api_base_url", &self.drive.api_base_url),
            ("drive.token_url", &self.drive.token_url),
        ] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                errors.push(ValidationError {
                    field: field.into(),
                    message: format!("must be an http(s) URL, got '{url}'"),
                });
            }
        }

        // --- vault ---
        if self.vault.key_env.trim().is_empty() {
            errors.push(ValidationError {
                field: "vault.key_env".into(),
                message: "must not be empty".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}', expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        // --- telemetry ---
        if self.telemetry.metrics_addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError {
                field: "telemetry.metrics_addr".into(),
                message: format!(
                    "not a socket address: '{}'",
                    self.telemetry.metrics_addr
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use drivemirror_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .oauth_interval_secs(120)
///     .page_size(500)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- database ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.database.path = path;
        self
    }

    // --- sync ---

    pub fn page_size(mut self, n: u32) -> Self {
        self.config.sync.page_size = n;
        self
    }

    pub fn page_delay_ms(mut self, ms: u64) -> Self {
        self.config.sync.page_delay_ms = ms;
        self
    }

    pub fn default_retry_after_secs(mut self, secs: u64) -> Self {
        self.config.sync.default_retry_after_secs = secs;
        self
    }

    pub fn max_backoff_secs(mut self, secs: u64) -> Self {
        self.config.sync.max_backoff_secs = secs;
        self
    }

    pub fn share_scope(mut self, scope: ShareScope) -> Self {
        self.config.sync.share_scope = scope;
        self
    }

    pub fn reconcile_after_crawl(mut self, enabled: bool) -> Self {
        self.config.sync.reconcile_after_crawl = enabled;
        self
    }

    // --- scheduler ---

    pub fn oauth_interval_secs(mut self, secs: u64) -> Self {
        self.config.scheduler.oauth_interval_secs = secs;
        self
    }

    pub fn sa_share_interval_secs(mut self, secs: u64) -> Self {
        self.config.scheduler.sa_share_interval_secs = secs;
        self
    }

    pub fn health_check_interval_secs(mut self, secs: u64) -> Self {
        self.config.scheduler.health_check_interval_secs = secs;
        self
    }

    // --- drive ---

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.drive.api_base_url = url.into();
        self
    }

    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.config.drive.token_url = url.into();
        self
    }

    pub fn oauth_client(mut self, id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.config.drive.oauth_client_id = Some(id.into());
        self.config.drive.oauth_client_secret = Some(secret.into());
        self
    }

    pub fn requests_per_second(mut self, n: u32) -> Self {
        self.config.drive.requests_per_second = n;
        self
    }

    // --- logging / telemetry ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: LogFormat) -> Self {
        self.config.logging.format = format;
        self
    }

    pub fn metrics(mut self, enabled: bool, addr: impl Into<String>) -> Self {
        self.config.telemetry.metrics_enabled = enabled;
        self.config.telemetry.metrics_addr = addr.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
