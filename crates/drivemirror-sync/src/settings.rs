//! Engine tuning derived from the `sync` configuration section

use std::time::Duration;

use drivemirror_core::config::{ShareScope, SyncConfig};

/// Paging, pacing and backoff knobs shared by both engines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub page_size: u32,
    /// Courtesy delay between successive page fetches
    pub page_delay: Duration,
    /// Backoff when a rate-limited response gave no Retry-After
    pub default_retry_after: Duration,
    /// Cap on any single backoff wait
    pub max_backoff: Duration,
    /// Subtracted from the service-account watermark
    pub watermark_overlap: Duration,
    pub share_scope: ShareScope,
}

impl EngineSettings {
    /// How long to wait before retrying, given the remote's suggestion
    pub fn backoff_for(&self, retry_after: Option<Duration>) -> Duration {
        retry_after
            .unwrap_or(self.default_retry_after)
            .min(self.max_backoff)
    }
}

impl From<&SyncConfig> for EngineSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            page_size: config.page_size,
            page_delay: Duration::from_millis(config.page_delay_ms),
            default_retry_after: Duration::from_secs(config.default_retry_after_secs),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
            watermark_overlap: Duration::from_secs(config.watermark_overlap_secs),
            share_scope: config.share_scope,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}
