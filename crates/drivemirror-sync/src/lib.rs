//! DriveMirror Sync - Mirror synchronization engines
//!
//! Provides:
//! - Full crawls of an account's visible scope
//! - Incremental sync (change feed for OAuth, modified-time watermark for
//!   service-account shares)
//! - Rate-limit backoff that resumes at the same page
//! - The account-facing service (registration, manual triggers, status)
//! - A per-account scheduler with health checks and restart recovery
//!
//! ## Modules
//!
//! - [`crawl`] - Full traversal engine
//! - [`incremental`] - Delta engine
//! - [`service`] - `SyncService`, the external interface
//! - [`orchestrator`] - Recurring per-account scheduling
//! - [`report`] - Attempt reports and status snapshots

mod attempt;
pub mod crawl;
pub mod incremental;
pub mod orchestrator;
pub mod report;
pub mod service;
pub mod settings;

pub use crawl::CrawlEngine;
pub use incremental::IncrementalSyncEngine;
pub use orchestrator::{Orchestrator, OrchestratorStatus};
pub use report::{AttemptReport, SyncStatus};
pub use service::{AttemptHandle, SyncService};
pub use settings::EngineSettings;

use drivemirror_core::domain::DomainError;
use thiserror::Error;

/// Errors surfaced by the sync service and orchestrator
#[derive(Debug, Error)]
pub enum SyncError {
    /// No account with this key is registered
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// The account already has a crawl or sync in flight
    #[error("Attempt already in progress for {0}")]
    AttemptInProgress(String),

    /// Registration with a key that is already taken
    #[error("Account already exists: {0}")]
    AccountExists(String),

    /// Invalid registration input
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] DomainError),

    /// The secret could not be sealed
    #[error("Credential error: {0}")]
    Credential(String),

    /// An attempt ran and failed; the account is now in `error`
    #[error("Attempt failed: {0}")]
    AttemptFailed(String),

    /// The mirror store could not be read or written
    #[error("Store error: {0:#}")]
    Store(anyhow::Error),
}
