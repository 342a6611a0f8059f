//! Attempt reports and status snapshots

use chrono::{DateTime, Utc};
use drivemirror_core::domain::{
    Account, AccountKey, AccountStatus, AttemptId, AttemptKind, AuthType,
};
use serde::Serialize;

/// Summary of one crawl or incremental sync attempt
#[derive(Debug, Clone, Serialize)]
pub struct AttemptReport {
    pub attempt_id: AttemptId,
    pub account_key: AccountKey,
    pub kind: AttemptKind,
    /// Stamped into `last_sync_at` when the attempt succeeds
    pub started_at: DateTime<Utc>,
    /// Remote pages fetched
    pub pages: u32,
    /// File rows inserted or overwritten
    pub upserts: u64,
    /// File rows deleted by removal changes
    pub removals: u64,
    /// Rate-limited requests that were retried
    pub retries: u32,
    /// Rows deleted by the post-crawl reconciliation
    pub pruned: u64,
    /// Records that could not be applied (non-fatal)
    pub errors: Vec<String>,
    /// Stopped between pages by a shutdown
    pub interrupted: bool,
    /// Wall-clock duration of the attempt in milliseconds
    pub duration_ms: u64,
}

impl AttemptReport {
    pub fn new(account_key: AccountKey, kind: AttemptKind) -> Self {
        Self {
            attempt_id: AttemptId::new(),
            account_key,
            kind,
            started_at: Utc::now(),
            pages: 0,
            upserts: 0,
            removals: 0,
            retries: 0,
            pruned: 0,
            errors: Vec::new(),
            interrupted: false,
            duration_ms: 0,
        }
    }

    /// Records the elapsed time since `started_at`
    pub fn finish(&mut self) {
        self.duration_ms = (Utc::now() - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
    }

    /// True if every fetched record was applied
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && !self.interrupted
    }
}

/// Point-in-time view of an account, as returned by `get_sync_status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub account_key: AccountKey,
    pub auth_type: AuthType,
    pub status: AccountStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub file_count: u64,
}

impl SyncStatus {
    pub fn from_account(account: &Account, file_count: u64) -> Self {
        Self {
            account_key: account.key().clone(),
            auth_type: account.auth_type(),
            status: account.status(),
            last_sync_at: account.last_sync_at(),
            last_error: account.last_error().map(str::to_string),
            file_count,
        }
    }
}
