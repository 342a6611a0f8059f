//! Mirror store port (driven/secondary port)
//!
//! Durable storage for accounts and their mirrored file records.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific.
//! - Status changes go through compare-and-set methods that name the
//!   statuses they expect. They return `false` instead of failing when the
//!   account is not in one of them; that is how "one attempt in flight per
//!   account" is enforced without in-process locks.
//! - File writes are keyed by (file id, account key) and idempotent.

use chrono::{DateTime, Utc};

use crate::domain::{
    newtypes::{AccountKey, FileId, SyncCursor},
    Account, AccountStatus, FileRecord,
};

/// Durable accounts + files storage
#[async_trait::async_trait]
pub trait IMirrorStore: Send + Sync {
    // --- Accounts ---

    /// Inserts a new account. Fails if the key already exists.
    async fn insert_account(&self, account: &Account) -> anyhow::Result<()>;

    /// Loads one account
    async fn get_account(&self, key: &AccountKey) -> anyhow::Result<Option<Account>>;

    /// Loads every account, ordered by key
    async fn list_accounts(&self) -> anyhow::Result<Vec<Account>>;

    /// Loads the accounts currently in `status`, ordered by key
    async fn list_accounts_by_status(&self, status: AccountStatus)
        -> anyhow::Result<Vec<Account>>;

    /// Deletes an account and, by cascade, all of its file rows.
    /// Returns false if it did not exist.
    async fn delete_account(&self, key: &AccountKey) -> anyhow::Result<bool>;

    /// Atomically moves the account to `next` if its status is one of
    /// `expected`. Returns whether the transition happened.
    async fn transition_status(
        &self,
        key: &AccountKey,
        expected: &[AccountStatus],
        next: AccountStatus,
    ) -> anyhow::Result<bool>;

    /// `from -> idle`, stamping `last_sync_at` and clearing `last_error`
    async fn mark_synced(
        &self,
        key: &AccountKey,
        from: AccountStatus,
        synced_at: DateTime<Utc>,
    ) -> anyhow::Result<bool>;

    /// `from -> error`, recording `reason`
    async fn mark_failed(
        &self,
        key: &AccountKey,
        from: AccountStatus,
        reason: &str,
    ) -> anyhow::Result<bool>;

    /// Persists the change-feed cursor
    async fn update_sync_cursor(&self, key: &AccountKey, cursor: &SyncCursor)
        -> anyhow::Result<()>;

    /// Moves every account stuck in `crawling`/`syncing` to `error` with
    /// `reason`, returning their keys
    async fn reset_in_flight(&self, reason: &str) -> anyhow::Result<Vec<AccountKey>>;

    // --- Files ---

    /// Inserts or overwrites one file row
    async fn apply_file_record(&self, key: &AccountKey, record: &FileRecord)
        -> anyhow::Result<()>;

    /// Deletes one file row. Returns false if it was absent.
    async fn remove_file(&self, key: &AccountKey, file_id: &FileId) -> anyhow::Result<bool>;

    /// Loads one file row
    async fn get_file(&self, key: &AccountKey, file_id: &FileId)
        -> anyhow::Result<Option<FileRecord>>;

    /// Number of file rows for the account
    async fn count_files(&self, key: &AccountKey) -> anyhow::Result<u64>;

    /// Deletes the account's rows not applied since `cutoff`, returning how
    /// many were removed
    async fn prune_files_not_seen_since(
        &self,
        key: &AccountKey,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<u64>;
}
