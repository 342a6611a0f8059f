//! SQLite implementation of IMirrorStore
//!
//! This module provides the concrete SQLite-based implementation of the
//! mirror store port defined in drivemirror-core. It handles domain type
//! conversion and SQL query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type             | SQL Type | Strategy                                      |
//! |-------------------------|----------|-----------------------------------------------|
//! | AccountKey, FileId      | TEXT     | `.as_str()` / `::new()`                        |
//! | SyncCursor              | TEXT     | `.as_str()` / `SyncCursor::new()`              |
//! | AuthType, AccountStatus | TEXT     | `.as_str()` / `FromStr`                        |
//! | Vec<FileId>             | TEXT     | serde_json array                              |
//! | DateTime<Utc>           | TEXT     | fixed-width RFC 3339 (microseconds, `Z`)      |
//! | bool                    | INTEGER  | 0 / 1                                         |
//!
//! Timestamps are written with a fixed width so that SQL string comparison
//! orders them chronologically (`prune_files_not_seen_since` relies on it).

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use drivemirror_core::domain::{
    newtypes::{AccountKey, FileId, SyncCursor},
    Account, AccountStatus, AuthType, DomainError, FileRecord,
};
use drivemirror_core::ports::IMirrorStore;

use crate::CacheError;

/// SQLite-based implementation of the mirror store port
pub struct SqliteMirrorStore {
    pool: SqlitePool,
}

impl SqliteMirrorStore {
    /// Creates a new store over the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Format a timestamp for storage
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a DateTime<Utc> from an ISO 8601 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite's own datetime() format
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

/// Parse an optional DateTime<Utc> from an optional string
fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

fn domain_err(column: &str, e: DomainError) -> CacheError {
    CacheError::SerializationError(format!("Invalid {column}: {e}"))
}

fn encode_ids(ids: &[FileId]) -> Result<String, CacheError> {
    serde_json::to_string(ids).map_err(|e| CacheError::SerializationError(e.to_string()))
}

fn decode_ids(column: &str, raw: &str) -> Result<Vec<FileId>, CacheError> {
    serde_json::from_str(raw)
        .map_err(|e| CacheError::SerializationError(format!("Invalid {column} '{raw}': {e}")))
}

/// Builds `?, ?, ?` for an IN clause
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn account_from_row(row: &SqliteRow) -> Result<Account, CacheError> {
    let key_str: String = row.get("account_key");
    let auth_type_str: String = row.get("auth_type");
    let encrypted_secret: String = row.get("encrypted_secret");
    let roots_str: String = row.get("root_folder_ids");
    let cursor_str: Option<String> = row.get("sync_cursor");
    let status_str: String = row.get("status");
    let last_sync_str: Option<String> = row.get("last_sync_at");
    let last_error: Option<String> = row.get("last_error");
    let created_at_str: String = row.get("created_at");
    let updated_at_str: String = row.get("updated_at");

    let key = AccountKey::new(key_str).map_err(|e| domain_err("account_key", e))?;
    let auth_type: AuthType = auth_type_str
        .parse()
        .map_err(|e| domain_err("auth_type", e))?;
    let status: AccountStatus = status_str.parse().map_err(|e| domain_err("status", e))?;
    let root_folder_ids = decode_ids("root_folder_ids", &roots_str)?;
    let sync_cursor = cursor_str
        .filter(|c| !c.is_empty())
        .map(SyncCursor::new)
        .transpose()
        .map_err(|e| domain_err("sync_cursor", e))?;

    Ok(Account::restore(
        key,
        auth_type,
        encrypted_secret,
        root_folder_ids,
        sync_cursor,
        status,
        parse_optional_datetime(last_sync_str)?,
        last_error,
        parse_datetime(&created_at_str)?,
        parse_datetime(&updated_at_str)?,
    ))
}

fn file_from_row(row: &SqliteRow) -> Result<FileRecord, CacheError> {
    let id_str: String = row.get("id");
    let name: String = row.get("name");
    let mime_type: String = row.get("mime_type");
    let size: i64 = row.get("size");
    let content_hash: Option<String> = row.get("content_hash");
    let parents_str: String = row.get("parents");
    let modified_str: String = row.get("modified_time");
    let is_shortcut: bool = row.get("is_shortcut");
    let target_str: Option<String> = row.get("shortcut_target_id");
    let trashed: bool = row.get("trashed");
    let owned_by_me: bool = row.get("owned_by_me");
    let owner_email: Option<String> = row.get("owner_email");

    let id = FileId::new(id_str).map_err(|e| domain_err("file id", e))?;
    let target = target_str
        .map(FileId::new)
        .transpose()
        .map_err(|e| domain_err("shortcut_target_id", e))?;

    let mut record = FileRecord::new(id, name, mime_type, parse_datetime(&modified_str)?)
        .with_size(u64::try_from(size).unwrap_or(0))
        .with_content_hash(content_hash)
        .with_parents(decode_ids("parents", &parents_str)?)
        .with_trashed(trashed)
        .with_ownership(owned_by_me, owner_email);
    if is_shortcut || target.is_some() {
        record = record.with_shortcut_target(target);
    }
    Ok(record)
}

// ============================================================================
// IMirrorStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IMirrorStore for SqliteMirrorStore {
    // --- Accounts ---

    async fn insert_account(&self, account: &Account) -> anyhow::Result<()> {
        let key = account.key().as_str();
        let roots = encode_ids(account.root_folder_ids())?;

        let result = sqlx::query(
            "INSERT INTO accounts \
             (account_key, auth_type, encrypted_secret, root_folder_ids, sync_cursor, \
              status, last_sync_at, last_error, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(account_key) DO NOTHING",
        )
        .bind(key)
        .bind(account.auth_type().as_str())
        .bind(account.encrypted_secret())
        .bind(&roots)
        .bind(account.sync_cursor().map(|c| c.as_str()))
        .bind(account.status().as_str())
        .bind(account.last_sync_at().map(format_datetime))
        .bind(account.last_error())
        .bind(format_datetime(account.created_at()))
        .bind(format_datetime(account.updated_at()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CacheError::DuplicateAccount(key.to_string()).into());
        }

        tracing::debug!(account_key = %key, auth_type = %account.auth_type(), "Inserted account");
        Ok(())
    }

    async fn get_account(&self, key: &AccountKey) -> anyhow::Result<Option<Account>> {
        let row = sqlx::query("SELECT * FROM accounts WHERE account_key = ?")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(account_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_accounts(&self) -> anyhow::Result<Vec<Account>> {
        let rows = sqlx::query("SELECT * FROM accounts ORDER BY account_key")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| account_from_row(r).map_err(Into::into))
            .collect()
    }

    async fn list_accounts_by_status(
        &self,
        status: AccountStatus,
    ) -> anyhow::Result<Vec<Account>> {
        let rows = sqlx::query("SELECT * FROM accounts WHERE status = ? ORDER BY account_key")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| account_from_row(r).map_err(Into::into))
            .collect()
    }

    async fn delete_account(&self, key: &AccountKey) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE account_key = ?")
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        tracing::debug!(account_key = %key, deleted, "Deleted account");
        Ok(deleted)
    }

    async fn transition_status(
        &self,
        key: &AccountKey,
        expected: &[AccountStatus],
        next: AccountStatus,
    ) -> anyhow::Result<bool> {
        let legal: Vec<&str> = expected
            .iter()
            .filter(|from| from.can_transition_to(next))
            .map(|from| from.as_str())
            .collect();
        if legal.is_empty() {
            let from = expected
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join("|");
            return Err(DomainError::InvalidState {
                from,
                to: next.to_string(),
            }
            .into());
        }

        let sql = format!(
            "UPDATE accounts SET status = ?, updated_at = ? \
             WHERE account_key = ? AND status IN ({})",
            placeholders(legal.len())
        );
        let mut query = sqlx::query(&sql)
            .bind(next.as_str())
            .bind(format_datetime(Utc::now()))
            .bind(key.as_str());
        for from in &legal {
            query = query.bind(*from);
        }
        let result = query.execute(&self.pool).await?;

        let applied = result.rows_affected() == 1;
        tracing::trace!(account_key = %key, to = %next, applied, "Status compare-and-set");
        Ok(applied)
    }

    async fn mark_synced(
        &self,
        key: &AccountKey,
        from: AccountStatus,
        synced_at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        if !from.can_transition_to(AccountStatus::Idle) {
            return Err(DomainError::InvalidState {
                from: from.to_string(),
                to: AccountStatus::Idle.to_string(),
            }
            .into());
        }

        let result = sqlx::query(
            "UPDATE accounts SET status = 'idle', last_sync_at = ?, last_error = NULL, \
             updated_at = ? WHERE account_key = ? AND status = ?",
        )
        .bind(format_datetime(synced_at))
        .bind(format_datetime(Utc::now()))
        .bind(key.as_str())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_failed(
        &self,
        key: &AccountKey,
        from: AccountStatus,
        reason: &str,
    ) -> anyhow::Result<bool> {
        if !from.can_transition_to(AccountStatus::Error) {
            return Err(DomainError::InvalidState {
                from: from.to_string(),
                to: AccountStatus::Error.to_string(),
            }
            .into());
        }

        let result = sqlx::query(
            "UPDATE accounts SET status = 'error', last_error = ?, updated_at = ? \
             WHERE account_key = ? AND status = ?",
        )
        .bind(reason)
        .bind(format_datetime(Utc::now()))
        .bind(key.as_str())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_sync_cursor(
        &self,
        key: &AccountKey,
        cursor: &SyncCursor,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE accounts SET sync_cursor = ?, updated_at = ? WHERE account_key = ?")
            .bind(cursor.as_str())
            .bind(format_datetime(Utc::now()))
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;

        tracing::trace!(account_key = %key, cursor = %cursor, "Persisted sync cursor");
        Ok(())
    }

    async fn reset_in_flight(&self, reason: &str) -> anyhow::Result<Vec<AccountKey>> {
        let rows = sqlx::query(
            "UPDATE accounts SET status = 'error', last_error = ?, updated_at = ? \
             WHERE status IN ('crawling', 'syncing') RETURNING account_key",
        )
        .bind(reason)
        .bind(format_datetime(Utc::now()))
        .fetch_all(&self.pool)
        .await?;

        let mut keys = rows
            .iter()
            .map(|r| {
                let raw: String = r.get("account_key");
                AccountKey::new(raw).map_err(|e| anyhow::Error::from(domain_err("account_key", e)))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        keys.sort();
        Ok(keys)
    }

    // --- Files ---

    async fn apply_file_record(
        &self,
        key: &AccountKey,
        record: &FileRecord,
    ) -> anyhow::Result<()> {
        let now = format_datetime(Utc::now());
        let parents = encode_ids(record.parents())?;
        let size = i64::try_from(record.size()).unwrap_or(i64::MAX);

        sqlx::query(
            "INSERT INTO files \
             (id, account_key, name, mime_type, size, content_hash, parents, modified_time, \
              is_shortcut, shortcut_target_id, trashed, owned_by_me, owner_email, \
              seen_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id, account_key) DO UPDATE SET \
              name = excluded.name, \
              mime_type = excluded.mime_type, \
              size = excluded.size, \
              content_hash = excluded.content_hash, \
              parents = excluded.parents, \
              modified_time = excluded.modified_time, \
              is_shortcut = excluded.is_shortcut, \
              shortcut_target_id = excluded.shortcut_target_id, \
              trashed = excluded.trashed, \
              owned_by_me = excluded.owned_by_me, \
              owner_email = excluded.owner_email, \
              seen_at = excluded.seen_at, \
              updated_at = excluded.updated_at",
        )
        .bind(record.id().as_str())
        .bind(key.as_str())
        .bind(record.name())
        .bind(record.mime_type())
        .bind(size)
        .bind(record.content_hash())
        .bind(&parents)
        .bind(format_datetime(record.modified_time()))
        .bind(record.is_shortcut())
        .bind(record.shortcut_target_id().map(|t| t.as_str()))
        .bind(record.is_trashed())
        .bind(record.is_owned_by_me())
        .bind(record.owner_email())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        tracing::trace!(account_key = %key, file_id = %record.id(), "Applied file record");
        Ok(())
    }

    async fn remove_file(&self, key: &AccountKey, file_id: &FileId) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = ? AND account_key = ?")
            .bind(file_id.as_str())
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        tracing::trace!(account_key = %key, file_id = %file_id, removed, "Removed file");
        Ok(removed)
    }

    async fn get_file(
        &self,
        key: &AccountKey,
        file_id: &FileId,
    ) -> anyhow::Result<Option<FileRecord>> {
        let row = sqlx::query("SELECT * FROM files WHERE id = ? AND account_key = ?")
            .bind(file_id.as_str())
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(file_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn count_files(&self, key: &AccountKey) -> anyhow::Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files WHERE account_key = ?")
            .bind(key.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn prune_files_not_seen_since(
        &self,
        key: &AccountKey,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM files WHERE account_key = ? AND seen_at < ?")
            .bind(key.as_str())
            .bind(format_datetime(cutoff))
            .execute(&self.pool)
            .await?;

        let pruned = result.rows_affected();
        tracing::debug!(account_key = %key, pruned, "Pruned unseen files");
        Ok(pruned)
    }
}
