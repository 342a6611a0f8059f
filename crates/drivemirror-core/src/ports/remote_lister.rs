//! Remote listing port (driven/secondary port)
//!
//! This module defines the interface the sync engines use to read file
//! metadata and change records from the remote drive.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because transport errors are adapter-specific;
//!   the adapter is asked to classify them again through
//!   [`IRemoteLister::classify_error`].
//! - [`RemoteFile`] is a port-level DTO carrying the raw field values.
//!   Engines map it to [`FileRecord`] with [`RemoteFile::into_record`], so a
//!   malformed field fails one record instead of the whole page.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    errors::DomainError,
    newtypes::{AccountKey, FileId, SyncCursor},
    AuthType, FileRecord,
};

// ============================================================================
// Credentials
// ============================================================================

/// Decrypted credential of one account, handed to the listing client
///
/// The secret is the vault's plaintext: a refresh-token document for
/// OAuth accounts, a service-account key document for sa_share accounts.
#[derive(Clone)]
pub struct AccountCredentials {
    pub account_key: AccountKey,
    pub auth_type: AuthType,
    pub secret: String,
}

impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("account_key", &self.account_key)
            .field("auth_type", &self.auth_type)
            .field("secret", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// Listing scopes and pages
// ============================================================================

/// Which files a `list_page` call enumerates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    /// Everything visible to the account
    WholeDrive,
    /// Direct children of a folder, not trashed
    ChildrenOf { folder_id: FileId },
    /// Direct children of a folder, not trashed, modified after `since`.
    /// With `include_folders`, sub-folders are returned regardless of their
    /// modified time so a subtree walk can descend into them.
    ChildrenModifiedSince {
        folder_id: FileId,
        since: DateTime<Utc>,
        include_folders: bool,
    },
}

/// A file as reported by the remote, before validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// Decimal byte count as sent on the wire
    pub size: Option<String>,
    pub md5_checksum: Option<String>,
    pub parents: Vec<String>,
    /// RFC 3339 timestamp as sent on the wire
    pub modified_time: Option<String>,
    pub shortcut_target_id: Option<String>,
    pub trashed: bool,
    pub owned_by_me: bool,
    pub owner_email: Option<String>,
}

impl RemoteFile {
    /// Validates the raw fields and builds the domain record
    ///
    /// # Errors
    /// Returns `DomainError::MalformedRecord` naming the offending field
    pub fn into_record(self) -> Result<FileRecord, DomainError> {
        let malformed = |id: &str, reason: String| DomainError::MalformedRecord {
            id: id.to_string(),
            reason,
        };

        let id = FileId::new(self.id.clone())
            .map_err(|e| malformed(&self.id, e.to_string()))?;

        let modified_raw = self
            .modified_time
            .as_deref()
            .ok_or_else(|| malformed(&self.id, "missing modifiedTime".to_string()))?;
        let modified_time = DateTime::parse_from_rfc3339(modified_raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| malformed(&self.id, format!("bad modifiedTime {modified_raw:?}: {e}")))?;

        let size = match self.size.as_deref() {
            None | Some("") => 0,
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| malformed(&self.id, format!("size is not a byte count: {raw:?}")))?,
        };

        let parents = self
            .parents
            .into_iter()
            .map(FileId::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| malformed(&self.id, e.to_string()))?;

        let shortcut_target = self
            .shortcut_target_id
            .map(FileId::new)
            .transpose()
            .map_err(|e| malformed(&self.id, e.to_string()))?;

        Ok(FileRecord::new(id, self.name, self.mime_type, modified_time)
            .with_size(size)
            .with_content_hash(self.md5_checksum)
            .with_parents(parents)
            .with_shortcut_target(shortcut_target)
            .with_trashed(self.trashed)
            .with_ownership(self.owned_by_me, self.owner_email))
    }
}

/// One page of a file listing
#[derive(Debug, Clone, Default)]
pub struct FilePage {
    pub records: Vec<RemoteFile>,
    /// Token for the next page (None on the last page)
    pub next_page_token: Option<String>,
}

// ============================================================================
// Change feed
// ============================================================================

/// A single change-feed entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteChange {
    /// The file is gone from the account's view
    Removed { file_id: String },
    /// The file was created or modified; carries the full record
    Upserted(RemoteFile),
}

/// One page of the change feed
#[derive(Debug, Clone, Default)]
pub struct ChangePage {
    pub changes: Vec<RemoteChange>,
    /// Cursor for the next page of this pass (None when exhausted)
    pub next_cursor: Option<SyncCursor>,
    /// Cursor to store for the next pass (present on the last page)
    pub new_start_cursor: Option<SyncCursor>,
}

// ============================================================================
// Error classification
// ============================================================================

/// How the engines should react to a remote error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorClass {
    /// True for rate-limit and quota errors
    pub retryable: bool,
    /// Suggested wait before retrying, if the remote gave one
    pub retry_after: Option<Duration>,
}

impl ErrorClass {
    /// A retryable error with the given suggested wait
    pub fn retryable(retry_after: Option<Duration>) -> Self {
        Self {
            retryable: true,
            retry_after,
        }
    }

    /// A fatal error
    pub fn fatal() -> Self {
        Self {
            retryable: false,
            retry_after: None,
        }
    }
}

// ============================================================================
// IRemoteLister trait
// ============================================================================

/// Read-only access to a remote drive's metadata
#[async_trait::async_trait]
pub trait IRemoteLister: Send + Sync {
    /// Fetches one page of files in `scope`
    async fn list_page(
        &self,
        credentials: &AccountCredentials,
        scope: &ListScope,
        page_token: Option<&str>,
        page_size: u32,
    ) -> anyhow::Result<FilePage>;

    /// Fetches one page of the change feed starting at `cursor`
    async fn list_changes_page(
        &self,
        credentials: &AccountCredentials,
        cursor: &SyncCursor,
        page_size: u32,
    ) -> anyhow::Result<ChangePage>;

    /// Obtains a cursor pointing at "now" in the change feed
    async fn get_start_cursor(&self, credentials: &AccountCredentials)
        -> anyhow::Result<SyncCursor>;

    /// Classifies an error returned by one of the methods above
    fn classify_error(&self, error: &anyhow::Error) -> ErrorClass;
}
