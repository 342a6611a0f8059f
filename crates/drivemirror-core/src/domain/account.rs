//! Account domain entity
//!
//! This module defines the Account entity, one mirrored Google Drive
//! identity, together with its auth model and synchronization status
//! state machine.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    errors::DomainError,
    newtypes::{AccountKey, Email, FileId, SyncCursor},
};

/// How an account authenticates against Google Drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// Interactive OAuth consent; the whole drive is visible
    Oauth,
    /// Service account that was shared one or more root folders
    SaShare,
}

impl AuthType {
    /// Stable string form used in storage and output
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::Oauth => "oauth",
            AuthType::SaShare => "sa_share",
        }
    }
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oauth" => Ok(AuthType::Oauth),
            "sa_share" => Ok(AuthType::SaShare),
            other => Err(DomainError::UnknownVariant {
                kind: "auth type",
                value: other.to_string(),
            }),
        }
    }
}

/// Synchronization status of an account
///
/// ```text
///          ┌──────────► crawling ──┐
///   idle ──┤                       ├──► idle | error
///          └──────────► syncing ───┘
///   error ──► crawling | syncing
/// ```
///
/// `crawling` and `syncing` are the in-flight states; at most one attempt
/// per account may be in one of them at any time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// No attempt running
    #[default]
    Idle,
    /// A full crawl is in flight
    Crawling,
    /// An incremental sync is in flight
    Syncing,
    /// The last attempt failed fatally
    Error,
}

impl AccountStatus {
    /// All statuses, in declaration order
    pub const ALL: [AccountStatus; 4] = [
        AccountStatus::Idle,
        AccountStatus::Crawling,
        AccountStatus::Syncing,
        AccountStatus::Error,
    ];

    /// Returns true if `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: AccountStatus) -> bool {
        use AccountStatus::*;
        matches!(
            (self, next),
            (Idle, Crawling)
                | (Idle, Syncing)
                | (Crawling, Idle)
                | (Crawling, Error)
                | (Syncing, Idle)
                | (Syncing, Error)
                | (Error, Crawling)
                | (Error, Syncing)
        )
    }

    /// Stable string form used in storage and output
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Idle => "idle",
            AccountStatus::Crawling => "crawling",
            AccountStatus::Syncing => "syncing",
            AccountStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::UnknownVariant {
                kind: "account status",
                value: s.to_string(),
            })
    }
}

/// A mirrored Google Drive account
///
/// Holds identity, the encrypted credential blob, the declared scope
/// (service-account shares only) and the synchronization bookkeeping:
/// status, change-feed cursor and the time of the last successful attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Email (oauth) or alias (sa_share)
    key: AccountKey,
    /// Auth model
    auth_type: AuthType,
    /// Secret box output; only the credential vault can open it
    encrypted_secret: String,
    /// Declared root folders, ordered and de-duplicated (sa_share only)
    root_folder_ids: Vec<FileId>,
    /// Change-feed cursor (oauth only, None until first obtained)
    sync_cursor: Option<SyncCursor>,
    /// Current status
    status: AccountStatus,
    /// Start time of the most recent successful attempt
    last_sync_at: Option<DateTime<Utc>>,
    /// Reason for the most recent failure, cleared on success
    last_error: Option<String>,
    /// When this account was registered
    created_at: DateTime<Utc>,
    /// When this row last changed
    updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new OAuth account in `idle`
    pub fn new_oauth(email: Email, encrypted_secret: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: AccountKey::from(email),
            auth_type: AuthType::Oauth,
            encrypted_secret: encrypted_secret.into(),
            root_folder_ids: Vec::new(),
            sync_cursor: None,
            status: AccountStatus::Idle,
            last_sync_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a new service-account share in `idle`
    ///
    /// # Errors
    /// Returns `DomainError::ValidationFailed` if no root folder is given
    pub fn new_service_account(
        alias: AccountKey,
        encrypted_secret: impl Into<String>,
        root_folder_ids: Vec<FileId>,
    ) -> Result<Self, DomainError> {
        let root_folder_ids = dedup_roots(root_folder_ids);
        if root_folder_ids.is_empty() {
            return Err(DomainError::ValidationFailed(format!(
                "service account {alias} needs at least one root folder"
            )));
        }
        let now = Utc::now();
        Ok(Self {
            key: alias,
            auth_type: AuthType::SaShare,
            encrypted_secret: encrypted_secret.into(),
            root_folder_ids,
            sync_cursor: None,
            status: AccountStatus::Idle,
            last_sync_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Reconstitutes an Account from storage
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        key: AccountKey,
        auth_type: AuthType,
        encrypted_secret: String,
        root_folder_ids: Vec<FileId>,
        sync_cursor: Option<SyncCursor>,
        status: AccountStatus,
        last_sync_at: Option<DateTime<Utc>>,
        last_error: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            auth_type,
            encrypted_secret,
            root_folder_ids,
            sync_cursor,
            status,
            last_sync_at,
            last_error,
            created_at,
            updated_at,
        }
    }

    // --- Getters ---

    /// Returns the account key
    pub fn key(&self) -> &AccountKey {
        &self.key
    }

    /// Returns the auth model
    pub fn auth_type(&self) -> AuthType {
        self.auth_type
    }

    /// Returns the encrypted secret blob
    pub fn encrypted_secret(&self) -> &str {
        &self.encrypted_secret
    }

    /// Returns the declared root folders (empty for oauth)
    pub fn root_folder_ids(&self) -> &[FileId] {
        &self.root_folder_ids
    }

    /// Returns the stored change-feed cursor if any
    pub fn sync_cursor(&self) -> Option<&SyncCursor> {
        self.sync_cursor.as_ref()
    }

    /// Returns the current status
    pub fn status(&self) -> AccountStatus {
        self.status
    }

    /// Returns the last successful sync time if any
    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.last_sync_at
    }

    /// Returns the last failure reason if any
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns when the account was registered
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the account last changed
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// True until the first successful attempt; such accounts get a crawl
    pub fn needs_initial_crawl(&self) -> bool {
        self.last_sync_at.is_none()
    }
}

fn dedup_roots(roots: Vec<FileId>) -> Vec<FileId> {
    let mut seen = std::collections::HashSet::new();
    roots
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}
