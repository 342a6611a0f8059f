//! Shared fixtures for the sync integration tests
//!
//! Engines and the orchestrator run against an in-memory SQLite mirror
//! store and a scripted in-memory lister. Listings are keyed by scope and
//! page token; anything not scripted lists as an empty page.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drivemirror_cache::{DatabasePool, SqliteMirrorStore};
use drivemirror_core::config::{SchedulerConfig, ShareScope, SyncConfig};
use drivemirror_core::domain::{
    Account, AccountKey, AccountStatus, FileId, FileRecord, SyncCursor,
};
use drivemirror_core::ports::{
    AccountCredentials, ChangePage, ErrorClass, FilePage, ICredentialVault, IMirrorStore,
    IRemoteLister, ListScope, RemoteChange, RemoteFile,
};
use drivemirror_sync::{SyncService, SyncStatus};
use tokio::sync::Notify;

pub const FOLDER: &str = "application/vnd.google-apps.folder";

// ============================================================================
// Scripted lister
// ============================================================================

/// Error returned by the scripted lister
#[derive(Debug, thiserror::Error)]
#[error("scripted failure (retryable: {retryable})")]
pub struct ScriptedError {
    pub retryable: bool,
    pub retry_after: Option<Duration>,
}

impl ScriptedError {
    pub fn rate_limited() -> Self {
        Self {
            retryable: true,
            retry_after: Some(Duration::from_millis(10)),
        }
    }

    pub fn fatal() -> Self {
        Self {
            retryable: false,
            retry_after: None,
        }
    }
}

#[derive(Default)]
pub struct ScriptedLister {
    pages: Mutex<HashMap<(String, Option<String>), FilePage>>,
    changes: Mutex<HashMap<String, ChangePage>>,
    start_cursor: Mutex<String>,
    failures: Mutex<HashMap<String, VecDeque<ScriptedError>>>,
    calls: Mutex<Vec<String>>,
    secrets: Mutex<Vec<String>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

/// Key used to script and record a listing scope
pub fn scope_key(scope: &ListScope) -> String {
    match scope {
        ListScope::WholeDrive => "drive".to_string(),
        ListScope::ChildrenOf { folder_id } => format!("children:{folder_id}"),
        ListScope::ChildrenModifiedSince { folder_id, .. } => format!("modified:{folder_id}"),
    }
}

impl ScriptedLister {
    pub fn new() -> Arc<Self> {
        let lister = Self::default();
        *lister.start_cursor.lock().unwrap() = "start-1".to_string();
        Arc::new(lister)
    }

    /// Scripts one page of `scope` (by its [`scope_key`]) at `token`
    pub fn page(
        &self,
        scope: &str,
        token: Option<&str>,
        records: Vec<RemoteFile>,
        next: Option<&str>,
    ) {
        self.pages.lock().unwrap().insert(
            (scope.to_string(), token.map(str::to_string)),
            FilePage {
                records,
                next_page_token: next.map(str::to_string),
            },
        );
    }

    /// Scripts one change page read at `cursor`
    pub fn change_page(
        &self,
        cursor: &str,
        changes: Vec<RemoteChange>,
        next: Option<&str>,
        new_start: Option<&str>,
    ) {
        self.changes.lock().unwrap().insert(
            cursor.to_string(),
            ChangePage {
                changes,
                next_cursor: next.map(cursor_of),
                new_start_cursor: new_start.map(cursor_of),
            },
        );
    }

    pub fn set_start_cursor(&self, cursor: &str) {
        *self.start_cursor.lock().unwrap() = cursor.to_string();
    }

    /// The next call recorded as `call` fails with `error`
    ///
    /// Failures queue up per call, so scripting the same call twice fails
    /// it twice before it succeeds.
    pub fn fail_on(&self, call: &str, error: ScriptedError) {
        self.failures
            .lock()
            .unwrap()
            .entry(call.to_string())
            .or_default()
            .push_back(error);
    }

    /// The next call waits until the returned notify fires
    pub fn hold_next(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// True once a held call has reached the gate
    pub fn reached_gate(&self) -> bool {
        self.gate.lock().unwrap().is_none()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn secrets_seen(&self) -> Vec<String> {
        self.secrets.lock().unwrap().clone()
    }

    async fn enter(&self, credentials: &AccountCredentials, call: String) -> anyhow::Result<()> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.secrets.lock().unwrap().push(credentials.secret.clone());
        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&call)
            .and_then(VecDeque::pop_front);
        self.calls.lock().unwrap().push(call);
        match failure {
            Some(error) => Err(anyhow::Error::new(error).context("scripted request")),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl IRemoteLister for ScriptedLister {
    async fn list_page(
        &self,
        credentials: &AccountCredentials,
        scope: &ListScope,
        page_token: Option<&str>,
        _page_size: u32,
    ) -> anyhow::Result<FilePage> {
        let key = scope_key(scope);
        let mut call = format!("list {key}");
        if let ListScope::ChildrenModifiedSince {
            since,
            include_folders,
            ..
        } = scope
        {
            call.push_str(&format!(
                " since={} folders={include_folders}",
                since.format("%Y-%m-%dT%H:%M:%SZ")
            ));
        }
        if let Some(token) = page_token {
            call.push_str(&format!(" @{token}"));
        }
        self.enter(credentials, call).await?;

        let pages = self.pages.lock().unwrap();
        Ok(pages
            .get(&(key, page_token.map(str::to_string)))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_changes_page(
        &self,
        credentials: &AccountCredentials,
        cursor: &SyncCursor,
        _page_size: u32,
    ) -> anyhow::Result<ChangePage> {
        self.enter(credentials, format!("changes @{cursor}")).await?;

        let changes = self.changes.lock().unwrap();
        Ok(changes.get(cursor.as_str()).cloned().unwrap_or_else(|| ChangePage {
            changes: Vec::new(),
            next_cursor: None,
            new_start_cursor: Some(cursor.clone()),
        }))
    }

    async fn get_start_cursor(
        &self,
        credentials: &AccountCredentials,
    ) -> anyhow::Result<SyncCursor> {
        self.enter(credentials, "start_cursor".to_string()).await?;
        Ok(cursor_of(&self.start_cursor.lock().unwrap()))
    }

    fn classify_error(&self, error: &anyhow::Error) -> ErrorClass {
        match error.chain().find_map(|e| e.downcast_ref::<ScriptedError>()) {
            Some(e) if e.retryable => ErrorClass::retryable(e.retry_after),
            _ => ErrorClass::fatal(),
        }
    }
}

// ============================================================================
// Vault
// ============================================================================

/// Reversible stand-in for the secret box
pub struct PlainVault;

impl ICredentialVault for PlainVault {
    fn encrypt(&self, plaintext: &str) -> anyhow::Result<String> {
        Ok(format!("sealed:{plaintext}"))
    }

    fn decrypt(&self, blob: &str) -> anyhow::Result<String> {
        blob.strip_prefix("sealed:")
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("not a sealed blob"))
    }
}

// ============================================================================
// Store that fails reconciliation
// ============================================================================

/// Delegates to the SQLite store but reports every prune as a lock timeout
pub struct LockedPruneStore {
    inner: Arc<SqliteMirrorStore>,
}

impl LockedPruneStore {
    pub fn wrap(inner: Arc<SqliteMirrorStore>) -> Arc<dyn IMirrorStore> {
        Arc::new(Self { inner })
    }
}

#[async_trait]
impl IMirrorStore for LockedPruneStore {
    async fn insert_account(&self, account: &Account) -> anyhow::Result<()> {
        self.inner.insert_account(account).await
    }

    async fn get_account(&self, key: &AccountKey) -> anyhow::Result<Option<Account>> {
        self.inner.get_account(key).await
    }

    async fn list_accounts(&self) -> anyhow::Result<Vec<Account>> {
        self.inner.list_accounts().await
    }

    async fn list_accounts_by_status(
        &self,
        status: AccountStatus,
    ) -> anyhow::Result<Vec<Account>> {
        self.inner.list_accounts_by_status(status).await
    }

    async fn delete_account(&self, key: &AccountKey) -> anyhow::Result<bool> {
        self.inner.delete_account(key).await
    }

    async fn transition_status(
        &self,
        key: &AccountKey,
        from: &[AccountStatus],
        to: AccountStatus,
    ) -> anyhow::Result<bool> {
        self.inner.transition_status(key, from, to).await
    }

    async fn mark_synced(
        &self,
        key: &AccountKey,
        from: AccountStatus,
        started_at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        self.inner.mark_synced(key, from, started_at).await
    }

    async fn mark_failed(
        &self,
        key: &AccountKey,
        from: AccountStatus,
        reason: &str,
    ) -> anyhow::Result<bool> {
        self.inner.mark_failed(key, from, reason).await
    }

    async fn update_sync_cursor(&self, key: &AccountKey, cursor: &SyncCursor) -> anyhow::Result<()> {
        self.inner.update_sync_cursor(key, cursor).await
    }

    async fn reset_in_flight(&self, reason: &str) -> anyhow::Result<Vec<AccountKey>> {
        self.inner.reset_in_flight(reason).await
    }

    async fn apply_file_record(&self, key: &AccountKey, record: &FileRecord) -> anyhow::Result<()> {
        self.inner.apply_file_record(key, record).await
    }

    async fn remove_file(&self, key: &AccountKey, file_id: &FileId) -> anyhow::Result<bool> {
        self.inner.remove_file(key, file_id).await
    }

    async fn get_file(
        &self,
        key: &AccountKey,
        file_id: &FileId,
    ) -> anyhow::Result<Option<FileRecord>> {
        self.inner.get_file(key, file_id).await
    }

    async fn count_files(&self, key: &AccountKey) -> anyhow::Result<u64> {
        self.inner.count_files(key).await
    }

    async fn prune_files_not_seen_since(
        &self,
        _key: &AccountKey,
        _cutoff: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        Err(anyhow::anyhow!("database is locked"))
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub store: Arc<SqliteMirrorStore>,
    pub lister: Arc<ScriptedLister>,
    pub service: Arc<SyncService>,
}

pub fn test_sync_config() -> SyncConfig {
    SyncConfig {
        page_size: 100,
        page_delay_ms: 0,
        default_retry_after_secs: 1,
        max_backoff_secs: 1,
        watermark_overlap_secs: 60,
        share_scope: ShareScope::Subtree,
        reconcile_after_crawl: false,
    }
}

/// Long intervals: only the immediate first ticks fire during a test
pub fn test_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        oauth_interval_secs: 3600,
        sa_share_interval_secs: 3600,
        health_check_interval_secs: 3600,
    }
}

pub async fn harness() -> Harness {
    harness_with(test_sync_config()).await
}

pub async fn harness_with(config: SyncConfig) -> Harness {
    harness_layered(config, |store| store as Arc<dyn IMirrorStore>).await
}

/// Builds a harness whose service sees the store through `layer`
///
/// `Harness::store` stays the undecorated store, so assertions read the
/// real rows.
pub async fn harness_layered<F>(config: SyncConfig, layer: F) -> Harness
where
    F: FnOnce(Arc<SqliteMirrorStore>) -> Arc<dyn IMirrorStore>,
{
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let store = Arc::new(SqliteMirrorStore::new(pool.pool().clone()));
    let lister = ScriptedLister::new();
    let service = Arc::new(SyncService::new(
        layer(Arc::clone(&store)),
        Arc::clone(&lister) as Arc<dyn IRemoteLister>,
        Arc::new(PlainVault),
        &config,
    ));
    Harness {
        store,
        lister,
        service,
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn key(raw: &str) -> AccountKey {
    AccountKey::new(raw.to_string()).unwrap()
}

pub fn cursor_of(raw: &str) -> SyncCursor {
    SyncCursor::new(raw.to_string()).unwrap()
}

pub fn remote_file(id: &str, parent: &str) -> RemoteFile {
    RemoteFile {
        id: id.to_string(),
        name: format!("{id}.txt"),
        mime_type: "text/plain".to_string(),
        size: Some("1024".to_string()),
        md5_checksum: Some("5d41402abc4b2a76b9719d911017c592".to_string()),
        parents: vec![parent.to_string()],
        modified_time: Some("2024-05-01T12:00:00.000Z".to_string()),
        owned_by_me: true,
        owner_email: Some("owner@example.com".to_string()),
        ..Default::default()
    }
}

pub fn remote_folder(id: &str, parent: &str) -> RemoteFile {
    RemoteFile {
        mime_type: FOLDER.to_string(),
        size: None,
        md5_checksum: None,
        ..remote_file(id, parent)
    }
}

pub async fn add_oauth(h: &Harness, email: &str) -> AccountKey {
    let account = h
        .service
        .register_oauth_account(email, r#"{"refresh_token":"1//token"}"#)
        .await
        .unwrap();
    account.key().clone()
}

pub async fn add_share(h: &Harness, alias: &str, roots: &[&str]) -> AccountKey {
    let roots: Vec<String> = roots.iter().map(|r| r.to_string()).collect();
    let secret = r#"{"client_email":"sa@p.iam.gserviceaccount.com"}"#;
    let account = h
        .service
        .register_service_account(alias, secret, &roots)
        .await
        .unwrap();
    account.key().clone()
}

pub async fn status_of(h: &Harness, key: &AccountKey) -> SyncStatus {
    h.service.get_sync_status(key).await.unwrap()
}

/// Polls until `check` holds or five seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
