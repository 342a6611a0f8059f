//! Account-facing sync service
//!
//! [`SyncService`] is the external interface of the sync crate: account
//! registration and removal, manual crawl/sync triggers and status queries.
//! It also owns the attempt lifecycle shared with the orchestrator:
//!
//! 1. Claim the account with a status compare-and-set
//!    (`idle|error -> crawling|syncing`)
//! 2. Decrypt the secret and run the engine
//! 3. Settle the status: `idle` + `last_sync_at` on success, plain `idle`
//!    when interrupted by shutdown, `error` + reason on any failure after
//!    the claim (including a failed reconcile or status write)

use std::sync::Arc;

use anyhow::Context;
use drivemirror_core::{
    config::SyncConfig,
    domain::{Account, AccountKey, AccountStatus, AttemptKind, Email, FileId},
    ports::{AccountCredentials, ICredentialVault, IMirrorStore, IRemoteLister},
};
use drivemirror_telemetry::MetricsRegistry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    crawl::CrawlEngine, incremental::IncrementalSyncEngine, report::AttemptReport,
    report::SyncStatus, settings::EngineSettings, SyncError,
};

/// Statuses a manual trigger may start from
const STARTABLE: [AccountStatus; 2] = [AccountStatus::Idle, AccountStatus::Error];

/// Handle to a manually triggered attempt
pub type AttemptHandle = JoinHandle<Result<AttemptReport, SyncError>>;

fn store_error(e: anyhow::Error) -> SyncError {
    SyncError::Store(e)
}

/// Registration, triggers and status for all accounts
pub struct SyncService {
    store: Arc<dyn IMirrorStore>,
    vault: Arc<dyn ICredentialVault>,
    crawl: CrawlEngine,
    incremental: IncrementalSyncEngine,
    reconcile_after_crawl: bool,
    metrics: Option<Arc<MetricsRegistry>>,
    /// Parent of the tokens handed to manually triggered attempts
    shutdown: CancellationToken,
}

impl SyncService {
    /// Creates a new `SyncService`
    ///
    /// # Arguments
    /// * `store` - Durable accounts and file rows
    /// * `lister` - Remote listing client
    /// * `vault` - Decrypts stored account secrets
    /// * `config` - The `sync` configuration section
    pub fn new(
        store: Arc<dyn IMirrorStore>,
        lister: Arc<dyn IRemoteLister>,
        vault: Arc<dyn ICredentialVault>,
        config: &SyncConfig,
    ) -> Self {
        let settings = EngineSettings::from(config);
        Self {
            crawl: CrawlEngine::new(Arc::clone(&lister), Arc::clone(&store), settings.clone()),
            incremental: IncrementalSyncEngine::new(lister, Arc::clone(&store), settings),
            store,
            vault,
            reconcile_after_crawl: config.reconcile_after_crawl,
            metrics: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Attaches a metrics registry to the service and both engines
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.crawl = self.crawl.with_metrics(Arc::clone(&metrics));
        self.incremental = self.incremental.with_metrics(Arc::clone(&metrics));
        self.metrics = Some(metrics);
        self
    }

    /// Overrides `sync.reconcile_after_crawl`
    pub fn with_reconcile_after_crawl(mut self, enabled: bool) -> Self {
        self.reconcile_after_crawl = enabled;
        self
    }

    pub fn store(&self) -> &Arc<dyn IMirrorStore> {
        &self.store
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsRegistry>> {
        self.metrics.as_ref()
    }

    /// Interrupts manually triggered attempts at their next page boundary
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Registers an OAuth account keyed by its email
    ///
    /// `secret` is the refresh-token document; it is sealed before storage.
    pub async fn register_oauth_account(
        &self,
        email: &str,
        secret: &str,
    ) -> Result<Account, SyncError> {
        let email = Email::new(email.to_string())?;
        let key = AccountKey::from(email.clone());
        self.ensure_absent(&key).await?;

        let account = Account::new_oauth(email, self.seal(secret)?);
        self.insert(account).await
    }

    /// Registers a service-account share under `alias`
    ///
    /// `secret` is the service-account key document; `root_folder_ids` are
    /// the folders shared with it (duplicates are dropped, order kept).
    pub async fn register_service_account(
        &self,
        alias: &str,
        secret: &str,
        root_folder_ids: &[String],
    ) -> Result<Account, SyncError> {
        let key = AccountKey::new(alias.to_string())?;
        let roots = root_folder_ids
            .iter()
            .map(|id| FileId::new(id.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        self.ensure_absent(&key).await?;

        let account = Account::new_service_account(key, self.seal(secret)?, roots)?;
        self.insert(account).await
    }

    fn seal(&self, secret: &str) -> Result<String, SyncError> {
        if secret.trim().is_empty() {
            return Err(SyncError::Credential("secret must not be empty".to_string()));
        }
        self.vault
            .encrypt(secret)
            .map_err(|e| SyncError::Credential(format!("{e:#}")))
    }

    async fn ensure_absent(&self, key: &AccountKey) -> Result<(), SyncError> {
        match self.store.get_account(key).await.map_err(store_error)? {
            Some(_) => Err(SyncError::AccountExists(key.to_string())),
            None => Ok(()),
        }
    }

    async fn insert(&self, account: Account) -> Result<Account, SyncError> {
        self.store
            .insert_account(&account)
            .await
            .map_err(store_error)?;
        info!(
            account_key = %account.key(),
            auth_type = %account.auth_type(),
            roots = account.root_folder_ids().len(),
            "Registered account"
        );
        Ok(account)
    }

    /// Deletes an account and all of its mirrored rows
    pub async fn delete_account(&self, key: &AccountKey) -> Result<(), SyncError> {
        if !self.store.delete_account(key).await.map_err(store_error)? {
            return Err(SyncError::AccountNotFound(key.to_string()));
        }
        info!(account_key = %key, "Deleted account and its mirrored files");
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_account(&self, key: &AccountKey) -> Result<Account, SyncError> {
        self.store
            .get_account(key)
            .await
            .map_err(store_error)?
            .ok_or_else(|| SyncError::AccountNotFound(key.to_string()))
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, SyncError> {
        self.store.list_accounts().await.map_err(store_error)
    }

    /// Status, last success, last error and row count of one account
    pub async fn get_sync_status(&self, key: &AccountKey) -> Result<SyncStatus, SyncError> {
        let account = self.get_account(key).await?;
        let file_count = self.store.count_files(key).await.map_err(store_error)?;
        Ok(SyncStatus::from_account(&account, file_count))
    }

    // ========================================================================
    // Triggers
    // ========================================================================

    /// Starts a full crawl in the background
    ///
    /// # Errors
    /// `AccountNotFound` for an unknown key, `AttemptInProgress` if an
    /// attempt is already running. Failures of the crawl itself are recorded
    /// on the account and returned through the handle.
    pub async fn trigger_crawl(
        self: &Arc<Self>,
        key: &AccountKey,
    ) -> Result<AttemptHandle, SyncError> {
        self.trigger(key, AttemptKind::Crawl).await
    }

    /// Starts an incremental sync in the background
    ///
    /// Same errors as [`SyncService::trigger_crawl`].
    pub async fn trigger_incremental_sync(
        self: &Arc<Self>,
        key: &AccountKey,
    ) -> Result<AttemptHandle, SyncError> {
        self.trigger(key, AttemptKind::Incremental).await
    }

    async fn trigger(
        self: &Arc<Self>,
        key: &AccountKey,
        kind: AttemptKind,
    ) -> Result<AttemptHandle, SyncError> {
        let Some(account) = self.claim(key, &STARTABLE, kind).await? else {
            return match self.store.get_account(key).await.map_err(store_error)? {
                Some(_) => Err(SyncError::AttemptInProgress(key.to_string())),
                None => Err(SyncError::AccountNotFound(key.to_string())),
            };
        };

        let service = Arc::clone(self);
        let cancel = self.shutdown.child_token();
        Ok(tokio::spawn(async move {
            service.execute_attempt(account, kind, cancel).await
        }))
    }

    /// Runs one scheduled attempt to completion
    ///
    /// The kind is a crawl until the account has synced once, incremental
    /// afterwards. Returns `Ok(None)` without doing anything when the account
    /// is not in one of the `from` statuses (e.g. a manual attempt is
    /// running).
    pub async fn run_scheduled_attempt(
        &self,
        key: &AccountKey,
        from: &[AccountStatus],
        cancel: CancellationToken,
    ) -> Result<Option<AttemptReport>, SyncError> {
        let account = self.get_account(key).await?;
        let kind = if account.needs_initial_crawl() {
            AttemptKind::Crawl
        } else {
            AttemptKind::Incremental
        };

        match self.claim(key, from, kind).await? {
            Some(account) => self.execute_attempt(account, kind, cancel).await.map(Some),
            None => {
                debug!(
                    account_key = %key,
                    status = %account.status(),
                    "Skipping tick; account busy"
                );
                Ok(None)
            }
        }
    }

    /// Moves the account in flight and reloads it
    ///
    /// Returns `None` if the compare-and-set did not match.
    async fn claim(
        &self,
        key: &AccountKey,
        from: &[AccountStatus],
        kind: AttemptKind,
    ) -> Result<Option<Account>, SyncError> {
        let claimed = self
            .store
            .transition_status(key, from, kind.in_flight_status())
            .await
            .map_err(store_error)?;
        if !claimed {
            return Ok(None);
        }
        // Reload so the engine sees the cursor and watermark as stored
        self.get_account(key).await.map(Some)
    }

    // ========================================================================
    // Attempt execution
    // ========================================================================

    async fn execute_attempt(
        &self,
        account: Account,
        kind: AttemptKind,
        cancel: CancellationToken,
    ) -> Result<AttemptReport, SyncError> {
        let key = account.key().clone();
        let in_flight = kind.in_flight_status();
        let mut report = AttemptReport::new(key.clone(), kind);
        info!(
            account_key = %key,
            kind = %kind,
            attempt_id = %report.attempt_id,
            "Starting attempt"
        );

        let outcome = self.run_engine(&account, kind, &cancel, &mut report).await;
        report.finish();
        let outcome = match outcome {
            Ok(()) => self.settle(&key, kind, &mut report).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(label) => {
                self.record_outcome(&report, label);
                Ok(report)
            }
            Err(e) => {
                // Must leave the account claimable
                let reason = format!("{e:#}");
                error!(account_key = %key, kind = %kind, error = %reason, "Attempt failed");
                if let Err(store_err) = self.store.mark_failed(&key, in_flight, &reason).await {
                    error!(
                        account_key = %key,
                        error = %format!("{store_err:#}"),
                        "Failed to record attempt failure"
                    );
                }
                self.record_outcome(&report, "failed");
                Err(SyncError::AttemptFailed(reason))
            }
        }
    }

    /// Writes the final status of an attempt whose engine returned cleanly
    ///
    /// Returns the outcome label for metrics.
    async fn settle(
        &self,
        key: &AccountKey,
        kind: AttemptKind,
        report: &mut AttemptReport,
    ) -> anyhow::Result<&'static str> {
        let in_flight = kind.in_flight_status();
        if report.interrupted {
            self.store
                .transition_status(key, &[in_flight], AccountStatus::Idle)
                .await
                .context("Failed to release interrupted attempt")?;
            return Ok("interrupted");
        }

        if kind == AttemptKind::Crawl && self.reconcile_after_crawl {
            self.reconcile(report)
                .await
                .context("Failed to reconcile mirror after crawl")?;
        }
        let settled = self
            .store
            .mark_synced(key, in_flight, report.started_at)
            .await
            .context("Failed to record attempt success")?;
        if !settled {
            warn!(account_key = %key, "Account left {in_flight} during the attempt");
        }
        info!(
            account_key = %key,
            kind = %kind,
            duration_ms = report.duration_ms,
            record_errors = report.errors.len(),
            "Attempt succeeded"
        );
        Ok("success")
    }

    async fn run_engine(
        &self,
        account: &Account,
        kind: AttemptKind,
        cancel: &CancellationToken,
        report: &mut AttemptReport,
    ) -> anyhow::Result<()> {
        let secret = self
            .vault
            .decrypt(account.encrypted_secret())
            .context("Failed to decrypt account secret")?;
        let credentials = AccountCredentials {
            account_key: account.key().clone(),
            auth_type: account.auth_type(),
            secret,
        };

        match kind {
            AttemptKind::Crawl => self.crawl.run(account, &credentials, cancel, report).await,
            AttemptKind::Incremental => {
                self.incremental
                    .run(account, &credentials, cancel, report)
                    .await
            }
        }
    }

    /// Deletes rows a clean crawl did not touch
    async fn reconcile(&self, report: &mut AttemptReport) -> anyhow::Result<()> {
        if !report.is_clean() {
            warn!(
                account_key = %report.account_key,
                record_errors = report.errors.len(),
                "Skipping reconciliation after crawl with record errors"
            );
            return Ok(());
        }

        let pruned = self
            .store
            .prune_files_not_seen_since(&report.account_key, report.started_at)
            .await?;
        report.pruned = pruned;
        if let Some(metrics) = &self.metrics {
            metrics.record_pruned(pruned);
        }
        info!(account_key = %report.account_key, pruned, "Reconciled mirror after crawl");
        Ok(())
    }

    fn record_outcome(&self, report: &AttemptReport, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_attempt(
                report.kind.as_str(),
                outcome,
                report.duration_ms as f64 / 1000.0,
            );
        }
    }
}
