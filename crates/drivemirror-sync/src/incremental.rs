//! Incremental sync engine
//!
//! Applies what changed since the last successful attempt:
//!
//! - **OAuth** consumes the change feed from the stored cursor. Removals
//!   delete rows, everything else is upserted. A fresh start cursor is
//!   persisted as soon as a page carries one.
//! - **Service-account shares** have no change feed. Each root (and, under
//!   `subtree` scope, each sub-folder) is listed for files modified after
//!   the watermark. Deletions are not detected this way.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use drivemirror_core::{
    config::ShareScope,
    domain::{Account, AuthType, SyncCursor},
    ports::{AccountCredentials, IMirrorStore, IRemoteLister, ListScope, RemoteChange},
};
use drivemirror_telemetry::MetricsRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{attempt::AttemptRun, report::AttemptReport, settings::EngineSettings};

/// Delta application for one account
pub struct IncrementalSyncEngine {
    lister: Arc<dyn IRemoteLister>,
    store: Arc<dyn IMirrorStore>,
    settings: EngineSettings,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl IncrementalSyncEngine {
    pub fn new(
        lister: Arc<dyn IRemoteLister>,
        store: Arc<dyn IMirrorStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            lister,
            store,
            settings,
            metrics: None,
        }
    }

    /// Attaches a metrics registry
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Lower bound of the modified-time query for a service-account share
    ///
    /// Never-synced shares start from the epoch.
    pub fn watermark(&self, last_sync_at: Option<DateTime<Utc>>) -> DateTime<Utc> {
        match last_sync_at {
            Some(at) => {
                let overlap = chrono::Duration::seconds(
                    self.settings.watermark_overlap.as_secs() as i64,
                );
                (at - overlap).max(DateTime::<Utc>::UNIX_EPOCH)
            }
            None => DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Runs one incremental pass for `account`
    ///
    /// Returns `Ok` both on completion and when `cancel` fired between
    /// pages (`report.interrupted` tells them apart).
    ///
    /// # Errors
    /// Returns the first fatal remote error, or a failure to persist the
    /// change-feed cursor.
    #[tracing::instrument(
        skip(self, account, credentials, cancel, report),
        fields(account_key = %account.key())
    )]
    pub async fn run(
        &self,
        account: &Account,
        credentials: &AccountCredentials,
        cancel: &CancellationToken,
        report: &mut AttemptReport,
    ) -> Result<()> {
        let mut run = AttemptRun::new(
            self.lister.as_ref(),
            self.store.as_ref(),
            &self.settings,
            self.metrics.as_deref(),
            credentials,
            cancel,
            report,
        );

        let completed = match account.auth_type() {
            AuthType::Oauth => self.apply_change_feed(&mut run, account).await?,
            AuthType::SaShare => {
                let since = self.watermark(account.last_sync_at());
                let descend = self.settings.share_scope == ShareScope::Subtree;
                debug!(%since, descend, "Listing share changes");
                run.walk_roots(account.root_folder_ids(), descend, |folder_id| {
                    ListScope::ChildrenModifiedSince {
                        folder_id,
                        since,
                        include_folders: descend,
                    }
                })
                .await?
            }
        };

        if completed {
            info!(
                pages = report.pages,
                upserts = report.upserts,
                removals = report.removals,
                errors = report.errors.len(),
                "Incremental sync complete"
            );
        }
        Ok(())
    }

    async fn apply_change_feed(
        &self,
        run: &mut AttemptRun<'_>,
        account: &Account,
    ) -> Result<bool> {
        let lister = run.lister;
        let credentials = run.credentials;
        let page_size = self.settings.page_size;

        let mut cursor = match account.sync_cursor() {
            Some(cursor) => cursor.clone(),
            None => {
                let Some(cursor) = run
                    .fetch("get_start_cursor", || lister.get_start_cursor(credentials))
                    .await?
                else {
                    return Ok(false);
                };
                self.persist_cursor(account, &cursor).await?;
                cursor
            }
        };

        loop {
            let current = cursor.clone();
            let Some(page) = run
                .fetch("list_changes_page", || {
                    lister.list_changes_page(credentials, &current, page_size)
                })
                .await?
            else {
                return Ok(false);
            };
            run.page_fetched();

            debug!(
                changes = page.changes.len(),
                has_more = page.next_cursor.is_some(),
                "Applying change page"
            );

            for change in page.changes {
                match change {
                    RemoteChange::Removed { file_id } => run.remove(file_id).await,
                    RemoteChange::Upserted(remote) => {
                        run.upsert(remote).await;
                    }
                }
            }

            if let Some(start) = &page.new_start_cursor {
                self.persist_cursor(account, start).await?;
            }

            match page.next_cursor {
                Some(next) => cursor = next,
                None => return Ok(true),
            }
        }
    }

    async fn persist_cursor(&self, account: &Account, cursor: &SyncCursor) -> Result<()> {
        self.store
            .update_sync_cursor(account.key(), cursor)
            .await
            .context("Failed to persist change-feed cursor")?;
        debug!(cursor = %cursor, "Persisted change-feed cursor");
        Ok(())
    }
}
