//! Full crawl engine
//!
//! The [`CrawlEngine`] enumerates an account's whole visible scope and
//! upserts every record into the mirror.
//!
//! ## Crawl Flow
//!
//! - **OAuth**: capture a change-feed start cursor if the account has none,
//!   then list the whole drive page by page.
//! - **Service-account share**: list the children of each declared root;
//!   under `subtree` scope, discovered folders are walked breadth-first.
//!
//! The crawl is additive: it never deletes rows. Removing rows the crawl did
//! not see is the optional reconciliation pass run by the service.

use std::sync::Arc;

use anyhow::{Context, Result};
use drivemirror_core::{
    config::ShareScope,
    domain::{Account, AuthType},
    ports::{AccountCredentials, IMirrorStore, IRemoteLister, ListScope},
};
use drivemirror_telemetry::MetricsRegistry;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{attempt::AttemptRun, report::AttemptReport, settings::EngineSettings};

/// Full traversal of an account's scope
pub struct CrawlEngine {
    lister: Arc<dyn IRemoteLister>,
    store: Arc<dyn IMirrorStore>,
    settings: EngineSettings,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl CrawlEngine {
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

    /// Crawls `account`, recording progress in `report`
    ///
    /// Returns `Ok` both on completion and when `cancel` fired between
    /// pages (`report.interrupted` tells them apart).
    ///
    /// # Errors
    /// Returns the first fatal remote or store error.
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
            AuthType::Oauth => self.crawl_drive(&mut run, account).await?,
            AuthType::SaShare => {
                let descend = self.settings.share_scope == ShareScope::Subtree;
                run.walk_roots(account.root_folder_ids(), descend, |folder_id| {
                    ListScope::ChildrenOf { folder_id }
                })
                .await?
            }
        };

        if completed {
            info!(
                pages = report.pages,
                upserts = report.upserts,
                errors = report.errors.len(),
                "Crawl complete"
            );
        }
        Ok(())
    }

    async fn crawl_drive(&self, run: &mut AttemptRun<'_>, account: &Account) -> Result<bool> {
        if account.sync_cursor().is_none() {
            let lister = run.lister;
            let credentials = run.credentials;
            let Some(cursor) = run
                .fetch("get_start_cursor", || lister.get_start_cursor(credentials))
                .await?
            else {
                return Ok(false);
            };
            self.store
                .update_sync_cursor(account.key(), &cursor)
                .await
                .context("Failed to persist start cursor")?;
            info!(cursor = %cursor, "Captured change-feed cursor before crawl");
        }

        Ok(run.list_scope(&ListScope::WholeDrive).await?.is_some())
    }
}
