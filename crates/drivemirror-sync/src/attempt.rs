//! Per-attempt paging machinery shared by both engines
//!
//! An [`AttemptRun`] owns the mutable state of one running attempt: the
//! report, whether a page has been fetched yet (for the courtesy delay) and
//! the cancellation token. Pages are fetched and applied strictly one after
//! the other.

use std::collections::{HashSet, VecDeque};
use std::future::Future;

use drivemirror_core::{
    domain::{FileId, FileRecord},
    ports::{AccountCredentials, IMirrorStore, IRemoteLister, ListScope, RemoteFile},
};
use drivemirror_telemetry::MetricsRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{report::AttemptReport, settings::EngineSettings};

pub(crate) struct AttemptRun<'a> {
    pub lister: &'a dyn IRemoteLister,
    pub store: &'a dyn IMirrorStore,
    pub settings: &'a EngineSettings,
    pub metrics: Option<&'a MetricsRegistry>,
    pub credentials: &'a AccountCredentials,
    pub cancel: &'a CancellationToken,
    pub report: &'a mut AttemptReport,
    fetched_any: bool,
}

impl<'a> AttemptRun<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lister: &'a dyn IRemoteLister,
        store: &'a dyn IMirrorStore,
        settings: &'a EngineSettings,
        metrics: Option<&'a MetricsRegistry>,
        credentials: &'a AccountCredentials,
        cancel: &'a CancellationToken,
        report: &'a mut AttemptReport,
    ) -> Self {
        Self {
            lister,
            store,
            settings,
            metrics,
            credentials,
            cancel,
            report,
            fetched_any: false,
        }
    }

    /// Marks the attempt interrupted; always returns `None` for chaining
    fn interrupt<T>(&mut self) -> Option<T> {
        if !self.report.interrupted {
            info!(
                account_key = %self.report.account_key,
                pages = self.report.pages,
                "Attempt interrupted by shutdown"
            );
        }
        self.report.interrupted = true;
        None
    }

    /// Sleeps for `duration` unless cancelled first; false when cancelled
    async fn pause(&self, duration: std::time::Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.cancel.cancelled() => false,
        }
    }

    /// Fetches one page, honoring the courtesy delay and retrying rate limits
    ///
    /// Returns `Ok(None)` if the attempt was cancelled before the page could
    /// be fetched. Fatal errors are returned as-is. Retries are unbounded and
    /// always repeat the same request.
    pub async fn fetch<T, F, Fut>(
        &mut self,
        operation: &str,
        mut request: F,
    ) -> anyhow::Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Ok(self.interrupt());
        }
        if self.fetched_any && !self.settings.page_delay.is_zero() {
            let delay = self.settings.page_delay;
            if !self.pause(delay).await {
                return Ok(self.interrupt());
            }
        }
        self.fetched_any = true;

        let mut attempt: u32 = 0;
        loop {
            match request().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(operation, attempt, "Request succeeded after retry");
                    }
                    return Ok(Some(value));
                }
                Err(e) => {
                    let class = self.lister.classify_error(&e);
                    if !class.retryable {
                        return Err(e);
                    }

                    let wait = self.settings.backoff_for(class.retry_after);
                    attempt += 1;
                    self.report.retries += 1;
                    if let Some(metrics) = self.metrics {
                        metrics.record_retry(self.report.kind.as_str());
                    }
                    info!(
                        operation,
                        attempt,
                        retry_after_ms = wait.as_millis() as u64,
                        error = %e,
                        "Rate limited, backing off"
                    );

                    if !self.pause(wait).await {
                        return Ok(self.interrupt());
                    }
                }
            }
        }
    }

    /// Counts a fetched page
    pub fn page_fetched(&mut self) {
        self.report.pages += 1;
        if let Some(metrics) = self.metrics {
            metrics.record_page(self.report.kind.as_str());
        }
    }

    fn record_error(&mut self, message: String) {
        warn!(account_key = %self.report.account_key, error = %message, "Skipping record");
        if let Some(metrics) = self.metrics {
            metrics.record_errors(self.report.kind.as_str(), 1);
        }
        self.report.errors.push(message);
    }

    /// Validates and upserts one remote record
    ///
    /// Failures are recorded in the report and yield `None`.
    pub async fn upsert(&mut self, remote: RemoteFile) -> Option<FileRecord> {
        let record = match remote.into_record() {
            Ok(record) => record,
            Err(e) => {
                self.record_error(e.to_string());
                return None;
            }
        };

        let key = &self.credentials.account_key;
        match self.store.apply_file_record(key, &record).await {
            Ok(()) => {
                self.report.upserts += 1;
                if let Some(metrics) = self.metrics {
                    metrics.record_applied("upsert", 1);
                }
                Some(record)
            }
            Err(e) => {
                self.record_error(format!("Failed to store {}: {e:#}", record.id()));
                None
            }
        }
    }

    /// Deletes one row; absent rows are a no-op
    pub async fn remove(&mut self, file_id: String) {
        let id = match FileId::new(file_id) {
            Ok(id) => id,
            Err(e) => {
                self.record_error(format!("Removal skipped: {e}"));
                return;
            }
        };

        let key = &self.credentials.account_key;
        match self.store.remove_file(key, &id).await {
            Ok(true) => {
                self.report.removals += 1;
                if let Some(metrics) = self.metrics {
                    metrics.record_applied("remove", 1);
                }
                debug!(file_id = %id, "Applied removal");
            }
            Ok(false) => debug!(file_id = %id, "Removal of unmirrored file ignored"),
            Err(e) => self.record_error(format!("Failed to remove {id}: {e:#}")),
        }
    }

    /// Lists every page of `scope` and upserts each record
    ///
    /// Returns the folders seen (for subtree walks), or `None` if the
    /// attempt was interrupted.
    pub async fn list_scope(&mut self, scope: &ListScope) -> anyhow::Result<Option<Vec<FileId>>> {
        let lister = self.lister;
        let credentials = self.credentials;
        let page_size = self.settings.page_size;

        let mut folders = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let token = page_token.clone();
            let fetched = self
                .fetch("list_page", || {
                    lister.list_page(credentials, scope, token.as_deref(), page_size)
                })
                .await?;
            let Some(page) = fetched else {
                return Ok(None);
            };
            self.page_fetched();

            debug!(
                ?scope,
                records = page.records.len(),
                has_more = page.next_page_token.is_some(),
                "Applying file page"
            );

            for remote in page.records {
                if let Some(record) = self.upsert(remote).await {
                    if record.is_folder() {
                        folders.push(record.id().clone());
                    }
                }
            }

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => return Ok(Some(folders)),
            }
        }
    }

    /// Walks a set of roots breadth-first
    ///
    /// `scope_for` builds the listing scope of each folder. With `descend`,
    /// folders discovered under a root are walked too; each folder id is
    /// listed at most once. Returns false if the attempt was interrupted.
    pub async fn walk_roots<S>(
        &mut self,
        roots: &[FileId],
        descend: bool,
        scope_for: S,
    ) -> anyhow::Result<bool>
    where
        S: Fn(FileId) -> ListScope,
    {
        let mut visited: HashSet<FileId> = HashSet::new();
        let mut queue: VecDeque<FileId> = VecDeque::new();
        for root in roots {
            if visited.insert(root.clone()) {
                queue.push_back(root.clone());
            }
        }

        while let Some(folder) = queue.pop_front() {
            let scope = scope_for(folder);
            let Some(children) = self.list_scope(&scope).await? else {
                return Ok(false);
            };
            if descend {
                for child in children {
                    if visited.insert(child.clone()) {
                        queue.push_back(child);
                    }
                }
            }
        }

        Ok(true)
    }
}
