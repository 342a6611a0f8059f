//! Per-account scheduler
//!
//! The [`Orchestrator`] keeps one recurring task per account plus a health
//! check task. Each account task ticks immediately and then on the cadence
//! of its auth type; every tick runs one attempt (a crawl until the account
//! has synced once, incremental afterwards).
//!
//! ## Lifecycle
//!
//! - `start()` resets accounts a previous process left in flight to `error`,
//!   schedules every account not in `error` and starts the health check.
//! - The health check restarts accounts in `error` on every sweep and
//!   schedules accounts it finds without a live task, such as ones the CLI
//!   registered while the daemon was running.
//! - `stop()` cancels every task; in-flight attempts stop at the next page
//!   boundary and return their account to `idle`.
//!
//! Both `start()` and `stop()` are idempotent.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};
use std::time::Duration;

use dashmap::DashMap;
use drivemirror_core::{
    config::SchedulerConfig,
    domain::{Account, AccountKey, AccountStatus, AuthType},
};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{service::SyncService, SyncError};

/// Reason recorded on accounts found in flight at startup
pub const RESTART_REASON: &str = "interrupted by restart";

/// First tick of a regular schedule
const FROM_IDLE: &[AccountStatus] = &[AccountStatus::Idle];

/// First tick of a schedule restarted by the health check
const FROM_IDLE_OR_ERROR: &[AccountStatus] = &[AccountStatus::Idle, AccountStatus::Error];

/// Snapshot returned by [`Orchestrator::status`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrchestratorStatus {
    pub running: bool,
    /// Accounts with a live recurring task, sorted by key
    pub scheduled_accounts: Vec<AccountKey>,
}

struct ScheduledTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Scheduled task ended abnormally");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Recurring per-account attempts with health checking
pub struct Orchestrator {
    service: Arc<SyncService>,
    config: SchedulerConfig,
    tasks: DashMap<AccountKey, ScheduledTask>,
    running: AtomicBool,
    /// Parent of every task token; replaced on each start
    root: Mutex<CancellationToken>,
    health: Mutex<Option<ScheduledTask>>,
}

impl Orchestrator {
    pub fn new(service: Arc<SyncService>, config: SchedulerConfig) -> Arc<Self> {
        Arc::new(Self {
            service,
            config,
            tasks: DashMap::new(),
            running: AtomicBool::new(false),
            root: Mutex::new(CancellationToken::new()),
            health: Mutex::new(None),
        })
    }

    pub fn service(&self) -> &Arc<SyncService> {
        &self.service
    }

    /// Tick period for an account of the given auth type
    pub fn interval_for(&self, auth_type: AuthType) -> Duration {
        let secs = match auth_type {
            AuthType::Oauth => self.config.oauth_interval_secs,
            AuthType::SaShare => self.config.sa_share_interval_secs,
        };
        Duration::from_secs(secs.max(1))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Recovers interrupted accounts and starts all schedules
    ///
    /// Calling `start` on a running orchestrator does nothing.
    pub async fn start(self: &Arc<Self>) -> Result<(), SyncError> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Orchestrator already running");
            return Ok(());
        }

        if let Err(e) = self.schedule_all().await {
            self.running.store(false, Ordering::SeqCst);
            lock(&self.root).cancel();
            return Err(e);
        }
        Ok(())
    }

    async fn schedule_all(self: &Arc<Self>) -> Result<(), SyncError> {
        let store = self.service.store();
        let recovered = store
            .reset_in_flight(RESTART_REASON)
            .await
            .map_err(SyncError::Store)?;
        if !recovered.is_empty() {
            warn!(
                count = recovered.len(),
                accounts = ?recovered,
                "Accounts were left in flight by a previous run; marked as error"
            );
        }

        let root = CancellationToken::new();
        *lock(&self.root) = root.clone();

        let accounts = self.service.list_accounts().await?;
        let mut scheduled = 0usize;
        for account in &accounts {
            if account.status() == AccountStatus::Error {
                continue;
            }
            self.schedule(account, FROM_IDLE);
            scheduled += 1;
        }

        let period = Duration::from_secs(self.config.health_check_interval_secs.max(1));
        let cancel = root.child_token();
        let handle = tokio::spawn(Arc::clone(self).health_loop(period, cancel.clone()));
        *lock(&self.health) = Some(ScheduledTask { cancel, handle });

        info!(
            accounts = accounts.len(),
            scheduled,
            health_check_secs = period.as_secs(),
            "Orchestrator started"
        );
        Ok(())
    }

    /// Cancels every schedule and waits for the tasks to finish
    ///
    /// Calling `stop` on a stopped orchestrator does nothing.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("Orchestrator not running");
            return;
        }

        lock(&self.root).cancel();

        let health = lock(&self.health).take();
        if let Some(task) = health {
            task.shutdown().await;
        }

        let keys: Vec<AccountKey> = self.tasks.iter().map(|entry| entry.key().clone()).collect();
        for key in keys {
            if let Some((_, task)) = self.tasks.remove(&key) {
                task.shutdown().await;
            }
        }

        info!("Orchestrator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> OrchestratorStatus {
        let mut scheduled_accounts: Vec<AccountKey> = self
            .tasks
            .iter()
            .filter(|entry| !entry.value().handle.is_finished())
            .map(|entry| entry.key().clone())
            .collect();
        scheduled_accounts.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        OrchestratorStatus {
            running: self.is_running(),
            scheduled_accounts,
        }
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    /// Schedules a freshly registered account; its first tick crawls
    ///
    /// A stopped orchestrator picks the account up on its next start.
    pub async fn enqueue_new_account(self: &Arc<Self>, key: &AccountKey) -> Result<(), SyncError> {
        let account = self.service.get_account(key).await?;
        if !self.is_running() {
            debug!(account_key = %key, "Orchestrator stopped; account will be scheduled on start");
            return Ok(());
        }
        self.schedule(&account, FROM_IDLE);
        info!(account_key = %key, "Scheduled new account");
        Ok(())
    }

    /// Registers an OAuth account and schedules it
    pub async fn register_oauth_account(
        self: &Arc<Self>,
        email: &str,
        secret: &str,
    ) -> Result<Account, SyncError> {
        let account = self.service.register_oauth_account(email, secret).await?;
        self.enqueue_new_account(account.key()).await?;
        Ok(account)
    }

    /// Registers a service-account share and schedules it
    pub async fn register_service_account(
        self: &Arc<Self>,
        alias: &str,
        secret: &str,
        root_folder_ids: &[String],
    ) -> Result<Account, SyncError> {
        let account = self
            .service
            .register_service_account(alias, secret, root_folder_ids)
            .await?;
        self.enqueue_new_account(account.key()).await?;
        Ok(account)
    }

    /// Unschedules an account, then deletes it with all of its rows
    pub async fn remove_account(&self, key: &AccountKey) -> Result<(), SyncError> {
        self.unschedule(key).await;
        self.service.delete_account(key).await
    }

    async fn unschedule(&self, key: &AccountKey) {
        if let Some((_, task)) = self.tasks.remove(key) {
            task.shutdown().await;
            debug!(account_key = %key, "Unscheduled account");
        }
    }

    fn schedule(&self, account: &Account, first_from: &'static [AccountStatus]) {
        let key = account.key().clone();
        let period = self.interval_for(account.auth_type());
        let cancel = lock(&self.root).child_token();
        let handle = tokio::spawn(account_loop(
            Arc::clone(&self.service),
            key.clone(),
            period,
            first_from,
            cancel.clone(),
        ));

        if let Some(previous) = self.tasks.insert(key, ScheduledTask { cancel, handle }) {
            previous.cancel.cancel();
        }
    }

    // ========================================================================
    // Health check
    // ========================================================================

    async fn health_loop(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.health_check().await {
                warn!(error = %e, "Health check failed");
            }
        }
        debug!("Health check loop exited");
    }

    /// Restarts every account in `error` and adopts accounts that have no
    /// live schedule (e.g. registered by another process); returns their keys
    pub async fn health_check(self: &Arc<Self>) -> Result<Vec<AccountKey>, SyncError> {
        if !self.is_running() {
            return Ok(Vec::new());
        }

        let accounts = self.service.list_accounts().await?;
        let mut started = Vec::new();
        for account in accounts {
            if account.status() == AccountStatus::Error {
                info!(
                    account_key = %account.key(),
                    last_error = account.last_error().unwrap_or_default(),
                    "Restarting account in error"
                );
                self.unschedule(account.key()).await;
                if !self.is_running() {
                    break;
                }
                self.schedule(&account, FROM_IDLE_OR_ERROR);
            } else if !self.has_live_task(account.key()) {
                info!(account_key = %account.key(), "Scheduling unscheduled account");
                self.schedule(&account, FROM_IDLE);
            } else {
                continue;
            }
            started.push(account.key().clone());
        }

        self.refresh_account_gauges().await?;
        Ok(started)
    }

    fn has_live_task(&self, key: &AccountKey) -> bool {
        self.tasks
            .get(key)
            .is_some_and(|task| !task.handle.is_finished())
    }

    async fn refresh_account_gauges(&self) -> Result<(), SyncError> {
        let Some(metrics) = self.service.metrics() else {
            return Ok(());
        };
        let accounts = self.service.list_accounts().await?;
        for status in AccountStatus::ALL {
            let count = accounts.iter().filter(|a| a.status() == status).count();
            metrics.set_accounts(status.as_str(), count as i64);
        }
        Ok(())
    }
}

/// Recurring attempts for one account until cancelled
///
/// Only the first tick may start from `first_from`; later ticks start from
/// `idle`. The loop ends when the account is deleted or an attempt fails
/// (the health check restarts it).
async fn account_loop(
    service: Arc<SyncService>,
    key: AccountKey,
    period: Duration,
    first_from: &'static [AccountStatus],
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut from = first_from;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match service
            .run_scheduled_attempt(&key, from, cancel.clone())
            .await
        {
            Ok(Some(report)) => debug!(
                account_key = %key,
                kind = %report.kind,
                pages = report.pages,
                interrupted = report.interrupted,
                "Scheduled attempt finished"
            ),
            Ok(None) => {}
            Err(SyncError::AccountNotFound(_)) => {
                info!(account_key = %key, "Account no longer exists; schedule ended");
                break;
            }
            Err(SyncError::AttemptFailed(reason)) => {
                warn!(
                    account_key = %key,
                    reason = %reason,
                    "Account is in error; waiting for the health check"
                );
                break;
            }
            Err(e) => warn!(account_key = %key, error = %e, "Scheduled attempt did not run"),
        }

        from = FROM_IDLE;
    }
}
