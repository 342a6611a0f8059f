//! Prometheus metrics registry for DriveMirror
//!
//! Provides typed, labeled counters, gauges, and histograms for the
//! observable operations of the sync engines and the orchestrator.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

/// Central metrics registry holding all Prometheus metrics.
pub struct MetricsRegistry {
    registry: Registry,
    /// Counter: finished attempts by (kind, outcome)
    pub attempts_total: IntCounterVec,
    /// Counter: remote pages fetched by attempt kind
    pub pages_fetched_total: IntCounterVec,
    /// Counter: records written to the mirror by operation (upsert, remove)
    pub records_applied_total: IntCounterVec,
    /// Counter: records skipped because they could not be applied
    pub record_errors_total: IntCounterVec,
    /// Counter: rate-limited requests that were retried
    pub remote_retries_total: IntCounterVec,
    /// Counter: rows deleted by the post-crawl reconciliation
    pub files_pruned_total: IntCounter,
    /// Gauge: number of accounts per status
    pub accounts: IntGaugeVec,
    /// Histogram: attempt duration in seconds
    pub attempt_duration_seconds: HistogramVec,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with all metrics registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("drivemirror".to_string()), None)?;

        let attempts_total = IntCounterVec::new(
            Opts::new("attempts_total", "Finished sync attempts"),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(attempts_total.clone()))?;

        let pages_fetched_total = IntCounterVec::new(
            Opts::new("pages_fetched_total", "Remote pages fetched"),
            &["kind"],
        )?;
        registry.register(Box::new(pages_fetched_total.clone()))?;

        let records_applied_total = IntCounterVec::new(
            Opts::new("records_applied_total", "Records written to the mirror"),
            &["operation"],
        )?;
        registry.register(Box::new(records_applied_total.clone()))?;

        let record_errors_total = IntCounterVec::new(
            Opts::new("record_errors_total", "Records skipped after a failure"),
            &["kind"],
        )?;
        registry.register(Box::new(record_errors_total.clone()))?;

        let remote_retries_total = IntCounterVec::new(
            Opts::new("remote_retries_total", "Rate-limited requests retried"),
            &["kind"],
        )?;
        registry.register(Box::new(remote_retries_total.clone()))?;

        let files_pruned_total = IntCounter::with_opts(Opts::new(
            "files_pruned_total",
            "Rows removed by post-crawl reconciliation",
        ))?;
        registry.register(Box::new(files_pruned_total.clone()))?;

        let accounts = IntGaugeVec::new(
            Opts::new("accounts", "Number of accounts by status"),
            &["status"],
        )?;
        registry.register(Box::new(accounts.clone()))?;

        let attempt_duration_seconds = HistogramVec::new(
            HistogramOpts::new("attempt_duration_seconds", "Sync attempt duration in seconds")
                .buckets(vec![1.0, 5.0, 30.0, 120.0, 600.0, 1800.0, f64::INFINITY]),
            &["kind"],
        )?;
        registry.register(Box::new(attempt_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            attempts_total,
            pages_fetched_total,
            records_applied_total,
            record_errors_total,
            remote_retries_total,
            files_pruned_total,
            accounts,
            attempt_duration_seconds,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    /// Record a finished attempt and its duration.
    pub fn record_attempt(&self, kind: &str, outcome: &str, duration_secs: f64) {
        self.attempts_total
            .with_label_values(&[kind, outcome])
            .inc();
        self.attempt_duration_seconds
            .with_label_values(&[kind])
            .observe(duration_secs);
    }

    /// Record one fetched page.
    pub fn record_page(&self, kind: &str) {
        self.pages_fetched_total.with_label_values(&[kind]).inc();
    }

    /// Record records written to the mirror.
    pub fn record_applied(&self, operation: &str, count: u64) {
        self.records_applied_total
            .with_label_values(&[operation])
            .inc_by(count);
    }

    /// Record records that failed to apply.
    pub fn record_errors(&self, kind: &str, count: u64) {
        self.record_errors_total
            .with_label_values(&[kind])
            .inc_by(count);
    }

    /// Record one retry after a rate limit.
    pub fn record_retry(&self, kind: &str) {
        self.remote_retries_total.with_label_values(&[kind]).inc();
    }

    /// Record rows removed by reconciliation.
    pub fn record_pruned(&self, count: u64) {
        self.files_pruned_total.inc_by(count);
    }

    /// Set the gauge for accounts in a status.
    pub fn set_accounts(&self, status: &str, count: i64) {
        self.accounts.with_label_values(&[status]).set(count);
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
