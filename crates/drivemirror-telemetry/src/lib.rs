//! DriveMirror Telemetry - Observability
//!
//! Provides:
//! - `MetricsRegistry`: Prometheus metrics for sync attempts, pages,
//!   records, retries and account states
//! - `MetricsServer`: HTTP server for Prometheus scraping

pub mod metrics;
pub mod server;

pub use metrics::MetricsRegistry;
pub use server::MetricsServer;
