//! Request pacing and rate-limit signals for the Drive API
//!
//! Two halves:
//!
//! - [`RequestPacer`]: a process-wide `governor` limiter every Drive call
//!   waits on, so the mirror stays under the project's request budget
//!   across all accounts.
//! - [`parse_retry_after`] and [`is_rate_limit_reason`]: reading the
//!   server's "slow down" answers (HTTP 429, or HTTP 403 with a quota
//!   reason) so the engines can back off for as long as asked.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use drivemirror_drive::rate_limit::RequestPacer;
//!
//! # async fn example() {
//! let pacer = RequestPacer::per_second(10);
//! pacer.until_ready().await;
//! // ... make API call ...
//! # }
//! ```

use std::{num::NonZeroU32, time::Duration};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::{debug, warn};

/// 403 error reasons that Drive uses for rate limits and quotas
pub const RATE_LIMIT_REASONS: &[&str] = &[
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "quotaExceeded",
    "sharingRateLimitExceeded",
];

/// Longest HTTP-date `Retry-After` honored, in seconds
const MAX_RETRY_AFTER_DATE_SECS: u64 = 3600;

// ============================================================================
// RequestPacer
// ============================================================================

/// Client-side request budget shared by every account
pub struct RequestPacer {
    limiter: DefaultDirectRateLimiter,
    per_second: NonZeroU32,
}

impl std::fmt::Debug for RequestPacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPacer")
            .field("per_second", &self.per_second)
            .finish()
    }
}

impl RequestPacer {
    /// Creates a pacer admitting `requests` calls per second
    ///
    /// A budget of zero is treated as one request per second.
    pub fn per_second(requests: u32) -> Self {
        let per_second = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
        debug!(per_second = per_second.get(), "Drive request pacer configured");
        Self {
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
            per_second,
        }
    }

    /// Waits until the next request may be sent
    pub async fn until_ready(&self) {
        self.limiter.until_ready().await;
    }

    /// Takes a permit if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Configured requests per second
    pub fn rate(&self) -> u32 {
        self.per_second.get()
    }
}

// ============================================================================
// Rate-limit signals
// ============================================================================

/// Returns true if a 403 `reason` means "slow down" rather than "denied"
pub fn is_rate_limit_reason(reason: &str) -> bool {
    RATE_LIMIT_REASONS.contains(&reason)
}

/// Parses the `Retry-After` header value
///
/// The header can be either:
/// - An integer number of seconds (e.g., "30")
/// - An HTTP-date (e.g., "Fri, 31 Dec 2025 23:59:59 GMT"), turned into
///   seconds from now and honored up to one hour
///
/// Returns `None` if the value cannot be used, letting the caller fall back
/// to its configured default.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            let secs = (target - now)
                .num_seconds()
                .try_into()
                .ok()
                .filter(|&s: &u64| s <= MAX_RETRY_AFTER_DATE_SECS);
            if let Some(secs) = secs {
                return Some(Duration::from_secs(secs));
            }
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    None
}
