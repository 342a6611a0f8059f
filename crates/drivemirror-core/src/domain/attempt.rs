//! Sync attempt kinds

use serde::{Deserialize, Serialize};

use super::account::AccountStatus;

/// The two kinds of synchronization attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    /// Full traversal of the account's visible scope
    Crawl,
    /// Only the delta since the last successful attempt
    Incremental,
}

impl AttemptKind {
    /// The status an account holds while this attempt runs
    pub fn in_flight_status(&self) -> AccountStatus {
        match self {
            AttemptKind::Crawl => AccountStatus::Crawling,
            AttemptKind::Incremental => AccountStatus::Syncing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptKind::Crawl => "crawl",
            AttemptKind::Incremental => "incremental",
        }
    }
}

impl std::fmt::Display for AttemptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
