pub mod accounts;
pub mod config;
pub mod status;
pub mod sync;

use anyhow::Result;
use drivemirror_core::domain::AccountKey;

/// Parses an account key argument (email or alias)
pub fn parse_key(raw: &str) -> Result<AccountKey> {
    Ok(AccountKey::new(raw.to_string())?)
}
