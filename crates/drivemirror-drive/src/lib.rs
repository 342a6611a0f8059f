//! DriveMirror Drive - Google Drive v3 adapter
//!
//! Provides:
//! - A typed client for the Drive v3 `files`, `changes` and
//!   `changes/startPageToken` endpoints
//! - Access-token acquisition for OAuth (refresh token) and service-account
//!   (JWT bearer) accounts
//! - Client-side request pacing and `Retry-After` parsing
//! - The AES-256-GCM secret box used to seal account secrets at rest
//!
//! ## Modules
//!
//! - [`auth`] - Token acquisition and per-account token cache
//! - [`client`] - Drive v3 HTTP client
//! - [`lister`] - `IRemoteLister` implementation
//! - [`query`] - Builders for the `q` search parameter
//! - [`rate_limit`] - Request pacing and `Retry-After` handling
//! - [`vault`] - `ICredentialVault` implementation

pub mod auth;
pub mod client;
pub mod lister;
pub mod query;
pub mod rate_limit;
pub mod vault;
mod wire;

pub use auth::TokenProvider;
pub use client::DriveClient;
pub use lister::DriveLister;
pub use vault::{SecretBox, VaultError};

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when communicating with Google Drive
#[derive(Debug, Error)]
pub enum DriveError {
    /// Credentials were rejected, or no access token could be obtained
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller lacks permission (not a rate-limit reason)
    #[error("Forbidden ({reason}): {message}")]
    Forbidden { reason: String, message: String },

    /// The requested folder or file does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit or quota exceeded; safe to retry later
    #[error("Rate limited ({reason}), retry after {retry_after:?}")]
    RateLimited {
        reason: String,
        /// Wait suggested by the `Retry-After` header, if any
        retry_after: Option<Duration>,
    },

    /// The request was malformed (bad query, bad page token)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A server-side error occurred (5xx)
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The stored secret could not be interpreted
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl DriveError {
    /// Returns true for errors that clear up by waiting
    pub fn is_retryable(&self) -> bool {
        matches!(self, DriveError::RateLimited { .. })
    }

    /// Wait suggested by the remote, for retryable errors
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            DriveError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
