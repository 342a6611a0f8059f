//! Google Drive v3 API client
//!
//! Provides a typed HTTP client for the three read-only endpoints the mirror
//! needs. Handles bearer authentication, request pacing, JSON
//! deserialization and mapping of HTTP failures to [`DriveError`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use drivemirror_drive::client::{DriveClient, FileListRequest};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = DriveClient::new(std::time::Duration::from_secs(30))?;
//! let request = FileListRequest::new(100).with_query("'root' in parents");
//! let page = client.list_files("access-token", &request).await?;
//! println!("{} files", page.records.len());
//! # Ok(())
//! # }
//! ```

use std::{sync::Arc, time::Duration};

use drivemirror_core::{
    domain::SyncCursor,
    ports::{ChangePage, FilePage},
};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{
    rate_limit::{is_rate_limit_reason, parse_retry_after, RequestPacer},
    wire::{self, ChangeList, ErrorEnvelope, FileList, StartPageToken},
    DriveError,
};

/// Base URL for Google Drive API v3
pub const DRIVE_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

/// Largest page the Drive API serves
pub const MAX_PAGE_SIZE: u32 = 1000;

// ============================================================================
// Request parameters
// ============================================================================

/// Parameters of one `GET /files` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileListRequest {
    pub page_size: u32,
    pub query: Option<String>,
    pub page_token: Option<String>,
}

impl FileListRequest {
    /// A first-page request with no query
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            query: None,
            page_token: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_page_token(mut self, token: Option<&str>) -> Self {
        self.page_token = token.map(str::to_string);
        self
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("pageSize", self.page_size.to_string()),
            ("fields", wire::file_list_fields()),
            ("supportsAllDrives", "true".to_string()),
            ("includeItemsFromAllDrives", "true".to_string()),
        ];
        match &self.query {
            // Folder queries must reach shared-drive folders too
            Some(q) => {
                params.push(("q", q.clone()));
                params.push(("corpora", "allDrives".to_string()));
            }
            None => params.push(("corpora", "user".to_string())),
        }
        if let Some(token) = &self.page_token {
            params.push(("pageToken", token.clone()));
        }
        params
    }
}

// ============================================================================
// DriveClient
// ============================================================================

/// HTTP client for Google Drive v3 calls
///
/// Wraps `reqwest::Client` with base URL construction, bearer
/// authentication and an optional shared [`RequestPacer`].
#[derive(Clone)]
pub struct DriveClient {
    client: Client,
    base_url: String,
    pacer: Option<Arc<RequestPacer>>,
}

impl DriveClient {
    /// Creates a client for the public Drive endpoint
    ///
    /// # Errors
    /// Returns an error if the TLS backend cannot be initialized
    pub fn new(timeout: Duration) -> Result<Self, DriveError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: DRIVE_BASE_URL.to_string(),
            pacer: None,
        })
    }

    /// Creates a client with a custom base URL (useful for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pacer: None,
        }
    }

    /// Points an existing client at another base URL
    pub fn base_url_override(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Attaches a request pacer; every call waits on it before sending
    pub fn with_pacer(mut self, pacer: Arc<RequestPacer>) -> Self {
        self.pacer = Some(pacer);
        self
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the underlying reqwest client (shared with the token provider)
    pub fn http_client(&self) -> &Client {
        &self.client
    }

    /// Creates an authenticated request builder for `path`
    pub fn request(&self, method: Method, path: &str, access_token: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, url).bearer_auth(access_token)
    }

    /// Lists one page of files
    ///
    /// `GET /files` with the mirrored field mask.
    pub async fn list_files(
        &self,
        access_token: &str,
        request: &FileListRequest,
    ) -> Result<FilePage, DriveError> {
        let list: FileList = self
            .get_json("/files", access_token, &request.params())
            .await?;

        debug!(
            files = list.files.len(),
            has_more = list.next_page_token.is_some(),
            "Fetched file page"
        );

        Ok(FilePage {
            records: list.files.into_iter().map(Into::into).collect(),
            next_page_token: list.next_page_token,
        })
    }

    /// Lists one page of the change feed starting at `page_token`
    pub async fn list_changes(
        &self,
        access_token: &str,
        page_token: &str,
        page_size: u32,
    ) -> Result<ChangePage, DriveError> {
        let params = vec![
            ("pageToken", page_token.to_string()),
            ("pageSize", page_size.clamp(1, MAX_PAGE_SIZE).to_string()),
            ("fields", wire::change_list_fields()),
            ("includeRemoved", "true".to_string()),
            ("supportsAllDrives", "true".to_string()),
            ("includeItemsFromAllDrives", "true".to_string()),
        ];
        let list: ChangeList = self.get_json("/changes", access_token, &params).await?;

        let next_cursor = list
            .next_page_token
            .map(SyncCursor::new)
            .transpose()
            .map_err(|e| DriveError::InvalidResponse(format!("nextPageToken: {e}")))?;
        let new_start_cursor = list
            .new_start_page_token
            .map(SyncCursor::new)
            .transpose()
            .map_err(|e| DriveError::InvalidResponse(format!("newStartPageToken: {e}")))?;

        let changes: Vec<_> = list
            .changes
            .into_iter()
            .filter_map(|c| c.into_remote())
            .collect();

        debug!(
            changes = changes.len(),
            has_more = next_cursor.is_some(),
            "Fetched change page"
        );

        Ok(ChangePage {
            changes,
            next_cursor,
            new_start_cursor,
        })
    }

    /// Fetches the change-feed cursor pointing at "now"
    pub async fn get_start_page_token(&self, access_token: &str) -> Result<SyncCursor, DriveError> {
        let params = vec![("supportsAllDrives", "true".to_string())];
        let token: StartPageToken = self
            .get_json("/changes/startPageToken", access_token, &params)
            .await?;
        SyncCursor::new(token.start_page_token)
            .map_err(|e| DriveError::InvalidResponse(format!("startPageToken: {e}")))
    }

    /// Sends a paced GET and decodes a JSON body
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
        params: &[(&'static str, String)],
    ) -> Result<T, DriveError> {
        if let Some(pacer) = &self.pacer {
            pacer.until_ready().await;
        }

        let response = self
            .request(Method::GET, path, access_token)
            .query(params)
            .send()
            .await?;

        let response = check_status(path, response).await?;

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| DriveError::InvalidResponse(format!("{path}: {e}")))
    }
}

/// Maps non-success responses to typed errors
///
/// 429, and 403 carrying a rate-limit reason, become
/// [`DriveError::RateLimited`] with the parsed `Retry-After`.
async fn check_status(path: &str, response: Response) -> Result<Response, DriveError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);

    let body = response.text().await.unwrap_or_default();
    let envelope: ErrorEnvelope = serde_json::from_str(&body).unwrap_or_default();
    let reason = envelope.reason().unwrap_or_default().to_string();
    let message = if envelope.error.message.is_empty() {
        format!("{path}: HTTP {status}")
    } else {
        format!("{path}: {}", envelope.error.message)
    };

    let error = match status {
        StatusCode::TOO_MANY_REQUESTS => DriveError::RateLimited {
            reason: if reason.is_empty() {
                "tooManyRequests".to_string()
            } else {
                reason
            },
            retry_after,
        },
        StatusCode::FORBIDDEN if is_rate_limit_reason(&reason) => DriveError::RateLimited {
            reason,
            retry_after,
        },
        StatusCode::FORBIDDEN => DriveError::Forbidden { reason, message },
        StatusCode::UNAUTHORIZED => DriveError::Unauthorized(message),
        StatusCode::NOT_FOUND => DriveError::NotFound(message),
        StatusCode::BAD_REQUEST => DriveError::BadRequest(message),
        s if s.is_server_error() => DriveError::ServerError {
            status: s.as_u16(),
            message,
        },
        s => DriveError::InvalidResponse(format!("{message} (HTTP {})", s.as_u16())),
    };

    warn!(path, status = status.as_u16(), error = %error, "Drive request failed");
    Err(error)
}
