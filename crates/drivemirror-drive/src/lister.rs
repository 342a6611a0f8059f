//! `IRemoteLister` implementation backed by Google Drive
//!
//! Combines the [`DriveClient`] with the [`TokenProvider`]: each call
//! obtains an access token for the account, issues one request and maps the
//! result to the port's page types.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use drivemirror_core::{
    config::DriveConfig,
    domain::SyncCursor,
    ports::{AccountCredentials, ChangePage, ErrorClass, FilePage, IRemoteLister, ListScope},
};
use tracing::debug;

use crate::{
    auth::TokenProvider,
    client::{DriveClient, FileListRequest},
    query,
    rate_limit::RequestPacer,
    DriveError,
};

/// Drive-backed remote listing client
pub struct DriveLister {
    client: DriveClient,
    tokens: TokenProvider,
}

impl DriveLister {
    pub fn new(client: DriveClient, tokens: TokenProvider) -> Self {
        Self { client, tokens }
    }

    /// Builds the client, pacer and token provider from configuration
    pub fn from_config(config: &DriveConfig) -> Result<Self, DriveError> {
        let pacer = Arc::new(RequestPacer::per_second(config.requests_per_second));
        let client = DriveClient::new(std::time::Duration::from_secs(config.request_timeout_secs))?
            .base_url_override(config.api_base_url.clone())
            .with_pacer(pacer);
        let tokens = TokenProvider::from_config(client.http_client().clone(), config);
        Ok(Self::new(client, tokens))
    }

    async fn token(&self, credentials: &AccountCredentials) -> anyhow::Result<String> {
        let token = self
            .tokens
            .access_token(credentials)
            .await
            .with_context(|| format!("access token for {}", credentials.account_key))?;
        Ok(token)
    }

    /// Forgets the cached token when the API rejects it
    fn note_failure(&self, credentials: &AccountCredentials, error: &DriveError) {
        if matches!(error, DriveError::Unauthorized(_)) {
            self.tokens.invalidate(&credentials.account_key);
        }
    }
}

#[async_trait]
impl IRemoteLister for DriveLister {
    async fn list_page(
        &self,
        credentials: &AccountCredentials,
        scope: &ListScope,
        page_token: Option<&str>,
        page_size: u32,
    ) -> anyhow::Result<FilePage> {
        let token = self.token(credentials).await?;

        let mut request = FileListRequest::new(page_size).with_page_token(page_token);
        if let Some(q) = query::for_scope(scope) {
            request = request.with_query(q);
        }

        debug!(account_key = %credentials.account_key, ?scope, "Listing files");
        match self.client.list_files(&token, &request).await {
            Ok(page) => Ok(page),
            Err(e) => {
                self.note_failure(credentials, &e);
                Err(anyhow::Error::new(e)
                    .context(format!("listing files for {}", credentials.account_key)))
            }
        }
    }

    async fn list_changes_page(
        &self,
        credentials: &AccountCredentials,
        cursor: &SyncCursor,
        page_size: u32,
    ) -> anyhow::Result<ChangePage> {
        let token = self.token(credentials).await?;

        match self
            .client
            .list_changes(&token, cursor.as_str(), page_size)
            .await
        {
            Ok(page) => Ok(page),
            Err(e) => {
                self.note_failure(credentials, &e);
                Err(anyhow::Error::new(e)
                    .context(format!("listing changes for {}", credentials.account_key)))
            }
        }
    }

    async fn get_start_cursor(
        &self,
        credentials: &AccountCredentials,
    ) -> anyhow::Result<SyncCursor> {
        let token = self.token(credentials).await?;

        match self.client.get_start_page_token(&token).await {
            Ok(cursor) => Ok(cursor),
            Err(e) => {
                self.note_failure(credentials, &e);
                Err(anyhow::Error::new(e)
                    .context(format!("start cursor for {}", credentials.account_key)))
            }
        }
    }

    fn classify_error(&self, error: &anyhow::Error) -> ErrorClass {
        classify(error)
    }
}

/// Finds the `DriveError` in an error chain and classifies it
///
/// Errors that carry no `DriveError` (e.g. bad credentials documents or
/// local failures) are fatal.
pub fn classify(error: &anyhow::Error) -> ErrorClass {
    match error.chain().find_map(|e| e.downcast_ref::<DriveError>()) {
        Some(drive) if drive.is_retryable() => ErrorClass::retryable(drive.retry_after()),
        _ => ErrorClass::fatal(),
    }
}
