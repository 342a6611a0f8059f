//! Access-token acquisition for Drive accounts
//!
//! Two grant types, one per auth model:
//!
//! - OAuth accounts hold a refresh token; it is exchanged at the token
//!   endpoint through the `oauth2` crate.
//! - sa_share accounts hold a service-account key; an RS256-signed JWT
//!   assertion is exchanged with the `jwt-bearer` grant.
//!
//! Access tokens are cached per account, tagged with a digest of the secret
//! that produced them, and reused until shortly before
//! they expire. Every failure at the token endpoint is reported as
//! [`DriveError::Unauthorized`], which the engines treat as fatal.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use drivemirror_core::{
    config::DriveConfig,
    domain::{AccountKey, AuthType},
    ports::AccountCredentials,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use oauth2::{basic::BasicClient, ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::DriveError;

/// Read-only Drive scope requested for service-account assertions
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Grant type of the service-account exchange
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for assertions (Google's maximum)
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens are refreshed this long before they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Assumed lifetime when the token endpoint omits `expires_in`
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

// ============================================================================
// Secret documents
// ============================================================================

/// Plaintext secret of an OAuth account
///
/// The client id/secret are optional; when absent the configured OAuth
/// client is used.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthSecret {
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for OAuthSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSecret")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl OAuthSecret {
    pub fn parse(secret: &str) -> Result<Self, DriveError> {
        let parsed: Self = serde_json::from_str(secret)
            .map_err(|e| DriveError::InvalidCredentials(format!("OAuth secret: {e}")))?;
        if parsed.refresh_token.trim().is_empty() {
            return Err(DriveError::InvalidCredentials(
                "OAuth secret has an empty refresh_token".to_string(),
            ));
        }
        Ok(parsed)
    }
}

/// The fields of a Google service-account key file the mirror needs
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn parse(secret: &str) -> Result<Self, DriveError> {
        let key: Self = serde_json::from_str(secret)
            .map_err(|e| DriveError::InvalidCredentials(format!("service-account key: {e}")))?;
        if key.client_email.trim().is_empty() || key.private_key.trim().is_empty() {
            return Err(DriveError::InvalidCredentials(
                "service-account key lacks client_email or private_key".to_string(),
            ));
        }
        Ok(key)
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct BearerTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

// ============================================================================
// TokenProvider
// ============================================================================

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn new(access_token: String, lifetime: Duration) -> Self {
        let lifetime = chrono::Duration::from_std(lifetime)
            .unwrap_or_else(|_| chrono::Duration::seconds(ASSERTION_LIFETIME_SECS));
        Self {
            access_token,
            expires_at: Utc::now() + lifetime,
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let margin = chrono::Duration::from_std(EXPIRY_MARGIN).unwrap_or_default();
        now + margin < self.expires_at
    }
}

/// A cached token plus the digest of the secret it was issued for
struct CacheEntry {
    secret_digest: [u8; 32],
    token: CachedToken,
}

fn secret_digest(secret: &str) -> [u8; 32] {
    Sha256::digest(secret.as_bytes()).into()
}

/// Obtains and caches access tokens for any account
pub struct TokenProvider {
    http: reqwest::Client,
    token_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    cache: DashMap<AccountKey, CacheEntry>,
}

impl TokenProvider {
    /// Creates a provider talking to `token_url`
    pub fn new(http: reqwest::Client, token_url: impl Into<String>) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: None,
            client_secret: None,
            cache: DashMap::new(),
        }
    }

    /// Creates a provider from the `drive` configuration section
    pub fn from_config(http: reqwest::Client, config: &DriveConfig) -> Self {
        let mut provider = Self::new(http, config.token_url.clone());
        provider.client_id = config.oauth_client_id.clone();
        provider.client_secret = config.oauth_client_secret.clone();
        provider
    }

    /// Sets the OAuth client used when a secret does not carry its own
    pub fn with_oauth_client(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Returns a valid access token for the account, refreshing if needed
    ///
    /// A cached token is only reused for the same secret, so an account
    /// re-registered under the same key with new credentials gets a new one.
    pub async fn access_token(&self, credentials: &AccountCredentials) -> Result<String, DriveError> {
        let digest = secret_digest(&credentials.secret);
        if let Some(cached) = self.cache.get(&credentials.account_key) {
            if cached.secret_digest == digest && cached.token.is_fresh(Utc::now()) {
                return Ok(cached.token.access_token.clone());
            }
        }

        let token = match credentials.auth_type {
            AuthType::Oauth => {
                let secret = OAuthSecret::parse(&credentials.secret)?;
                self.refresh_oauth(&secret).await?
            }
            AuthType::SaShare => {
                let key = ServiceAccountKey::parse(&credentials.secret)?;
                self.exchange_assertion(&key).await?
            }
        };

        info!(
            account_key = %credentials.account_key,
            auth_type = %credentials.auth_type,
            "Obtained access token"
        );

        let access_token = token.access_token.clone();
        self.cache.insert(
            credentials.account_key.clone(),
            CacheEntry {
                secret_digest: digest,
                token,
            },
        );
        Ok(access_token)
    }

    /// Drops the cached token of an account (e.g., after a 401)
    pub fn invalidate(&self, account_key: &AccountKey) {
        if self.cache.remove(account_key).is_some() {
            debug!(account_key = %account_key, "Invalidated cached access token");
        }
    }

    /// Exchanges a refresh token via the `oauth2` crate
    async fn refresh_oauth(&self, secret: &OAuthSecret) -> Result<CachedToken, DriveError> {
        let client_id = secret
            .client_id
            .clone()
            .or_else(|| self.client_id.clone())
            .ok_or_else(|| {
                DriveError::InvalidCredentials(
                    "no OAuth client id in the secret or drive.oauth_client_id".to_string(),
                )
            })?;
        let client_secret = secret.client_secret.clone().or_else(|| self.client_secret.clone());

        let token_url = TokenUrl::new(self.token_url.clone())
            .map_err(|e| DriveError::Unauthorized(format!("invalid token URL: {e}")))?;
        let mut client = BasicClient::new(ClientId::new(client_id)).set_token_uri(token_url);
        if let Some(client_secret) = client_secret {
            client = client.set_client_secret(ClientSecret::new(client_secret));
        }

        debug!("Refreshing OAuth access token");
        let response = client
            .exchange_refresh_token(&RefreshToken::new(secret.refresh_token.clone()))
            .request_async(&self.http)
            .await
            .map_err(|e| DriveError::Unauthorized(format!("refresh token exchange failed: {e}")))?;

        Ok(CachedToken::new(
            response.access_token().secret().to_string(),
            response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME),
        ))
    }

    /// Signs a JWT assertion and exchanges it with the `jwt-bearer` grant
    async fn exchange_assertion(&self, key: &ServiceAccountKey) -> Result<CachedToken, DriveError> {
        let assertion = self.sign_assertion(key, Utc::now())?;

        debug!(client_email = %key.client_email, "Exchanging service-account assertion");
        let response = self
            .http
            .post(&self.token_url)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Unauthorized(format!(
                "assertion exchange failed with HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: BearerTokenResponse = response
            .json()
            .await
            .map_err(|e| DriveError::InvalidResponse(format!("token response: {e}")))?;

        Ok(CachedToken::new(
            body.access_token,
            body.expires_in
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TOKEN_LIFETIME),
        ))
    }

    fn sign_assertion(
        &self,
        key: &ServiceAccountKey,
        now: DateTime<Utc>,
    ) -> Result<String, DriveError> {
        let claims = AssertionClaims {
            iss: &key.client_email,
            scope: DRIVE_READONLY_SCOPE,
            aud: &self.token_url,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = key.private_key_id.clone();

        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| DriveError::InvalidCredentials(format!("service-account private key: {e}")))?;

        jsonwebtoken::encode(&header, &claims, &encoding_key)
            .map_err(|e| DriveError::InvalidCredentials(format!("signing assertion: {e}")))
    }
}
