//! Shared test helpers for Drive API integration tests
//!
//! Provides wiremock-based mock server setup for the Drive v3 endpoints and
//! the token endpoint. Each setup helper mounts the token exchange and
//! returns a DriveLister pointing at the mock server.

use drivemirror_core::{
    domain::{AccountKey, AuthType},
    ports::AccountCredentials,
};
use drivemirror_drive::{DriveClient, DriveLister, TokenProvider};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Access token handed out by the mocked token endpoint
pub const TEST_ACCESS_TOKEN: &str = "test-access-token";

/// PKCS#8 RSA key used only to sign test assertions
pub const TEST_PRIVATE_KEY: &str = include_str!("fixtures/test_service_account_key.pem");

/// Starts a mock server and builds a lister against it (no mocks mounted)
pub async fn setup_server() -> (MockServer, DriveLister) {
    let server = MockServer::start().await;
    let lister = lister_for(&server);
    (server, lister)
}

/// Starts a mock server with a refresh-token exchange that always succeeds
pub async fn setup_drive_mock() -> (MockServer, DriveLister) {
    let (server, lister) = setup_server().await;
    mount_refresh_token_exchange(&server).await;
    (server, lister)
}

pub fn lister_for(server: &MockServer) -> DriveLister {
    let client = DriveClient::with_base_url(server.uri());
    let tokens = TokenProvider::new(reqwest::Client::new(), format!("{}/token", server.uri()))
        .with_oauth_client("test-client-id", "test-client-secret");
    DriveLister::new(client, tokens)
}

/// Mounts `POST /token` answering the refresh-token grant
pub async fn mount_refresh_token_exchange(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": TEST_ACCESS_TOKEN,
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .mount(server)
        .await;
}

pub fn oauth_credentials(email: &str) -> AccountCredentials {
    AccountCredentials {
        account_key: AccountKey::new(email.to_string()).unwrap(),
        auth_type: AuthType::Oauth,
        secret: json!({ "refresh_token": "1//test-refresh-token" }).to_string(),
    }
}

pub fn sa_credentials(alias: &str) -> AccountCredentials {
    AccountCredentials {
        account_key: AccountKey::new(alias.to_string()).unwrap(),
        auth_type: AuthType::SaShare,
        secret: json!({
            "type": "service_account",
            "client_email": "mirror@test-project.iam.gserviceaccount.com",
            "private_key_id": "test-key-id",
            "private_key": TEST_PRIVATE_KEY
        })
        .to_string(),
    }
}

/// A Drive file resource as the API returns it
pub fn drive_file(id: &str, name: &str, parent: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "mimeType": "text/plain",
        "size": "1024",
        "md5Checksum": "d41d8cd98f00b204e9800998ecf8427e",
        "parents": [parent],
        "modifiedTime": "2026-01-15T10:00:00.000Z",
        "trashed": false,
        "ownedByMe": true,
        "owners": [{ "emailAddress": "owner@example.com" }]
    })
}

/// A Drive error envelope with one reason
pub fn error_body(code: u16, reason: &str, message: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "message": message,
            "errors": [{ "domain": "usageLimits", "reason": reason, "message": message }]
        }
    })
}
