//! Token acquisition tests

use drivemirror_core::ports::{AccountCredentials, IRemoteLister, ListScope};
use drivemirror_drive::DriveError;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, oauth_credentials, sa_credentials};

async fn mount_empty_listing(server: &wiremock::MockServer) {
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_access_token_is_cached_per_account() {
    let (server, lister) = common::setup_server().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("refresh_token=1%2F%2Ftest-refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "cached-token",
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .expect(2)
        .mount(&server)
        .await;
    mount_empty_listing(&server).await;

    let alice = oauth_credentials("alice@example.com");
    let bob = oauth_credentials("bob@example.com");
    for _ in 0..3 {
        lister
            .list_page(&alice, &ListScope::WholeDrive, None, 10)
            .await
            .unwrap();
    }
    lister
        .list_page(&bob, &ListScope::WholeDrive, None, 10)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_new_secret_for_same_account_gets_new_token() {
    let (server, lister) = common::setup_server().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("refresh_token=1%2F%2Ftest-refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "old-token",
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("refresh_token=1%2F%2Frotated-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-token",
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(header("authorization", "Bearer new-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
        .expect(1)
        .mount(&server)
        .await;
    mount_empty_listing(&server).await;

    let original = oauth_credentials("alice@example.com");
    lister
        .list_page(&original, &ListScope::WholeDrive, None, 10)
        .await
        .unwrap();

    // Same key, re-registered with a different refresh token
    let rotated = AccountCredentials {
        secret: json!({ "refresh_token": "1//rotated-token" }).to_string(),
        ..oauth_credentials("alice@example.com")
    };
    lister
        .list_page(&rotated, &ListScope::WholeDrive, None, 10)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rejected_refresh_token_is_fatal() {
    let (server, lister) = common::setup_server().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .mount(&server)
        .await;

    let err = lister
        .list_page(
            &oauth_credentials("alice@example.com"),
            &ListScope::WholeDrive,
            None,
            10,
        )
        .await
        .unwrap_err();

    assert!(!lister.classify_error(&err).retryable);
    assert!(err
        .chain()
        .any(|e| matches!(e.downcast_ref::<DriveError>(), Some(DriveError::Unauthorized(_)))));
}

#[tokio::test]
async fn test_rejected_assertion_is_fatal() {
    let (server, lister) = common::setup_server().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid JWT Signature."
        })))
        .mount(&server)
        .await;

    let err = lister
        .get_start_cursor(&sa_credentials("team-share"))
        .await
        .unwrap_err();

    assert!(!lister.classify_error(&err).retryable);
    assert!(format!("{err:#}").contains("Invalid JWT Signature"));
}

#[tokio::test]
async fn test_undecodable_secret_is_fatal() {
    let (_server, lister) = common::setup_drive_mock().await;

    let mut creds = oauth_credentials("alice@example.com");
    creds.secret = "not a json document".to_string();

    let err = lister
        .list_page(&creds, &ListScope::WholeDrive, None, 10)
        .await
        .unwrap_err();
    assert!(!lister.classify_error(&err).retryable);
}
