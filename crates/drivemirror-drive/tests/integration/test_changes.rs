//! Change feed tests: removals, upserts, cursors

use drivemirror_core::{
    domain::SyncCursor,
    ports::{IRemoteLister, RemoteChange},
};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, drive_file, oauth_credentials};

fn cursor(value: &str) -> SyncCursor {
    SyncCursor::new(value.to_string()).unwrap()
}

#[tokio::test]
async fn test_changes_page_maps_removals_and_upserts() {
    let (server, lister) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/changes"))
        .and(query_param("pageToken", "100"))
        .and(query_param("includeRemoved", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "changes": [
                { "changeType": "file", "fileId": "gone", "removed": true },
                { "changeType": "file", "fileId": "f1", "removed": false,
                  "file": drive_file("f1", "renamed.txt", "root") },
                { "changeType": "drive", "driveId": "0AShared", "removed": false }
            ],
            "nextPageToken": "101"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = lister
        .list_changes_page(&oauth_credentials("alice@example.com"), &cursor("100"), 100)
        .await
        .unwrap();

    assert_eq!(page.changes.len(), 2);
    assert_eq!(
        page.changes[0],
        RemoteChange::Removed {
            file_id: "gone".to_string()
        }
    );
    match &page.changes[1] {
        RemoteChange::Upserted(file) => assert_eq!(file.name, "renamed.txt"),
        other => panic!("expected upsert, got {other:?}"),
    }
    assert_eq!(page.next_cursor, Some(cursor("101")));
    assert!(page.new_start_cursor.is_none());
}

#[tokio::test]
async fn test_last_changes_page_carries_new_start_cursor() {
    let (server, lister) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/changes"))
        .and(query_param("pageToken", "101"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "changes": [],
            "newStartPageToken": "102"
        })))
        .mount(&server)
        .await;

    let page = lister
        .list_changes_page(&oauth_credentials("alice@example.com"), &cursor("101"), 100)
        .await
        .unwrap();

    assert!(page.changes.is_empty());
    assert!(page.next_cursor.is_none());
    assert_eq!(page.new_start_cursor, Some(cursor("102")));
}

#[tokio::test]
async fn test_trashed_file_change_is_an_upsert() {
    let (server, lister) = common::setup_drive_mock().await;

    let mut trashed = drive_file("t1", "old.txt", "root");
    trashed["trashed"] = json!(true);

    Mock::given(method("GET"))
        .and(path("/changes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "changes": [{ "changeType": "file", "fileId": "t1", "removed": false, "file": trashed }],
            "newStartPageToken": "9"
        })))
        .mount(&server)
        .await;

    let page = lister
        .list_changes_page(&oauth_credentials("alice@example.com"), &cursor("8"), 100)
        .await
        .unwrap();

    match &page.changes[0] {
        RemoteChange::Upserted(file) => assert!(file.trashed),
        other => panic!("expected upsert, got {other:?}"),
    }
}

#[tokio::test]
async fn test_get_start_cursor() {
    let (server, lister) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/changes/startPageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "drive#startPageToken",
            "startPageToken": "4242"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let start = lister
        .get_start_cursor(&oauth_credentials("alice@example.com"))
        .await
        .unwrap();
    assert_eq!(start, cursor("4242"));
}
