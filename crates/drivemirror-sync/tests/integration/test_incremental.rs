//! Incremental sync tests

use drivemirror_core::domain::{AccountKey, AccountStatus, FileId};
use drivemirror_core::ports::{IMirrorStore, RemoteChange, RemoteFile};
use drivemirror_sync::SyncError;

use crate::common::*;

fn fid(id: &str) -> FileId {
    FileId::new(id.to_string()).unwrap()
}

fn removed(id: &str) -> RemoteChange {
    RemoteChange::Removed {
        file_id: id.to_string(),
    }
}

async fn crawled_oauth(h: &Harness) -> AccountKey {
    let key = add_oauth(h, "alice@example.com").await;
    h.lister.page(
        "drive",
        None,
        vec![remote_file("f1", "root"), remote_file("f2", "root")],
        None,
    );
    h.service.trigger_crawl(&key).await.unwrap().await.unwrap().unwrap();
    key
}

mod change_feed {
    use super::*;

    #[tokio::test]
    async fn test_removal_propagates() {
        let h = harness().await;
        let key = crawled_oauth(&h).await;
        h.lister
            .change_page("start-1", vec![removed("f1")], None, Some("start-2"));

        let report = h
            .service
            .trigger_incremental_sync(&key)
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.removals, 1);
        let status = status_of(&h, &key).await;
        assert_eq!(status.file_count, 1);
        assert_eq!(status.status, AccountStatus::Idle);
        assert!(h.store.get_file(&key, &fid("f1")).await.unwrap().is_none());
        assert!(h.store.get_file(&key, &fid("f2")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_follows_pages_and_applies_upserts() {
        let h = harness().await;
        let key = crawled_oauth(&h).await;
        let renamed = RemoteFile {
            name: "renamed.txt".to_string(),
            ..remote_file("f2", "root")
        };
        h.lister.change_page(
            "start-1",
            vec![RemoteChange::Upserted(remote_file("f3", "root"))],
            Some("page-2"),
            None,
        );
        h.lister.change_page(
            "page-2",
            vec![RemoteChange::Upserted(renamed), removed("f1")],
            None,
            Some("start-2"),
        );

        let report = h
            .service
            .trigger_incremental_sync(&key)
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.pages, 2);
        assert_eq!(report.upserts, 2);
        assert_eq!(report.removals, 1);
        let f2 = h.store.get_file(&key, &fid("f2")).await.unwrap().unwrap();
        assert_eq!(f2.name(), "renamed.txt");
        assert_eq!(h.store.count_files(&key).await.unwrap(), 2);

        let account = h.service.get_account(&key).await.unwrap();
        assert_eq!(account.sync_cursor().unwrap().as_str(), "start-2");
    }

    #[tokio::test]
    async fn test_trashed_file_stays_with_flag() {
        let h = harness().await;
        let key = crawled_oauth(&h).await;
        let trashed = RemoteFile {
            trashed: true,
            ..remote_file("f1", "root")
        };
        h.lister.change_page(
            "start-1",
            vec![RemoteChange::Upserted(trashed)],
            None,
            Some("start-2"),
        );

        h.service
            .trigger_incremental_sync(&key)
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        let f1 = h.store.get_file(&key, &fid("f1")).await.unwrap().unwrap();
        assert!(f1.is_trashed());
    }

    #[tokio::test]
    async fn test_removing_absent_file_is_not_counted() {
        let h = harness().await;
        let key = crawled_oauth(&h).await;
        h.lister.change_page(
            "start-1",
            vec![removed("ghost"), removed("f1")],
            None,
            Some("start-2"),
        );

        let report = h
            .service
            .trigger_incremental_sync(&key)
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        assert!(report.is_clean());
        assert_eq!(report.removals, 1);
        assert_eq!(h.store.count_files(&key).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_cursor_is_fetched_and_persisted() {
        let h = harness().await;
        let key = add_oauth(&h, "alice@example.com").await;
        h.lister.set_start_cursor("fresh");

        h.service
            .trigger_incremental_sync(&key)
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(h.lister.calls(), vec!["start_cursor", "changes @fresh"]);
        let account = h.service.get_account(&key).await.unwrap();
        assert_eq!(account.sync_cursor().unwrap().as_str(), "fresh");
    }

    #[tokio::test]
    async fn test_new_start_cursor_persisted_before_later_failure() {
        let h = harness().await;
        let key = crawled_oauth(&h).await;
        h.lister.change_page(
            "start-1",
            vec![removed("f1")],
            Some("page-2"),
            Some("start-2"),
        );
        h.lister.fail_on("changes @page-2", ScriptedError::fatal());

        let result = h
            .service
            .trigger_incremental_sync(&key)
            .await
            .unwrap()
            .await
            .unwrap();

        assert!(matches!(result, Err(SyncError::AttemptFailed(_))));
        let account = h.service.get_account(&key).await.unwrap();
        assert_eq!(account.status(), AccountStatus::Error);
        assert_eq!(account.sync_cursor().unwrap().as_str(), "start-2");
    }

    #[tokio::test]
    async fn test_fatal_error_keeps_cursor_and_last_sync() {
        let h = harness().await;
        let key = crawled_oauth(&h).await;
        let before = status_of(&h, &key).await;
        h.lister.fail_on("changes @start-1", ScriptedError::fatal());

        let result = h
            .service
            .trigger_incremental_sync(&key)
            .await
            .unwrap()
            .await
            .unwrap();

        assert!(result.is_err());
        let account = h.service.get_account(&key).await.unwrap();
        assert_eq!(account.sync_cursor().unwrap().as_str(), "start-1");
        assert_eq!(account.last_sync_at(), before.last_sync_at);
    }

    #[tokio::test]
    async fn test_rate_limited_change_page_is_retried() {
        let h = harness().await;
        let key = crawled_oauth(&h).await;
        h.lister
            .change_page("start-1", vec![removed("f2")], None, Some("start-2"));
        h.lister
            .fail_on("changes @start-1", ScriptedError::rate_limited());

        let report = h
            .service
            .trigger_incremental_sync(&key)
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.retries, 1);
        assert_eq!(report.removals, 1);
        assert_eq!(h.store.count_files(&key).await.unwrap(), 1);
    }
}

mod share {
    use super::*;

    #[tokio::test]
    async fn test_never_synced_share_lists_from_epoch() {
        let h = harness().await;
        let key = add_share(&h, "team", &["rootA"]).await;

        h.service
            .trigger_incremental_sync(&key)
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            h.lister.calls(),
            vec!["list modified:rootA since=1970-01-01T00:00:00Z folders=true"]
        );
    }

    #[tokio::test]
    async fn test_watermark_is_last_sync_minus_overlap() {
        let h = harness().await;
        let key = add_share(&h, "team", &["rootA"]).await;
        h.lister
            .page("children:rootA", None, vec![remote_file("a1", "rootA")], None);
        h.service.trigger_crawl(&key).await.unwrap().await.unwrap().unwrap();
        let last_sync = status_of(&h, &key).await.last_sync_at.unwrap();

        h.service
            .trigger_incremental_sync(&key)
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        let since = (last_sync - chrono::Duration::seconds(60)).format("%Y-%m-%dT%H:%M:%SZ");
        let expected = format!("list modified:rootA since={since} folders=true");
        assert_eq!(h.lister.calls().last().unwrap(), &expected);
    }

    #[tokio::test]
    async fn test_modified_files_upserted_and_deletions_not_detected() {
        let h = harness().await;
        let key = add_share(&h, "team", &["rootA", "rootB"]).await;
        h.lister.page(
            "children:rootA",
            None,
            vec![remote_file("a1", "rootA"), remote_file("a2", "rootA")],
            None,
        );
        h.service.trigger_crawl(&key).await.unwrap().await.unwrap().unwrap();

        // a2 was deleted remotely; only a1 changed
        let edited = RemoteFile {
            name: "edited.txt".to_string(),
            ..remote_file("a1", "rootA")
        };
        h.lister.page("modified:rootA", None, vec![edited], None);
        h.lister
            .page("modified:rootB", None, vec![remote_file("b1", "rootB")], None);

        let report = h
            .service
            .trigger_incremental_sync(&key)
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.upserts, 2);
        assert_eq!(report.removals, 0);
        let a1 = h.store.get_file(&key, &fid("a1")).await.unwrap().unwrap();
        assert_eq!(a1.name(), "edited.txt");
        assert!(h.store.get_file(&key, &fid("a2")).await.unwrap().is_some());
        assert_eq!(h.store.count_files(&key).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_subtree_descends_into_listed_folders() {
        let h = harness().await;
        let key = add_share(&h, "team", &["rootA"]).await;
        h.lister
            .page("modified:rootA", None, vec![remote_folder("sub", "rootA")], None);
        h.lister
            .page("modified:sub", None, vec![remote_file("deep", "sub")], None);

        h.service
            .trigger_incremental_sync(&key)
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        let calls = h.lister.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].starts_with("list modified:sub "));
        assert!(h.store.get_file(&key, &fid("deep")).await.unwrap().is_some());
    }
}
