//! Full crawl tests

use chrono::Utc;
use drivemirror_core::config::{ShareScope, SyncConfig};
use drivemirror_core::domain::{AccountStatus, FileId, FileRecord};
use drivemirror_core::ports::IMirrorStore;
use drivemirror_sync::SyncError;

use crate::common::*;

fn fid(id: &str) -> FileId {
    FileId::new(id.to_string()).unwrap()
}

mod oauth {
    use super::*;

    #[tokio::test]
    async fn test_two_page_crawl_mirrors_both_files() {
        let h = harness().await;
        let key = add_oauth(&h, "alice@example.com").await;
        h.lister
            .page("drive", None, vec![remote_file("f1", "root")], Some("p2"));
        h.lister
            .page("drive", Some("p2"), vec![remote_file("f2", "root")], None);

        let report = h.service.trigger_crawl(&key).await.unwrap().await.unwrap().unwrap();

        assert_eq!(report.pages, 2);
        assert_eq!(report.upserts, 2);
        assert!(report.is_clean());

        let status = status_of(&h, &key).await;
        assert_eq!(status.file_count, 2);
        assert_eq!(status.status, AccountStatus::Idle);
        assert!(status.last_sync_at.is_some());
        assert!(status.last_error.is_none());

        assert_eq!(
            h.lister.calls(),
            vec!["start_cursor", "list drive", "list drive @p2"]
        );
    }

    #[tokio::test]
    async fn test_crawl_captures_start_cursor_first() {
        let h = harness().await;
        let key = add_oauth(&h, "alice@example.com").await;
        h.lister.set_start_cursor("cursor-at-crawl");

        h.service.trigger_crawl(&key).await.unwrap().await.unwrap().unwrap();

        let account = h.service.get_account(&key).await.unwrap();
        assert_eq!(account.sync_cursor().unwrap().as_str(), "cursor-at-crawl");
    }

    #[tokio::test]
    async fn test_crawl_uses_decrypted_secret() {
        let h = harness().await;
        let key = add_oauth(&h, "alice@example.com").await;

        h.service.trigger_crawl(&key).await.unwrap().await.unwrap().unwrap();

        let secrets = h.lister.secrets_seen();
        assert!(!secrets.is_empty());
        assert!(secrets.iter().all(|s| s == r#"{"refresh_token":"1//token"}"#));
    }

    #[tokio::test]
    async fn test_crawl_is_idempotent() {
        let h = harness().await;
        let key = add_oauth(&h, "alice@example.com").await;
        h.lister.page(
            "drive",
            None,
            vec![remote_file("f1", "root"), remote_file("f2", "root")],
            None,
        );

        h.service.trigger_crawl(&key).await.unwrap().await.unwrap().unwrap();
        let first = h.store.get_file(&key, &fid("f1")).await.unwrap().unwrap();

        h.service.trigger_crawl(&key).await.unwrap().await.unwrap().unwrap();
        let second = h.store.get_file(&key, &fid("f1")).await.unwrap().unwrap();

        assert_eq!(h.store.count_files(&key).await.unwrap(), 2);
        assert_eq!(first, second);
    }
}

mod share {
    use super::*;

    #[tokio::test]
    async fn test_two_roots_mirror_their_children() {
        let h = harness().await;
        let key = add_share(&h, "team", &["rootA", "rootB"]).await;
        h.lister
            .page("children:rootA", None, vec![remote_file("a1", "rootA")], None);
        h.lister
            .page("children:rootB", None, vec![remote_file("b1", "rootB")], None);

        h.service.trigger_crawl(&key).await.unwrap().await.unwrap().unwrap();

        let status = status_of(&h, &key).await;
        assert_eq!(status.file_count, 2);
        assert_eq!(status.status, AccountStatus::Idle);
        assert!(status.last_sync_at.is_some());
        assert_eq!(
            h.lister.calls(),
            vec!["list children:rootA", "list children:rootB"]
        );
    }

    #[tokio::test]
    async fn test_subtree_walks_each_folder_once() {
        let h = harness().await;
        let key = add_share(&h, "team", &["rootA", "rootB"]).await;
        h.lister.page(
            "children:rootA",
            None,
            vec![remote_folder("shared", "rootA"), remote_file("a1", "rootA")],
            None,
        );
        h.lister
            .page("children:rootB", None, vec![remote_folder("shared", "rootB")], None);
        h.lister
            .page("children:shared", None, vec![remote_file("s1", "shared")], None);

        h.service.trigger_crawl(&key).await.unwrap().await.unwrap().unwrap();

        let calls = h.lister.calls();
        assert_eq!(
            calls,
            vec![
                "list children:rootA",
                "list children:rootB",
                "list children:shared"
            ]
        );
        assert_eq!(h.store.count_files(&key).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_direct_children_scope_does_not_descend() {
        let h = harness_with(direct_children_config()).await;
        let key = add_share(&h, "team", &["rootA"]).await;
        h.lister.page(
            "children:rootA",
            None,
            vec![remote_folder("sub", "rootA"), remote_file("a1", "rootA")],
            None,
        );
        h.lister
            .page("children:sub", None, vec![remote_file("deep", "sub")], None);

        h.service.trigger_crawl(&key).await.unwrap().await.unwrap().unwrap();

        assert_eq!(h.lister.calls(), vec!["list children:rootA"]);
        assert_eq!(h.store.count_files(&key).await.unwrap(), 2);
    }
}

fn direct_children_config() -> SyncConfig {
    SyncConfig {
        share_scope: ShareScope::DirectChildren,
        ..test_sync_config()
    }
}

fn reconciling_config() -> SyncConfig {
    SyncConfig {
        reconcile_after_crawl: true,
        ..test_sync_config()
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn test_rate_limit_retries_same_page() {
        let h = harness().await;
        let key = add_oauth(&h, "alice@example.com").await;
        h.lister
            .page("drive", None, vec![remote_file("f1", "root")], Some("p2"));
        h.lister
            .page("drive", Some("p2"), vec![remote_file("f2", "root")], None);
        h.lister
            .fail_on("list drive @p2", ScriptedError::rate_limited());
        h.lister
            .fail_on("list drive @p2", ScriptedError::rate_limited());

        let report = h.service.trigger_crawl(&key).await.unwrap().await.unwrap().unwrap();

        assert_eq!(report.retries, 2);
        assert_eq!(report.pages, 2);
        assert_eq!(
            h.lister.calls(),
            vec![
                "start_cursor",
                "list drive",
                "list drive @p2",
                "list drive @p2",
                "list drive @p2"
            ]
        );
        let status = status_of(&h, &key).await;
        assert_eq!(status.status, AccountStatus::Idle);
        assert_eq!(status.file_count, 2);
    }

    #[tokio::test]
    async fn test_fatal_error_marks_account_failed() {
        let h = harness().await;
        let key = add_oauth(&h, "alice@example.com").await;
        h.lister
            .page("drive", None, vec![remote_file("f1", "root")], Some("p2"));
        h.lister.fail_on("list drive @p2", ScriptedError::fatal());

        let result = h.service.trigger_crawl(&key).await.unwrap().await.unwrap();
        assert!(matches!(result, Err(SyncError::AttemptFailed(_))));

        let status = status_of(&h, &key).await;
        assert_eq!(status.status, AccountStatus::Error);
        assert!(status.last_sync_at.is_none());
        assert!(status.last_error.unwrap().contains("scripted failure"));
        // The first page stays applied
        assert_eq!(status.file_count, 1);
    }

    #[tokio::test]
    async fn test_manual_restart_from_error() {
        let h = harness().await;
        let key = add_oauth(&h, "alice@example.com").await;
        h.lister
            .page("drive", None, vec![remote_file("f1", "root")], None);
        h.lister.fail_on("list drive", ScriptedError::fatal());

        let failed = h.service.trigger_crawl(&key).await.unwrap().await.unwrap();
        assert!(failed.is_err());
        assert_eq!(status_of(&h, &key).await.status, AccountStatus::Error);

        h.service.trigger_crawl(&key).await.unwrap().await.unwrap().unwrap();
        let status = status_of(&h, &key).await;
        assert_eq!(status.status, AccountStatus::Idle);
        assert!(status.last_error.is_none());
        assert_eq!(status.file_count, 1);
    }

    #[tokio::test]
    async fn test_malformed_record_is_skipped() {
        let h = harness().await;
        let key = add_oauth(&h, "alice@example.com").await;
        let bad_size = drivemirror_core::ports::RemoteFile {
            size: Some("lots".to_string()),
            ..remote_file("bad", "root")
        };
        let bad_time = drivemirror_core::ports::RemoteFile {
            modified_time: Some("yesterday".to_string()),
            ..remote_file("worse", "root")
        };
        h.lister.page(
            "drive",
            None,
            vec![bad_size, remote_file("good", "root"), bad_time],
            None,
        );

        let report = h.service.trigger_crawl(&key).await.unwrap().await.unwrap().unwrap();

        assert_eq!(report.upserts, 1);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].contains("bad"));
        let status = status_of(&h, &key).await;
        assert_eq!(status.status, AccountStatus::Idle);
        assert_eq!(status.file_count, 1);
    }

    #[tokio::test]
    async fn test_undecryptable_secret_fails_attempt() {
        let h = harness().await;
        let account = drivemirror_core::domain::Account::new_oauth(
            drivemirror_core::domain::Email::new("bob@example.com".to_string()).unwrap(),
            "not-sealed",
        );
        h.store.insert_account(&account).await.unwrap();

        let result = h.service.trigger_crawl(account.key()).await.unwrap().await.unwrap();

        assert!(matches!(result, Err(SyncError::AttemptFailed(_))));
        let status = status_of(&h, account.key()).await;
        assert_eq!(status.status, AccountStatus::Error);
        assert!(status.last_error.unwrap().contains("decrypt"));
        assert!(h.lister.calls().is_empty());
    }
}

mod reconcile {
    use super::*;

    async fn seed_stale_row(h: &Harness, key: &drivemirror_core::domain::AccountKey) {
        let stale = FileRecord::new(fid("stale"), "old.txt", "text/plain", Utc::now());
        h.store.apply_file_record(key, &stale).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    #[tokio::test]
    async fn test_crawl_alone_never_deletes() {
        let h = harness().await;
        let key = add_oauth(&h, "alice@example.com").await;
        seed_stale_row(&h, &key).await;
        h.lister
            .page("drive", None, vec![remote_file("f1", "root")], None);

        let report = h.service.trigger_crawl(&key).await.unwrap().await.unwrap().unwrap();

        assert_eq!(report.pruned, 0);
        assert!(h.store.get_file(&key, &fid("stale")).await.unwrap().is_some());
        assert_eq!(h.store.count_files(&key).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_prunes_unseen_rows() {
        let h = harness_with(reconciling_config()).await;
        let key = add_oauth(&h, "alice@example.com").await;
        seed_stale_row(&h, &key).await;
        h.lister
            .page("drive", None, vec![remote_file("f1", "root")], None);

        let report = h.service.trigger_crawl(&key).await.unwrap().await.unwrap().unwrap();

        assert_eq!(report.pruned, 1);
        assert!(h.store.get_file(&key, &fid("stale")).await.unwrap().is_none());
        assert!(h.store.get_file(&key, &fid("f1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reconcile_skipped_after_record_errors() {
        let h = harness_with(reconciling_config()).await;
        let key = add_oauth(&h, "alice@example.com").await;
        seed_stale_row(&h, &key).await;
        let broken = drivemirror_core::ports::RemoteFile {
            size: Some("-1".to_string()),
            ..remote_file("broken", "root")
        };
        h.lister
            .page("drive", None, vec![remote_file("f1", "root"), broken], None);

        let report = h.service.trigger_crawl(&key).await.unwrap().await.unwrap().unwrap();

        assert_eq!(report.pruned, 0);
        assert!(h.store.get_file(&key, &fid("stale")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_reconcile_leaves_account_restartable() {
        let h = harness_layered(reconciling_config(), LockedPruneStore::wrap).await;
        let key = add_oauth(&h, "alice@example.com").await;
        h.lister
            .page("drive", None, vec![remote_file("f1", "root")], None);

        let result = h.service.trigger_crawl(&key).await.unwrap().await.unwrap();

        match result {
            Err(SyncError::AttemptFailed(reason)) => {
                assert!(reason.contains("database is locked"), "{reason}")
            }
            other => panic!("expected AttemptFailed, got {other:?}"),
        }
        let status = status_of(&h, &key).await;
        assert_eq!(status.status, AccountStatus::Error);
        assert!(status.last_error.unwrap().contains("database is locked"));
        assert!(status.last_sync_at.is_none());

        // Not wedged in `crawling`: a new attempt can claim it
        let retry = h.service.trigger_crawl(&key).await.unwrap().await.unwrap();
        assert!(matches!(retry, Err(SyncError::AttemptFailed(_))));
    }
}
