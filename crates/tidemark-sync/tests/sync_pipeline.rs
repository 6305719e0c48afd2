//! End-to-end synchronization scenarios against in-memory gateways and
//! temporary directories acting as live mounts.

use tidemark_core::{AccessScope, AclEntry};
use tidemark_sync::index::BulkOperation;
use tidemark_sync::{ChunkOutcome, ChunkStage};
use tidemark_test_utils::{SyncHarness, event_line, move_line, tags};

const FS: &str = "filer:/data";
const OTHER_FS: &str = "filer:/other";

fn index_ops(batches: &[Vec<BulkOperation>]) -> (usize, usize, usize) {
    let mut creates = 0;
    let mut updates = 0;
    let mut deletes = 0;
    for operation in batches.iter().flatten() {
        match operation {
            BulkOperation::Index { id: None, .. } => creates += 1,
            BulkOperation::Index { id: Some(_), .. } => updates += 1,
            BulkOperation::Delete { .. } => deletes += 1,
        }
    }
    (creates, updates, deletes)
}

#[tokio::test]
async fn test_created_file_is_indexed_and_events_deleted() {
    let harness = SyncHarness::new();
    harness.add_nfs_storage(1, FS);
    harness.write_file(1, "docs/a.txt", b"hello");
    harness.stage_events("w1", "0001.log", &[event_line(10, "c", FS, "docs/a.txt")]);

    let report = harness.run().await;

    assert!(report.is_success(), "report: {report:?}");
    assert_eq!(harness.index.paths(1), vec!["docs/a.txt"]);
    assert!(harness.staged_files().is_empty());

    let alias = harness.config.index_alias(1);
    let document = harness.index.document(1, "docs/a.txt").unwrap();
    assert_eq!(harness.index.alias_target(&alias), Some(document.index));
}

#[tokio::test]
async fn test_create_then_delete_cancels() {
    let harness = SyncHarness::new();
    harness.add_nfs_storage(1, FS);
    harness.stage_events(
        "w1",
        "0001.log",
        &[event_line(1, "c", FS, "tmp.txt"), event_line(2, "d", FS, "tmp.txt")],
    );

    let report = harness.run().await;

    assert!(report.is_success());
    assert!(harness.index.bulk_batches().is_empty());
    assert_eq!(report.producers[0].chunks[0].net_events, 0);
    assert!(harness.staged_files().is_empty());
}

#[tokio::test]
async fn test_latest_event_wins_across_files() {
    let harness = SyncHarness::new();
    harness.add_nfs_storage(1, FS);
    harness.write_file(1, "a.txt", b"v1");
    harness.stage_events("w1", "0001.log", &[event_line(1, "c", FS, "a.txt")]);
    assert!(harness.run().await.is_success());

    harness.remove_file(1, "a.txt");
    harness.stage_events("w1", "0002.log", &[event_line(5, "d", FS, "a.txt")]);
    harness.stage_events("w1", "0003.log", &[event_line(3, "m", FS, "a.txt")]);

    let report = harness.run().await;

    assert!(report.is_success());
    assert!(harness.index.paths(1).is_empty());
}

#[tokio::test]
async fn test_folder_delete_removes_only_matching_documents() {
    let harness = SyncHarness::new();
    harness.add_nfs_storage(1, FS);
    for path in ["a/x", "a/y", "b/z"] {
        harness.write_file(1, path, b"data");
    }
    harness.stage_events(
        "w1",
        "0001.log",
        &[
            event_line(1, "c", FS, "a/x"),
            event_line(1, "c", FS, "a/y"),
            event_line(1, "c", FS, "b/z"),
        ],
    );
    assert!(harness.run().await.is_success());

    std::fs::remove_dir_all(harness.mounts.mount_dir(1).join("a")).unwrap();
    harness.stage_events("w1", "0002.log", &[event_line(9, "fd", FS, "a/*")]);

    let report = harness.run().await;

    assert!(report.is_success());
    assert_eq!(harness.index.paths(1), vec!["b/z"]);
}

#[tokio::test]
async fn test_folder_move_rewrites_documents() {
    let harness = SyncHarness::new();
    harness.add_nfs_storage(1, FS);
    harness.write_file(1, "a/sub/file", b"payload");
    harness.stage_events("w1", "0001.log", &[event_line(1, "c", FS, "a/sub/file")]);
    assert!(harness.run().await.is_success());

    harness.rename(1, "a", "c");
    harness.stage_events("w1", "0002.log", &[move_line(20, "fm", FS, "a/*", "c/*")]);

    let report = harness.run().await;

    assert!(report.is_success());
    assert_eq!(harness.index.paths(1), vec!["c/sub/file"]);
    let moved = harness.index.document(1, "c/sub/file").unwrap();
    assert_eq!(moved.source["size"], 7);
    assert_eq!(moved.source["name"], "file");
}

#[tokio::test]
async fn test_replay_is_idempotent() {
    let harness = SyncHarness::new();
    harness.add_nfs_storage(1, FS);
    harness.write_file(1, "a.txt", b"one");
    harness.write_file(1, "b.txt", b"two");
    let lines = [
        event_line(1, "c", FS, "a.txt"),
        event_line(2, "c", FS, "b.txt"),
        event_line(3, "m", FS, "a.txt"),
        event_line(4, "d", FS, "gone.txt"),
    ];
    harness.stage_events("w1", "0001.log", &lines);
    assert!(harness.run().await.is_success());
    let first = harness.index.documents(1);
    let batches_after_first = harness.index.bulk_batches().len();

    harness.stage_events("w1", "0001.log", &lines);
    assert!(harness.run().await.is_success());

    let second = harness.index.documents(1);
    assert_eq!(first, second);
    let replayed = &harness.index.bulk_batches()[batches_after_first..];
    let (creates, updates, deletes) = index_ops(replayed);
    assert_eq!((creates, deletes), (0, 0));
    assert_eq!(updates, 2);
}

#[tokio::test]
async fn test_mount_failure_is_isolated_to_its_chunk() {
    let harness = SyncHarness::new();
    harness.add_nfs_storage(1, FS);
    harness.add_nfs_storage(2, OTHER_FS);
    harness.write_file(1, "a.txt", b"a");
    harness.write_file(2, "b.txt", b"b");
    harness.mounts.set_unavailable(1, true);

    let failing = harness.stage_events("producer-a", "0001.log", &[event_line(1, "c", FS, "a.txt")]);
    harness.stage_events("producer-b", "0001.log", &[event_line(1, "c", OTHER_FS, "b.txt")]);

    let report = harness.run().await;

    assert_eq!(report.chunks_failed(), 1);
    assert_eq!(report.chunks_succeeded(), 1);
    let failed = &report.producers[0].chunks[0];
    assert!(matches!(
        failed.outcome,
        Some(ChunkOutcome::Failed {
            stage: ChunkStage::Expanded,
            ..
        })
    ));
    assert_eq!(harness.staged_files(), vec![failing]);
    assert_eq!(harness.index.paths(2), vec!["b.txt"]);
    assert!(harness.index.paths(1).is_empty());

    harness.mounts.set_unavailable(1, false);
    let retry = harness.run().await;
    assert!(retry.is_success());
    assert_eq!(harness.index.paths(1), vec!["a.txt"]);
    assert!(harness.staged_files().is_empty());
}

#[tokio::test]
async fn test_chunk_exceeding_timeout_fails_and_keeps_files() {
    let mut harness = SyncHarness::new();
    harness.config.chunk_timeout_secs = Some(1);
    harness.add_nfs_storage(1, FS);
    harness.add_nfs_storage(2, OTHER_FS);
    harness.write_file(1, "a.txt", b"a");
    harness.write_file(2, "b.txt", b"b");
    harness.mounts.set_stalled(1, true);

    let stalled = harness.stage_events("producer-a", "0001.log", &[event_line(1, "c", FS, "a.txt")]);
    harness.stage_events("producer-b", "0001.log", &[event_line(1, "c", OTHER_FS, "b.txt")]);

    let report = harness.run().await;

    assert_eq!(report.chunks_failed(), 1);
    match &report.producers[0].chunks[0].outcome {
        Some(ChunkOutcome::Failed { error, .. }) => {
            assert!(error.contains("did not complete within"), "error: {error}");
        }
        other => panic!("expected timed out chunk, got {other:?}"),
    }
    assert_eq!(
        report.producers[1].chunks[0].outcome,
        Some(ChunkOutcome::Cleaned)
    );
    assert_eq!(harness.staged_files(), vec![stalled]);
    assert!(harness.index.paths(1).is_empty());
    assert_eq!(harness.index.paths(2), vec!["b.txt"]);
}

#[tokio::test]
async fn test_producers_beyond_concurrency_limit_all_complete() {
    let mut harness = SyncHarness::new();
    harness.config.max_concurrent_producers = 1;
    harness.add_nfs_storage(1, FS);
    for producer in ["w1", "w2", "w3"] {
        let path = format!("{producer}.txt");
        harness.write_file(1, &path, producer.as_bytes());
        harness.stage_events(producer, "0001.log", &[event_line(1, "c", FS, &path)]);
    }

    let report = harness.run().await;

    assert!(report.is_success(), "report: {report:?}");
    assert_eq!(
        report
            .producers
            .iter()
            .map(|producer| producer.producer.as_str())
            .collect::<Vec<_>>(),
        vec!["w1", "w2", "w3"]
    );
    assert_eq!(report.chunks_succeeded(), 3);
    assert_eq!(harness.index.paths(1), vec!["w1.txt", "w2.txt", "w3.txt"]);
    assert!(harness.staged_files().is_empty());
}

#[tokio::test]
async fn test_folder_move_at_last_timestamp_completes_the_run() {
    let harness = SyncHarness::new();
    harness.add_nfs_storage(1, FS);
    harness.write_file(1, "a/x", b"x");
    harness.stage_events("w1", "0001.log", &[event_line(1, "c", FS, "a/x")]);
    assert!(harness.run().await.is_success());

    harness.stage_events(
        "w1",
        "0002.log",
        &[move_line(i64::MAX, "fm", FS, "a/*", "c/*")],
    );

    let report = harness.run().await;

    assert!(report.is_success(), "report: {report:?}");
    assert_eq!(harness.index.paths(1), vec!["a/x"]);
    assert!(harness.staged_files().is_empty());
}

#[tokio::test]
async fn test_metadata_round_trip() {
    let harness = SyncHarness::new();
    harness.add_nfs_storage(1, FS);
    harness.write_file(1, "data/report.csv", &[0_u8; 1234]);
    harness.tags.set_tag(1, "data/report.csv", "project", "apollo");
    harness.catalog.set_permissions(
        1,
        vec![
            AclEntry {
                name: "alice".into(),
                principal: true,
                mask: AclEntry::READ,
            },
            AclEntry {
                name: "guests".into(),
                principal: false,
                mask: AclEntry::NO_READ,
            },
        ],
    );
    harness.stage_events("w1", "0001.log", &[event_line(1, "m", FS, "data/report.csv")]);

    assert!(harness.run().await.is_success());

    let document = harness.index.document(1, "data/report.csv").unwrap();
    assert_eq!(document.source["size"], 1234);
    assert_eq!(
        serde_json::from_value::<std::collections::BTreeMap<String, String>>(
            document.source["tags"].clone()
        )
        .unwrap(),
        tags([("project", "apollo")])
    );
    assert_eq!(document.source["storage_id"], 1);
    assert_eq!(document.source["storage_name"], "nfs-1");
    assert_eq!(document.source["allowed_users"], serde_json::json!(["alice", "owner"]));
    assert_eq!(document.source["denied_groups"], serde_json::json!(["guests"]));
    assert_eq!(document.source["doc_type"], "NFS_FILE");
}

#[tokio::test]
async fn test_bulk_failure_keeps_event_files() {
    let harness = SyncHarness::new();
    harness.add_nfs_storage(1, FS);
    harness.write_file(1, "a.txt", b"a");
    let key = harness.stage_events("w1", "0001.log", &[event_line(1, "c", FS, "a.txt")]);
    harness.index.fail_bulk_writes(true);

    let report = harness.run().await;

    assert_eq!(report.chunks_failed(), 1);
    assert!(matches!(
        report.producers[0].chunks[0].outcome,
        Some(ChunkOutcome::Failed {
            stage: ChunkStage::Reconciled,
            ..
        })
    ));
    assert_eq!(harness.staged_files(), vec![key]);

    harness.index.fail_bulk_writes(false);
    assert!(harness.run().await.is_success());
    assert_eq!(harness.index.paths(1), vec!["a.txt"]);
}

#[tokio::test]
async fn test_rejected_documents_do_not_fail_the_chunk() {
    let harness = SyncHarness::new();
    harness.add_nfs_storage(1, FS);
    harness.write_file(1, "bad.txt", b"x");
    harness.write_file(1, "good.txt", b"y");
    harness.index.reject_path("bad.txt");
    harness.stage_events(
        "w1",
        "0001.log",
        &[event_line(1, "c", FS, "bad.txt"), event_line(1, "c", FS, "good.txt")],
    );

    let report = harness.run().await;

    assert!(report.is_success());
    assert_eq!(report.producers[0].chunks[0].bulk.item_failures, 1);
    assert_eq!(harness.index.paths(1), vec!["good.txt"]);
    assert!(harness.staged_files().is_empty());
}

#[tokio::test]
async fn test_listing_failure_is_reported() {
    let harness = SyncHarness::new();
    harness.add_nfs_storage(1, FS);
    harness.stage_events("w1", "0001.log", &[event_line(1, "c", FS, "a.txt")]);
    harness.credentials.deny(AccessScope::list());

    let report = harness.run().await;

    assert!(report.listing_error.is_some());
    assert!(report.producers.is_empty());
    assert_eq!(harness.staged_files().len(), 1);
}

#[tokio::test]
async fn test_cleanup_failure_keeps_files_for_retry() {
    let harness = SyncHarness::new();
    harness.add_nfs_storage(1, FS);
    harness.write_file(1, "a.txt", b"a");
    harness.stage_events("w1", "0001.log", &[event_line(1, "c", FS, "a.txt")]);
    harness.credentials.deny(AccessScope::write());

    let report = harness.run().await;

    assert!(matches!(
        report.producers[0].chunks[0].outcome,
        Some(ChunkOutcome::Failed {
            stage: ChunkStage::Flushed,
            ..
        })
    ));
    assert_eq!(harness.index.paths(1), vec!["a.txt"]);
    assert_eq!(harness.staged_files().len(), 1);

    harness.credentials.allow_all();
    assert!(harness.run().await.is_success());
    assert!(harness.staged_files().is_empty());
    assert_eq!(harness.index.documents(1).len(), 1);
}

#[tokio::test]
async fn test_credentials_are_scoped_per_action() {
    let mut harness = SyncHarness::new();
    harness.config.chunk_size = 1;
    harness.add_nfs_storage(1, FS);
    harness.stage_events("w1", "0001.log", &[event_line(1, "d", FS, "x")]);
    harness.stage_events("w1", "0002.log", &[event_line(2, "d", FS, "y")]);

    let report = harness.run().await;

    assert_eq!(report.producers[0].chunks.len(), 2);
    let scopes: Vec<AccessScope> = harness
        .credentials
        .issued()
        .into_iter()
        .map(|(storage, scope)| {
            assert_eq!(storage, "events");
            scope
        })
        .collect();
    assert_eq!(
        scopes,
        vec![
            AccessScope::list(),
            AccessScope::read(),
            AccessScope::write(),
            AccessScope::read(),
            AccessScope::write(),
        ]
    );
}

#[tokio::test]
async fn test_events_of_unknown_storages_are_dropped() {
    let harness = SyncHarness::new();
    harness.add_nfs_storage(1, FS);
    harness.write_file(1, "a.txt", b"a");
    harness.stage_events(
        "w1",
        "0001.log",
        &[
            event_line(1, "c", "filer:/unknown", "z.txt"),
            event_line(1, "c", "events", "y.txt"),
            "garbage line".to_string(),
            event_line(2, "c", FS, "a.txt"),
        ],
    );

    let report = harness.run().await;

    assert!(report.is_success());
    let chunk = &report.producers[0].chunks[0];
    assert_eq!(chunk.events_parsed, 3);
    assert_eq!(chunk.malformed_lines, 1);
    assert_eq!(chunk.net_events, 1);
    assert_eq!(harness.index.paths(1), vec!["a.txt"]);
}

#[tokio::test]
async fn test_tags_are_loaded_in_batches() {
    let mut harness = SyncHarness::new();
    harness.config.bulk_load_tags_size = 2;
    harness.config.bulk_insert_size = 2;
    harness.add_nfs_storage(1, FS);
    let lines: Vec<String> = (0..5)
        .map(|i| {
            let path = format!("f{i}.txt");
            harness.write_file(1, &path, b"x");
            event_line(1, "c", FS, &path)
        })
        .collect();
    harness.stage_events("w1", "0001.log", &lines);

    assert!(harness.run().await.is_success());

    assert_eq!(harness.tags.calls(), vec![2, 2, 1]);
    assert_eq!(harness.index.bulk_batches().len(), 3);
    assert_eq!(harness.index.documents(1).len(), 5);
}
