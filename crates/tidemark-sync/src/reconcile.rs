//! Reconciliation of net file events against the search index.
//!
//! Every affected path is looked up in the index (one multi-search) and on
//! the live mount. A live file is indexed: replaced in place when a document
//! exists, created in the storage's current index otherwise. A missing file
//! has its document deleted, if there is one.

use std::collections::HashMap;

use tidemark_core::StorageDescriptor;

use crate::bulk::BulkRequestEmitter;
use crate::error::{Result, SyncError};
use crate::event::EventRecord;
use crate::index::{BulkOperation, IndexedFileDocument, SearchHit, SearchIndexGateway, SearchRequest};
use crate::mount::{FileMetadata, MountedStorage};
use crate::permissions::PermissionLabels;
use crate::tags::MetadataTagGateway;

/// Storage-level inputs of a reconciliation.
#[derive(Debug)]
pub struct ReconcileTarget<'a> {
    /// Storage being reconciled.
    pub storage: &'a StorageDescriptor,
    /// Index receiving new documents.
    pub new_index: &'a str,
    /// Labels attached to every document.
    pub labels: &'a PermissionLabels,
    /// Live mount of the storage.
    pub mount: &'a MountedStorage,
}

/// Counts of decisions taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Documents created.
    pub created: usize,
    /// Documents replaced in place.
    pub updated: usize,
    /// Documents deleted.
    pub deleted: usize,
    /// Missing files without a document.
    pub skipped: usize,
}

/// Decides create, update or delete for each net file event.
pub struct IndexReconciler<'a> {
    index: &'a dyn SearchIndexGateway,
    tags: &'a dyn MetadataTagGateway,
    tags_batch: usize,
}

impl<'a> IndexReconciler<'a> {
    /// Creates a reconciler loading tags `tags_batch` paths at a time.
    #[must_use]
    pub fn new(
        index: &'a dyn SearchIndexGateway,
        tags: &'a dyn MetadataTagGateway,
        tags_batch: usize,
    ) -> Self {
        Self {
            index,
            tags,
            tags_batch: tags_batch.max(1),
        }
    }

    /// Reconciles `events` of one storage, emitting bulk operations.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::IndexQuery` if existing documents cannot be
    /// resolved, `SyncError::MountUnavailable` if the mount vanishes,
    /// `SyncError::Tags` if tags cannot be loaded, or a bulk error from a
    /// triggered flush.
    pub async fn reconcile(
        &self,
        target: &ReconcileTarget<'_>,
        events: &[EventRecord],
        emitter: &mut BulkRequestEmitter<'_>,
    ) -> Result<ReconcileStats> {
        let mut stats = ReconcileStats::default();
        if events.is_empty() {
            return Ok(stats);
        }
        let existing = self.find_existing(target.storage.id, events).await?;

        let mut pending: Vec<FileMetadata> = Vec::with_capacity(self.tags_batch);
        for event in events {
            match target.mount.stat(&event.path).await? {
                Some(file) => {
                    pending.push(file);
                    if pending.len() >= self.tags_batch {
                        let batch = std::mem::take(&mut pending);
                        self.emit_files(target, &existing, batch, emitter, &mut stats)
                            .await?;
                    }
                }
                None => match existing.get(&event.path) {
                    Some(hit) => {
                        emitter
                            .add(BulkOperation::Delete {
                                index: hit.index.clone(),
                                id: hit.id.clone(),
                            })
                            .await?;
                        stats.deleted += 1;
                    }
                    None => stats.skipped += 1,
                },
            }
        }
        self.emit_files(target, &existing, pending, emitter, &mut stats)
            .await?;

        tracing::debug!(
            storage = %target.storage.name,
            created = stats.created,
            updated = stats.updated,
            deleted = stats.deleted,
            skipped = stats.skipped,
            "reconciled storage events"
        );
        Ok(stats)
    }

    async fn find_existing(
        &self,
        storage_id: i64,
        events: &[EventRecord],
    ) -> Result<HashMap<String, SearchHit>> {
        let requests: Vec<SearchRequest> = events
            .iter()
            .map(|event| SearchRequest::exact(storage_id, event.path.clone()))
            .collect();
        let pages = self
            .index
            .multi_search(&requests)
            .await
            .map_err(|source| SyncError::IndexQuery { storage_id, source })?;

        Ok(events
            .iter()
            .zip(pages)
            .filter(|(_, page)| page.total_hits == 1)
            .filter_map(|(event, page)| {
                page.hits
                    .into_iter()
                    .next()
                    .map(|hit| (event.path.clone(), hit))
            })
            .collect())
    }

    async fn emit_files(
        &self,
        target: &ReconcileTarget<'_>,
        existing: &HashMap<String, SearchHit>,
        files: Vec<FileMetadata>,
        emitter: &mut BulkRequestEmitter<'_>,
        stats: &mut ReconcileStats,
    ) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }
        let storage = target.storage;
        let paths: Vec<String> = files.iter().map(|file| file.path.clone()).collect();
        let mut tags = self
            .tags
            .load_tags(storage.id, &paths)
            .await
            .map_err(|source| SyncError::Tags {
                storage_id: storage.id,
                source,
            })?;

        for file in files {
            let file_tags = tags.remove(&file.path).unwrap_or_default();
            let document = IndexedFileDocument::new(storage, &file, file_tags, target.labels)
                .to_value()
                .map_err(|source| SyncError::Document {
                    path: file.path.clone(),
                    source,
                })?;
            let operation = match existing.get(&file.path) {
                Some(hit) => {
                    stats.updated += 1;
                    BulkOperation::Index {
                        index: hit.index.clone(),
                        id: Some(hit.id.clone()),
                        document,
                    }
                }
                None => {
                    stats.created += 1;
                    BulkOperation::Index {
                        index: target.new_index.to_string(),
                        id: None,
                        document,
                    }
                }
            };
            emitter.add(operation).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use crate::index::MemorySearchIndex;
    use crate::mount::{FilesystemMountGateway, LocalMountGateway};
    use crate::tags::Tags;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use tidemark_core::StorageKind;

    #[derive(Default)]
    struct RecordingTags {
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl MetadataTagGateway for RecordingTags {
        async fn load_tags(
            &self,
            _storage_id: i64,
            paths: &[String],
        ) -> tidemark_core::Result<HashMap<String, Tags>> {
            self.calls.lock().unwrap().push(paths.len());
            Ok(paths
                .iter()
                .map(|p| (p.clone(), Tags::from([("k".to_string(), "v".to_string())])))
                .collect())
        }
    }

    fn storage() -> StorageDescriptor {
        StorageDescriptor {
            id: 1,
            name: "shared".into(),
            path: "filer:/data".into(),
            kind: StorageKind::Nfs,
            owner: None,
        }
    }

    #[tokio::test]
    async fn decides_create_update_delete() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("filer/data");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("new.txt"), b"12").unwrap();
        std::fs::write(dir.join("old.txt"), b"1234").unwrap();

        let index = MemorySearchIndex::new();
        index
            .insert_document("idx-a", "d1", json!({ "id": "old.txt", "storage_id": 1 }))
            .unwrap();
        index
            .insert_document("idx-a", "d2", json!({ "id": "gone.txt", "storage_id": 1 }))
            .unwrap();

        let gateway = LocalMountGateway::new(root.path());
        let storage = storage();
        assert!(gateway.mount_if_necessary(&storage).await.unwrap().is_some());
        let mount = MountedStorage::establish(&gateway, &storage).await.unwrap();
        let labels = PermissionLabels::default();
        let target = ReconcileTarget {
            storage: &storage,
            new_index: "idx-b",
            labels: &labels,
            mount: &mount,
        };
        let tags = RecordingTags::default();
        let reconciler = IndexReconciler::new(&index, &tags, 1);

        let events = vec![
            EventRecord::new(1, EventType::Created, "filer:/data", "new.txt"),
            EventRecord::new(1, EventType::Modified, "filer:/data", "old.txt"),
            EventRecord::new(1, EventType::Deleted, "filer:/data", "gone.txt"),
            EventRecord::new(1, EventType::Deleted, "filer:/data", "never.txt"),
        ];
        let mut emitter = BulkRequestEmitter::new(&index, 100);
        let outcome = reconciler.reconcile(&target, &events, &mut emitter).await;
        let (stats, _) = emitter.close(outcome).await.unwrap();

        assert_eq!(
            stats,
            ReconcileStats {
                created: 1,
                updated: 1,
                deleted: 1,
                skipped: 1,
            }
        );
        assert_eq!(*tags.calls.lock().unwrap(), vec![1, 1]);

        let old = index.document(1, "old.txt").unwrap();
        assert_eq!((old.index.as_str(), old.id.as_str()), ("idx-a", "d1"));
        assert_eq!(old.source["size"], 4);
        assert_eq!(old.source["tags"]["k"], "v");
        assert_eq!(index.document(1, "new.txt").unwrap().index, "idx-b");
        assert!(index.document(1, "gone.txt").is_none());
        assert_eq!(index.multi_searches(), 1);
    }

    #[tokio::test]
    async fn ambiguous_matches_are_treated_as_absent() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("filer/data")).unwrap();

        let index = MemorySearchIndex::new();
        index
            .insert_document("idx-a", "d1", json!({ "id": "dup.txt", "storage_id": 1 }))
            .unwrap();
        index
            .insert_document("idx-b", "d2", json!({ "id": "dup.txt", "storage_id": 1 }))
            .unwrap();

        let gateway = LocalMountGateway::new(root.path());
        let storage = storage();
        let mount = MountedStorage::establish(&gateway, &storage).await.unwrap();
        let labels = PermissionLabels::default();
        let target = ReconcileTarget {
            storage: &storage,
            new_index: "idx-b",
            labels: &labels,
            mount: &mount,
        };
        let tags = RecordingTags::default();
        let reconciler = IndexReconciler::new(&index, &tags, 10);

        let events = vec![EventRecord::new(1, EventType::Deleted, "filer:/data", "dup.txt")];
        let mut emitter = BulkRequestEmitter::new(&index, 100);
        let outcome = reconciler.reconcile(&target, &events, &mut emitter).await;
        let (stats, _) = emitter.close(outcome).await.unwrap();

        assert_eq!(stats.skipped, 1);
        assert_eq!(index.documents(1).len(), 2);
    }
}
