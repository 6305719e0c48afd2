//! Pre-built harness for synchronizer scenarios.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tidemark_core::{MemoryObjectStore, StorageDescriptor, StorageKind};
use tidemark_sync::{MemorySearchIndex, SyncConfig, SyncGateways, SyncReport, Synchronizer};

use crate::gateways::{MemoryTagStore, MountTable, StaticCatalog, StaticCredentials};

/// Bucket holding raw event files.
pub const EVENTS_BUCKET: &str = "events";
/// Staging folder inside [`EVENTS_BUCKET`].
pub const EVENTS_FOLDER: &str = "nfs-events";
/// Catalog id of the staging bucket.
pub const EVENTS_STORAGE_ID: i64 = 100;

/// Formats one raw event line.
#[must_use]
pub fn event_line(timestamp: i64, code: &str, storage: &str, path: &str) -> String {
    format!("{timestamp},{code},{storage},{path}")
}

/// Formats one raw event line with a destination path.
#[must_use]
pub fn move_line(timestamp: i64, code: &str, storage: &str, path: &str, to_path: &str) -> String {
    format!("{timestamp},{code},{storage},{path},{to_path}")
}

/// Complete in-memory environment for a synchronizer.
pub struct SyncHarness {
    /// Staging object store.
    pub objects: MemoryObjectStore,
    /// Search index.
    pub index: MemorySearchIndex,
    /// Storage catalog.
    pub catalog: StaticCatalog,
    /// Credential issuer.
    pub credentials: StaticCredentials,
    /// Tag store.
    pub tags: MemoryTagStore,
    /// Mount gateway.
    pub mounts: MountTable,
    /// Synchronizer configuration.
    pub config: SyncConfig,
    mount_root: TempDir,
}

impl SyncHarness {
    /// Creates a harness with the staging bucket registered.
    #[must_use]
    pub fn new() -> Self {
        let mount_root = tempfile::tempdir().expect("tempdir");
        let catalog = StaticCatalog::new();
        catalog.add_storage(StorageDescriptor {
            id: EVENTS_STORAGE_ID,
            name: "events".into(),
            path: EVENTS_BUCKET.into(),
            kind: StorageKind::ObjectStore,
            owner: None,
        });
        Self {
            objects: MemoryObjectStore::new(),
            index: MemorySearchIndex::new(),
            catalog,
            credentials: StaticCredentials::new(),
            tags: MemoryTagStore::new(),
            mounts: MountTable::new(mount_root.path()),
            config: SyncConfig::new(format!("s3://{EVENTS_BUCKET}/{EVENTS_FOLDER}")),
            mount_root,
        }
    }

    /// Root directory of all test mounts.
    #[must_use]
    pub fn mount_root(&self) -> &Path {
        self.mount_root.path()
    }

    /// Registers an NFS storage at `path` and creates its mount directory.
    pub fn add_nfs_storage(&self, id: i64, path: &str) -> StorageDescriptor {
        let storage = StorageDescriptor {
            id,
            name: format!("nfs-{id}"),
            path: path.into(),
            kind: StorageKind::Nfs,
            owner: Some("owner".into()),
        };
        self.catalog.add_storage(storage.clone());
        std::fs::create_dir_all(self.mounts.mount_dir(id)).expect("create mount dir");
        storage
    }

    /// Writes a live file into a storage mount.
    pub fn write_file(&self, storage_id: i64, path: &str, content: &[u8]) -> PathBuf {
        let absolute = self.mounts.mount_dir(storage_id).join(path);
        if let Some(parent) = absolute.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::write(&absolute, content).expect("write file");
        absolute
    }

    /// Removes a live file from a storage mount.
    pub fn remove_file(&self, storage_id: i64, path: &str) {
        std::fs::remove_file(self.mounts.mount_dir(storage_id).join(path)).expect("remove file");
    }

    /// Moves a live file or directory within a storage mount.
    pub fn rename(&self, storage_id: i64, from: &str, to: &str) {
        let dir = self.mounts.mount_dir(storage_id);
        let target = dir.join(to);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::rename(dir.join(from), target).expect("rename");
    }

    /// Stages a raw event file for `producer` and returns its key.
    pub fn stage_events<S: AsRef<str>>(&self, producer: &str, file: &str, lines: &[S]) -> String {
        let key = format!("{EVENTS_FOLDER}/{producer}/{file}");
        let content = lines
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join("\n");
        self.objects
            .put(EVENTS_BUCKET, &key, content)
            .expect("stage events");
        key
    }

    /// Keys of raw event files still staged.
    #[must_use]
    pub fn staged_files(&self) -> Vec<String> {
        self.objects.paths(EVENTS_BUCKET)
    }

    /// Gateways wired to this harness.
    #[must_use]
    pub fn gateways(&self) -> SyncGateways {
        SyncGateways {
            object_storage: Arc::new(self.objects.clone()),
            search_index: Arc::new(self.index.clone()),
            mounts: Arc::new(self.mounts.clone()),
            credentials: Arc::new(self.credentials.clone()),
            tags: Arc::new(self.tags.clone()),
            catalog: Arc::new(self.catalog.clone()),
        }
    }

    /// Builds a synchronizer over this harness.
    #[must_use]
    pub fn synchronizer(&self) -> Synchronizer {
        Synchronizer::new(self.config.clone(), self.gateways()).expect("valid config")
    }

    /// Runs one synchronization pass.
    pub async fn run(&self) -> SyncReport {
        self.synchronizer().run().await
    }
}

impl Default for SyncHarness {
    fn default() -> Self {
        Self::new()
    }
}
