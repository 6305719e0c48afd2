//! In-memory gateway implementations with failure injection.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tidemark_core::error::{Error, Result};
use tidemark_core::{
    AccessScope, AclEntry, CredentialGateway, StorageCatalog, StorageDescriptor,
    TemporaryCredentials,
};
use tidemark_sync::mount::FilesystemMountGateway;
use tidemark_sync::tags::{MetadataTagGateway, Tags};

/// Storage catalog backed by a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    storages: Arc<Mutex<Vec<StorageDescriptor>>>,
    permissions: Arc<Mutex<HashMap<i64, Vec<AclEntry>>>>,
    fail_loading: Arc<Mutex<bool>>,
}

impl StaticCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a storage.
    pub fn add_storage(&self, storage: StorageDescriptor) {
        self.storages.lock().expect("lock").push(storage);
    }

    /// Sets the ACL entries of a storage.
    pub fn set_permissions(&self, storage_id: i64, entries: Vec<AclEntry>) {
        self.permissions
            .lock()
            .expect("lock")
            .insert(storage_id, entries);
    }

    /// Makes `load_storages` fail.
    pub fn fail_loading(&self, fail: bool) {
        *self.fail_loading.lock().expect("lock") = fail;
    }
}

#[async_trait]
impl StorageCatalog for StaticCatalog {
    async fn load_storages(&self) -> Result<Vec<StorageDescriptor>> {
        if *self.fail_loading.lock().expect("lock") {
            return Err(Error::api("catalog unavailable"));
        }
        Ok(self.storages.lock().expect("lock").clone())
    }

    async fn load_permissions(&self, storage: &StorageDescriptor) -> Result<Vec<AclEntry>> {
        Ok(self
            .permissions
            .lock()
            .expect("lock")
            .get(&storage.id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Credential issuer recording every request.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    issued: Arc<Mutex<Vec<(String, AccessScope)>>>,
    denied: Arc<Mutex<Vec<AccessScope>>>,
}

impl StaticCredentials {
    /// Creates an issuer granting everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses credentials for `scope`.
    pub fn deny(&self, scope: AccessScope) {
        self.denied.lock().expect("lock").push(scope);
    }

    /// Grants every scope again.
    pub fn allow_all(&self) {
        self.denied.lock().expect("lock").clear();
    }

    /// Requests served so far as `(storage path, scope)`.
    #[must_use]
    pub fn issued(&self) -> Vec<(String, AccessScope)> {
        self.issued.lock().expect("lock").clone()
    }
}

#[async_trait]
impl CredentialGateway for StaticCredentials {
    async fn issue(
        &self,
        storage: &StorageDescriptor,
        scope: AccessScope,
    ) -> Result<TemporaryCredentials> {
        if self.denied.lock().expect("lock").contains(&scope) {
            return Err(Error::api(format!("access denied for {}", storage.path)));
        }
        self.issued
            .lock()
            .expect("lock")
            .push((storage.path.clone(), scope));
        Ok(TemporaryCredentials {
            key_id: format!("test-key-{}", storage.id),
            access_key: "test-secret".into(),
            ..TemporaryCredentials::default()
        })
    }
}

/// Tag store keyed by `(storage id, path)`.
#[derive(Debug, Clone, Default)]
pub struct MemoryTagStore {
    tags: Arc<Mutex<HashMap<(i64, String), Tags>>>,
    calls: Arc<Mutex<Vec<usize>>>,
}

impl MemoryTagStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets one tag of a file.
    pub fn set_tag(&self, storage_id: i64, path: &str, key: &str, value: &str) {
        self.tags
            .lock()
            .expect("lock")
            .entry((storage_id, path.to_string()))
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Batch sizes of the lookups served so far.
    #[must_use]
    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl MetadataTagGateway for MemoryTagStore {
    async fn load_tags(&self, storage_id: i64, paths: &[String]) -> Result<HashMap<String, Tags>> {
        self.calls.lock().expect("lock").push(paths.len());
        let tags = self.tags.lock().expect("lock");
        Ok(paths
            .iter()
            .filter_map(|path| {
                tags.get(&(storage_id, path.clone()))
                    .map(|found| (path.clone(), found.clone()))
            })
            .collect::<HashMap<_, _>>())
    }
}

/// Mount gateway serving one directory per storage below a test root.
#[derive(Debug, Clone)]
pub struct MountTable {
    root: PathBuf,
    unavailable: Arc<Mutex<HashSet<i64>>>,
    failing: Arc<Mutex<HashSet<i64>>>,
    stalled: Arc<Mutex<HashSet<i64>>>,
}

impl MountTable {
    /// Creates a table rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            unavailable: Arc::default(),
            failing: Arc::default(),
            stalled: Arc::default(),
        }
    }

    /// Directory serving as the mount of `storage_id`.
    #[must_use]
    pub fn mount_dir(&self, storage_id: i64) -> PathBuf {
        self.root.join(format!("storage-{storage_id}"))
    }

    /// Reports the storage as unavailable.
    pub fn set_unavailable(&self, storage_id: i64, unavailable: bool) {
        let mut set = self.unavailable.lock().expect("lock");
        if unavailable {
            set.insert(storage_id);
        } else {
            set.remove(&storage_id);
        }
    }

    /// Makes mounting the storage fail with an error.
    pub fn set_failing(&self, storage_id: i64, failing: bool) {
        let mut set = self.failing.lock().expect("lock");
        if failing {
            set.insert(storage_id);
        } else {
            set.remove(&storage_id);
        }
    }

    /// Makes mounting the storage hang until the caller gives up.
    pub fn set_stalled(&self, storage_id: i64, stalled: bool) {
        let mut set = self.stalled.lock().expect("lock");
        if stalled {
            set.insert(storage_id);
        } else {
            set.remove(&storage_id);
        }
    }
}

#[async_trait]
impl FilesystemMountGateway for MountTable {
    async fn mount_if_necessary(&self, storage: &StorageDescriptor) -> Result<Option<PathBuf>> {
        let stalled = self.stalled.lock().expect("lock").contains(&storage.id);
        if stalled {
            std::future::pending::<()>().await;
        }
        if self.failing.lock().expect("lock").contains(&storage.id) {
            return Err(Error::storage(format!("mount of {} failed", storage.path)));
        }
        if self.unavailable.lock().expect("lock").contains(&storage.id) {
            return Ok(None);
        }
        let dir = self.mount_dir(storage.id);
        Ok(dir.is_dir().then_some(dir))
    }
}

/// Tags as a sorted map, for assertions.
#[must_use]
pub fn tags<const N: usize>(pairs: [(&str, &str); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
