//! Live filesystem access to NFS storages.
//!
//! Mounting itself happens outside the engine. The gateway only answers
//! where a storage is reachable locally; [`MountedStorage`] then resolves
//! file metadata under that root and notices if the mount disappears.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tidemark_core::{Error, StorageDescriptor};

use crate::error::{Result, SyncError};

/// Resolves local mount points of NFS storages.
#[async_trait]
pub trait FilesystemMountGateway: Send + Sync + 'static {
    /// Mounts `storage` if needed and returns its local root.
    ///
    /// `Ok(None)` means the storage is unavailable.
    async fn mount_if_necessary(
        &self,
        storage: &StorageDescriptor,
    ) -> tidemark_core::Result<Option<PathBuf>>;
}

/// Mount gateway for storages already mounted below a common root.
///
/// `host:/export/share` is expected at `<root>/host/export/share`.
#[derive(Debug, Clone)]
pub struct LocalMountGateway {
    root: PathBuf,
}

impl LocalMountGateway {
    /// Creates a gateway resolving mounts below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Local directory expected for `storage`.
    #[must_use]
    pub fn mount_dir(&self, storage: &StorageDescriptor) -> PathBuf {
        let relative: String = storage
            .path
            .replace(":/", "/")
            .replace(':', "/")
            .trim_start_matches('/')
            .to_string();
        self.root.join(relative)
    }
}

#[async_trait]
impl FilesystemMountGateway for LocalMountGateway {
    async fn mount_if_necessary(
        &self,
        storage: &StorageDescriptor,
    ) -> tidemark_core::Result<Option<PathBuf>> {
        let dir = self.mount_dir(storage);
        match tokio::fs::metadata(&dir).await {
            Ok(metadata) if metadata.is_dir() => Ok(Some(dir)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage_with_source(
                format!("cannot inspect mount {}", dir.display()),
                e,
            )),
        }
    }
}

/// Metadata of one live file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Path relative to the storage root.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: Option<DateTime<Utc>>,
}

/// An established mount of one storage.
#[derive(Debug, Clone)]
pub struct MountedStorage {
    storage: String,
    root: PathBuf,
}

impl MountedStorage {
    /// Establishes the mount of `storage` through `gateway`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::MountUnavailable` if the gateway fails or reports
    /// the storage as unavailable.
    pub async fn establish(
        gateway: &dyn FilesystemMountGateway,
        storage: &StorageDescriptor,
    ) -> Result<Self> {
        match gateway.mount_if_necessary(storage).await {
            Ok(Some(root)) => Ok(Self {
                storage: storage.name.clone(),
                root,
            }),
            Ok(None) => Err(SyncError::MountUnavailable {
                storage: storage.name.clone(),
                mount: None,
            }),
            Err(error) => {
                tracing::warn!(storage = %storage.name, %error, "mount gateway failed");
                Err(SyncError::MountUnavailable {
                    storage: storage.name.clone(),
                    mount: None,
                })
            }
        }
    }

    /// Local root of the storage.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fails if the mount root has disappeared.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::MountUnavailable` when the root is gone.
    pub async fn ensure_available(&self) -> Result<()> {
        match tokio::fs::metadata(&self.root).await {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            _ => Err(SyncError::MountUnavailable {
                storage: self.storage.clone(),
                mount: Some(self.root.clone()),
            }),
        }
    }

    /// Looks up a regular file by its storage-relative path.
    ///
    /// Returns `None` when the file does not exist or is a directory.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::MountUnavailable` if the mount vanished and
    /// `SyncError::FileMetadata` for other I/O failures.
    pub async fn stat(&self, relative: &str) -> Result<Option<FileMetadata>> {
        self.ensure_available().await?;
        let absolute = self.root.join(relative.trim_start_matches('/'));
        match tokio::fs::metadata(&absolute).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(FileMetadata {
                path: relative.to_string(),
                size: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            })),
            Ok(_) => Ok(None),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => Ok(None),
            Err(source) => Err(SyncError::FileMetadata {
                path: absolute,
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidemark_core::StorageKind;

    fn storage(path: &str) -> StorageDescriptor {
        StorageDescriptor {
            id: 1,
            name: "shared".into(),
            path: path.into(),
            kind: StorageKind::Nfs,
            owner: None,
        }
    }

    #[test]
    fn mount_dir_flattens_export_path() {
        let gateway = LocalMountGateway::new("/mnt/nfs");
        assert_eq!(
            gateway.mount_dir(&storage("filer:/exports/data")),
            PathBuf::from("/mnt/nfs/filer/exports/data")
        );
    }

    #[tokio::test]
    async fn resolves_existing_mount() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("filer/data")).unwrap();
        let gateway = LocalMountGateway::new(root.path());

        let mounted = gateway.mount_if_necessary(&storage("filer:/data")).await.unwrap();
        assert_eq!(mounted, Some(root.path().join("filer/data")));
        assert_eq!(
            gateway.mount_if_necessary(&storage("filer:/missing")).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn stat_reports_files_only() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("filer/data/dir")).unwrap();
        std::fs::write(root.path().join("filer/data/dir/a.txt"), b"hello").unwrap();
        let gateway = LocalMountGateway::new(root.path());

        let mounted = MountedStorage::establish(&gateway, &storage("filer:/data"))
            .await
            .unwrap();
        let file = mounted.stat("dir/a.txt").await.unwrap().unwrap();
        assert_eq!(file.size, 5);
        assert_eq!(file.path, "dir/a.txt");
        assert!(file.modified.is_some());

        assert_eq!(mounted.stat("dir").await.unwrap(), None);
        assert_eq!(mounted.stat("dir/missing.txt").await.unwrap(), None);
        assert_eq!(mounted.stat("dir/a.txt/nested").await.unwrap(), None);
    }

    #[tokio::test]
    async fn vanished_mount_is_detected() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("filer/data")).unwrap();
        let gateway = LocalMountGateway::new(root.path());
        let mounted = MountedStorage::establish(&gateway, &storage("filer:/data"))
            .await
            .unwrap();

        std::fs::remove_dir_all(root.path().join("filer")).unwrap();
        let err = mounted.stat("a.txt").await.unwrap_err();
        assert!(matches!(err, SyncError::MountUnavailable { mount: Some(_), .. }));
    }

    #[tokio::test]
    async fn unavailable_storage_fails_establish() {
        let root = tempfile::tempdir().unwrap();
        let gateway = LocalMountGateway::new(root.path());
        let err = MountedStorage::establish(&gateway, &storage("filer:/data"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::MountUnavailable { mount: None, .. }));
    }
}
