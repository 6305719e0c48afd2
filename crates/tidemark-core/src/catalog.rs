//! Storage catalog: the registry of data storages known to the platform.
//!
//! Raw events reference storages by their `path`. The catalog resolves those
//! references to descriptors and supplies the ACL entries used to label
//! indexed documents.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Kind of data storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageKind {
    /// Network filesystem share, reachable through a local mount.
    Nfs,
    /// Object storage bucket (S3, GCS, Azure blob).
    ObjectStore,
}

/// A data storage registered in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDescriptor {
    /// Numeric storage id.
    pub id: i64,
    /// Human readable name.
    pub name: String,
    /// Storage path: bucket name or `host:/export` for NFS shares.
    pub path: String,
    /// Storage kind.
    pub kind: StorageKind,
    /// Owner principal; always granted read access.
    #[serde(default)]
    pub owner: Option<String>,
}

impl StorageDescriptor {
    /// Returns true for NFS storages, the only kind that receives change events.
    #[must_use]
    pub fn is_nfs(&self) -> bool {
        self.kind == StorageKind::Nfs
    }
}

/// One ACL entry attached to a storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    /// User or group name.
    pub name: String,
    /// True for users, false for groups/roles.
    pub principal: bool,
    /// Permission bit mask.
    pub mask: u32,
}

impl AclEntry {
    /// Read granted.
    pub const READ: u32 = 1;
    /// Read explicitly denied.
    pub const NO_READ: u32 = 1 << 1;

    /// Returns true if the entry grants read access.
    #[must_use]
    pub fn allows_read(&self) -> bool {
        self.mask & Self::READ != 0
    }

    /// Returns true if the entry denies read access.
    #[must_use]
    pub fn denies_read(&self) -> bool {
        self.mask & Self::NO_READ != 0
    }
}

/// Registry of storages and their permissions.
#[async_trait]
pub trait StorageCatalog: Send + Sync + 'static {
    /// Loads every storage registered in the platform.
    async fn load_storages(&self) -> Result<Vec<StorageDescriptor>>;

    /// Loads the ACL entries of a storage. Empty when none are defined.
    async fn load_permissions(&self, storage: &StorageDescriptor) -> Result<Vec<AclEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acl_mask_bits() {
        let granted = AclEntry {
            name: "alice".into(),
            principal: true,
            mask: AclEntry::READ,
        };
        let denied = AclEntry {
            name: "contractors".into(),
            principal: false,
            mask: AclEntry::NO_READ,
        };

        assert!(granted.allows_read());
        assert!(!granted.denies_read());
        assert!(denied.denies_read());
        assert!(!denied.allows_read());
    }

    #[test]
    fn storage_kind_uses_platform_names() {
        let json = serde_json::to_string(&StorageKind::ObjectStore).expect("serialize");
        assert_eq!(json, "\"OBJECT_STORE\"");

        let kind: StorageKind = serde_json::from_str("\"NFS\"").expect("deserialize");
        assert_eq!(kind, StorageKind::Nfs);
    }
}
