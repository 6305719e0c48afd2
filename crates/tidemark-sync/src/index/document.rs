//! Indexed file document.

use serde::{Deserialize, Serialize};
use tidemark_core::StorageDescriptor;

use crate::mount::FileMetadata;
use crate::permissions::PermissionLabels;
use crate::tags::Tags;

/// Document field holding the file path.
pub const FILE_ID_FIELD: &str = "id";
/// Document field holding the storage id.
pub const STORAGE_ID_FIELD: &str = "storage_id";
/// Document type of NFS files.
pub const DOC_TYPE_NFS_FILE: &str = "NFS_FILE";

const LAST_MODIFIED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Source of one file document in the search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFileDocument {
    /// File path, the document key within a storage.
    pub id: String,
    /// Last path segment.
    pub name: String,
    /// Owning storage id.
    #[serde(rename = "parentId")]
    pub parent_id: i64,
    /// Owning storage id.
    pub storage_id: i64,
    /// Owning storage name.
    pub storage_name: String,
    /// Size in bytes.
    pub size: u64,
    /// Modification time, `yyyy-MM-dd HH:mm:ss` UTC.
    #[serde(rename = "lastModified", default)]
    pub last_modified: Option<String>,
    /// User-defined tags.
    #[serde(default)]
    pub tags: Tags,
    /// Users granted read access.
    #[serde(default)]
    pub allowed_users: Vec<String>,
    /// Users denied read access.
    #[serde(default)]
    pub denied_users: Vec<String>,
    /// Groups granted read access.
    #[serde(default)]
    pub allowed_groups: Vec<String>,
    /// Groups denied read access.
    #[serde(default)]
    pub denied_groups: Vec<String>,
    /// Document type marker.
    pub doc_type: String,
}

impl IndexedFileDocument {
    /// Builds the document of a live file.
    #[must_use]
    pub fn new(
        storage: &StorageDescriptor,
        file: &FileMetadata,
        tags: Tags,
        labels: &PermissionLabels,
    ) -> Self {
        let name = file
            .path
            .rsplit('/')
            .next()
            .unwrap_or(file.path.as_str())
            .to_string();
        Self {
            id: file.path.clone(),
            name,
            parent_id: storage.id,
            storage_id: storage.id,
            storage_name: storage.name.clone(),
            size: file.size,
            last_modified: file
                .modified
                .map(|time| time.format(LAST_MODIFIED_FORMAT).to_string()),
            tags,
            allowed_users: labels.allowed_users.iter().cloned().collect(),
            denied_users: labels.denied_users.iter().cloned().collect(),
            allowed_groups: labels.allowed_groups.iter().cloned().collect(),
            denied_groups: labels.denied_groups.iter().cloned().collect(),
            doc_type: DOC_TYPE_NFS_FILE.to_string(),
        }
    }

    /// Serializes the document source.
    ///
    /// # Errors
    ///
    /// Returns `tidemark_core::Error::Serialization` if encoding fails.
    pub fn to_value(&self) -> tidemark_core::Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| tidemark_core::Error::Serialization {
            message: e.to_string(),
        })
    }
}
