//! Metadata tag lookup.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tidemark_core::Result;

/// Tags of one file.
pub type Tags = BTreeMap<String, String>;

/// Loads user-defined tags for files of a storage.
#[async_trait]
pub trait MetadataTagGateway: Send + Sync + 'static {
    /// Returns tags keyed by path; paths without tags may be absent.
    async fn load_tags(&self, storage_id: i64, paths: &[String]) -> Result<HashMap<String, Tags>>;
}
