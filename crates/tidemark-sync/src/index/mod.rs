//! Search index gateway contract.
//!
//! The engine talks to the search index only through [`SearchIndexGateway`].
//! Documents are addressed by the `id` field (the file path) together with
//! `storage_id`; the index-assigned document id is only used to update or
//! delete a hit that was found first.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tidemark_core::Result;

pub mod document;
pub mod memory;
pub mod scroll;

pub use document::{DOC_TYPE_NFS_FILE, FILE_ID_FIELD, IndexedFileDocument, STORAGE_ID_FIELD};
pub use memory::MemorySearchIndex;
pub use scroll::scroll_pages;

/// Index pattern matching every index.
pub const ALL_INDICES: &str = "*";

/// Path condition of a document query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathMatch {
    /// Documents whose path equals the value.
    Exact(String),
    /// Documents whose path starts with the value.
    Prefix(String),
    /// Every document of the storage.
    All,
}

impl PathMatch {
    /// True if `path` satisfies the condition.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(expected) => path == expected,
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Self::All => true,
        }
    }
}

/// Query over file documents of one storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentQuery {
    /// Storage whose documents are searched.
    pub storage_id: i64,
    /// Path condition.
    pub path: PathMatch,
}

/// A search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Index name, alias or pattern; missing indices are ignored.
    pub index_pattern: String,
    /// Query.
    pub query: DocumentQuery,
    /// Maximum hits per page.
    pub size: usize,
    /// Scroll keep-alive; `Some` opens a scroll context.
    pub scroll: Option<Duration>,
}

impl SearchRequest {
    /// Looks up the single document of `path` in `storage_id`.
    #[must_use]
    pub fn exact(storage_id: i64, path: impl Into<String>) -> Self {
        Self {
            index_pattern: ALL_INDICES.to_string(),
            query: DocumentQuery {
                storage_id,
                path: PathMatch::Exact(path.into()),
            },
            size: 1,
            scroll: None,
        }
    }

    /// Opens a scroll over all documents of `storage_id` matching `path`.
    #[must_use]
    pub fn scroll(storage_id: i64, path: PathMatch, page_size: usize, keep_alive: Duration) -> Self {
        Self {
            index_pattern: ALL_INDICES.to_string(),
            query: DocumentQuery { storage_id, path },
            size: page_size,
            scroll: Some(keep_alive),
        }
    }
}

/// One document returned by a search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Concrete index holding the document.
    pub index: String,
    /// Index-assigned document id.
    pub id: String,
    /// Document source.
    pub source: Value,
}

impl SearchHit {
    /// File path stored in the document, if present.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.source.get(FILE_ID_FIELD).and_then(Value::as_str)
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    /// Hits on this page.
    pub hits: Vec<SearchHit>,
    /// Total number of matching documents.
    pub total_hits: u64,
    /// Scroll id for the next page, if a scroll is open.
    pub scroll_id: Option<String>,
}

/// A single bulk write operation.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOperation {
    /// Create (`id` is `None`) or replace a document.
    Index {
        /// Target index.
        index: String,
        /// Existing document id when updating.
        id: Option<String>,
        /// Document source.
        document: Value,
    },
    /// Delete a document.
    Delete {
        /// Index holding the document.
        index: String,
        /// Document id.
        id: String,
    },
}

impl BulkOperation {
    /// True for index operations.
    #[must_use]
    pub fn is_index(&self) -> bool {
        matches!(self, Self::Index { .. })
    }
}

/// Item-level failure reported by a bulk write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemFailure {
    /// Position of the operation in the batch.
    pub position: usize,
    /// Index of the failed operation.
    pub index: String,
    /// Document id, if known.
    pub id: Option<String>,
    /// Failure reason reported by the index.
    pub reason: String,
}

/// Result of a bulk write that reached the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResponse {
    /// Operations rejected individually.
    pub failures: Vec<BulkItemFailure>,
}

/// Search index gateway.
///
/// A transport-level failure is an `Err`; item-level bulk failures are
/// reported inside [`BulkResponse`].
#[async_trait]
pub trait SearchIndexGateway: Send + Sync + 'static {
    /// Runs a search, opening a scroll context if `request.scroll` is set.
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage>;

    /// Fetches the next page of an open scroll.
    async fn scroll_next(&self, scroll_id: &str, keep_alive: Duration) -> Result<SearchPage>;

    /// Releases an open scroll context; an unknown id is not an error.
    async fn clear_scroll(&self, scroll_id: &str) -> Result<()>;

    /// Runs several searches in one round trip; pages are returned in request order.
    async fn multi_search(&self, requests: &[SearchRequest]) -> Result<Vec<SearchPage>>;

    /// Applies a batch of index and delete operations.
    async fn bulk_write(&self, operations: Vec<BulkOperation>) -> Result<BulkResponse>;

    /// Resolves the concrete index behind `alias`.
    async fn index_by_alias(&self, alias: &str) -> Result<Option<String>>;

    /// Returns true if `index` exists.
    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// Creates `index` with the given settings and mappings.
    async fn create_index(&self, index: &str, settings: &Value) -> Result<()>;

    /// Points `alias` at `index`.
    async fn create_alias(&self, index: &str, alias: &str) -> Result<()>;

    /// Deletes `index`.
    async fn delete_index(&self, index: &str) -> Result<()>;
}
