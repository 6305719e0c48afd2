//! In-memory search index for testing.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tidemark_core::{Error, Result};

use super::{
    ALL_INDICES, BulkItemFailure, BulkOperation, BulkResponse, DocumentQuery, FILE_ID_FIELD,
    STORAGE_ID_FIELD, SearchHit, SearchIndexGateway, SearchPage, SearchRequest,
};

/// In-memory search index.
///
/// Thread-safe via `RwLock`; clones share state. Scrolls are snapshots taken
/// when the scroll opens. Failure switches let tests simulate transport
/// errors and rejected documents.
#[derive(Debug, Default, Clone)]
pub struct MemorySearchIndex {
    state: Arc<RwLock<IndexState>>,
}

#[derive(Debug, Default)]
struct IndexState {
    indices: BTreeMap<String, BTreeMap<String, Value>>,
    aliases: BTreeMap<String, String>,
    scrolls: HashMap<String, ScrollContext>,
    bulk_batches: Vec<Vec<BulkOperation>>,
    next_document: u64,
    next_scroll: u64,
    scroll_requests: usize,
    multi_searches: usize,
    failures: Failures,
}

#[derive(Debug)]
struct ScrollContext {
    page_size: usize,
    remaining: VecDeque<SearchHit>,
    total_hits: u64,
}

#[derive(Debug, Default)]
struct Failures {
    searches: bool,
    scroll_pages: bool,
    bulk_writes: bool,
    alias_creation: bool,
    rejected_paths: BTreeSet<String>,
}

fn poisoned() -> Error {
    Error::Internal {
        message: "lock poisoned".into(),
    }
}

impl MemorySearchIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, IndexState>> {
        self.state.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, IndexState>> {
        self.state.write().map_err(|_| poisoned())
    }

    /// Stores a document directly, creating the index if needed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the lock is poisoned.
    pub fn insert_document(&self, index: &str, id: &str, document: Value) -> Result<()> {
        self.write()?
            .indices
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    /// Creates an index and points `alias` at it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the lock is poisoned.
    pub fn put_alias(&self, alias: &str, index: &str) -> Result<()> {
        let mut state = self.write()?;
        state.indices.entry(index.to_string()).or_default();
        state.aliases.insert(alias.to_string(), index.to_string());
        Ok(())
    }

    /// Makes every search and scroll call fail.
    pub fn fail_searches(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.failures.searches = fail;
        }
    }

    /// Makes `scroll_next` fail while opening a scroll still succeeds.
    pub fn fail_scroll_pages(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.failures.scroll_pages = fail;
        }
    }

    /// Makes every bulk write fail at the transport level.
    pub fn fail_bulk_writes(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.failures.bulk_writes = fail;
        }
    }

    /// Makes alias creation fail.
    pub fn fail_alias_creation(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.failures.alias_creation = fail;
        }
    }

    /// Rejects index operations for documents with this path as item failures.
    pub fn reject_path(&self, path: &str) {
        if let Ok(mut state) = self.state.write() {
            state.failures.rejected_paths.insert(path.to_string());
        }
    }

    /// Every document of a storage, ordered by path.
    #[must_use]
    pub fn documents(&self, storage_id: i64) -> Vec<SearchHit> {
        let Ok(state) = self.state.read() else {
            return Vec::new();
        };
        let mut hits = state.matching(
            ALL_INDICES,
            &DocumentQuery {
                storage_id,
                path: super::PathMatch::All,
            },
        );
        hits.sort_by(|a, b| a.path().cmp(&b.path()));
        hits
    }

    /// The document of `path` in a storage, if exactly one exists.
    #[must_use]
    pub fn document(&self, storage_id: i64, path: &str) -> Option<SearchHit> {
        let mut hits: Vec<_> = self
            .documents(storage_id)
            .into_iter()
            .filter(|hit| hit.path() == Some(path))
            .collect();
        if hits.len() == 1 { hits.pop() } else { None }
    }

    /// Indexed paths of a storage, sorted.
    #[must_use]
    pub fn paths(&self, storage_id: i64) -> Vec<String> {
        self.documents(storage_id)
            .iter()
            .filter_map(|hit| hit.path().map(str::to_string))
            .collect()
    }

    /// Index currently behind `alias`.
    #[must_use]
    pub fn alias_target(&self, alias: &str) -> Option<String> {
        self.state
            .read()
            .ok()
            .and_then(|state| state.aliases.get(alias).cloned())
    }

    /// Names of all existing indices.
    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        self.state
            .read()
            .map(|state| state.indices.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every bulk batch received, in order.
    #[must_use]
    pub fn bulk_batches(&self) -> Vec<Vec<BulkOperation>> {
        self.state
            .read()
            .map(|state| state.bulk_batches.clone())
            .unwrap_or_default()
    }

    /// Number of `scroll_next` calls served.
    #[must_use]
    pub fn scroll_requests(&self) -> usize {
        self.state.read().map(|state| state.scroll_requests).unwrap_or(0)
    }

    /// Number of scroll contexts not yet cleared.
    #[must_use]
    pub fn open_scrolls(&self) -> usize {
        self.state.read().map(|state| state.scrolls.len()).unwrap_or(0)
    }

    /// Number of `multi_search` calls served.
    #[must_use]
    pub fn multi_searches(&self) -> usize {
        self.state.read().map(|state| state.multi_searches).unwrap_or(0)
    }
}

impl IndexState {
    fn resolve(&self, name: &str) -> String {
        self.aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    fn matching(&self, pattern: &str, query: &DocumentQuery) -> Vec<SearchHit> {
        let target = (pattern != ALL_INDICES).then(|| self.resolve(pattern));
        self.indices
            .iter()
            .filter(|(name, _)| target.as_ref().is_none_or(|t| t == *name))
            .flat_map(|(name, documents)| {
                documents.iter().filter_map(move |(id, source)| {
                    let storage = source.get(STORAGE_ID_FIELD).and_then(Value::as_i64);
                    let path = source.get(FILE_ID_FIELD).and_then(Value::as_str);
                    match (storage, path) {
                        (Some(storage), Some(path))
                            if storage == query.storage_id && query.path.matches(path) =>
                        {
                            Some(SearchHit {
                                index: name.clone(),
                                id: id.clone(),
                                source: source.clone(),
                            })
                        }
                        _ => None,
                    }
                })
            })
            .collect()
    }

    fn search(&mut self, request: &SearchRequest) -> SearchPage {
        let mut hits: VecDeque<SearchHit> = self.matching(&request.index_pattern, &request.query).into();
        let total_hits = hits.len() as u64;
        let take = request.size.min(hits.len());
        let first: Vec<SearchHit> = hits.drain(..take).collect();

        let scroll_id = request.scroll.map(|_| {
            self.next_scroll += 1;
            let scroll_id = format!("scroll-{}", self.next_scroll);
            self.scrolls.insert(
                scroll_id.clone(),
                ScrollContext {
                    page_size: request.size.max(1),
                    remaining: hits,
                    total_hits,
                },
            );
            scroll_id
        });

        SearchPage {
            hits: first,
            total_hits,
            scroll_id,
        }
    }

    fn apply(&mut self, position: usize, operation: &BulkOperation) -> Option<BulkItemFailure> {
        match operation {
            BulkOperation::Index {
                index,
                id,
                document,
            } => {
                let path = document.get(FILE_ID_FIELD).and_then(Value::as_str);
                if path.is_some_and(|p| self.failures.rejected_paths.contains(p)) {
                    return Some(BulkItemFailure {
                        position,
                        index: index.clone(),
                        id: id.clone(),
                        reason: "mapper_parsing_exception".to_string(),
                    });
                }
                let id = id.clone().unwrap_or_else(|| {
                    self.next_document += 1;
                    format!("doc-{}", self.next_document)
                });
                let target = self.resolve(index);
                self.indices
                    .entry(target)
                    .or_default()
                    .insert(id, document.clone());
                None
            }
            BulkOperation::Delete { index, id } => {
                let target = self.resolve(index);
                if let Some(documents) = self.indices.get_mut(&target) {
                    documents.remove(id);
                }
                None
            }
        }
    }
}

#[async_trait]
impl SearchIndexGateway for MemorySearchIndex {
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage> {
        let mut state = self.write()?;
        if state.failures.searches {
            return Err(Error::search_index("search rejected"));
        }
        Ok(state.search(request))
    }

    async fn scroll_next(&self, scroll_id: &str, _keep_alive: Duration) -> Result<SearchPage> {
        let mut state = self.write()?;
        if state.failures.searches || state.failures.scroll_pages {
            return Err(Error::search_index("scroll rejected"));
        }
        state.scroll_requests += 1;
        let context = state
            .scrolls
            .get_mut(scroll_id)
            .ok_or_else(|| Error::resource_not_found("scroll", scroll_id))?;
        let take = context.page_size.min(context.remaining.len());
        let hits: Vec<SearchHit> = context.remaining.drain(..take).collect();
        let total_hits = context.total_hits;
        Ok(SearchPage {
            hits,
            total_hits,
            scroll_id: Some(scroll_id.to_string()),
        })
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        self.write()?.scrolls.remove(scroll_id);
        Ok(())
    }

    async fn multi_search(&self, requests: &[SearchRequest]) -> Result<Vec<SearchPage>> {
        let mut state = self.write()?;
        if state.failures.searches {
            return Err(Error::search_index("multi search rejected"));
        }
        state.multi_searches += 1;
        Ok(requests.iter().map(|request| state.search(request)).collect())
    }

    async fn bulk_write(&self, operations: Vec<BulkOperation>) -> Result<BulkResponse> {
        let mut state = self.write()?;
        if state.failures.bulk_writes {
            return Err(Error::search_index("bulk write rejected"));
        }
        let failures = operations
            .iter()
            .enumerate()
            .filter_map(|(position, operation)| state.apply(position, operation))
            .collect();
        state.bulk_batches.push(operations);
        Ok(BulkResponse { failures })
    }

    async fn index_by_alias(&self, alias: &str) -> Result<Option<String>> {
        Ok(self.read()?.aliases.get(alias).cloned())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.read()?.indices.contains_key(index))
    }

    async fn create_index(&self, index: &str, _settings: &Value) -> Result<()> {
        let mut state = self.write()?;
        if state.indices.contains_key(index) {
            return Err(Error::search_index(format!("index {index} already exists")));
        }
        state.indices.insert(index.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn create_alias(&self, index: &str, alias: &str) -> Result<()> {
        let mut state = self.write()?;
        if state.failures.alias_creation {
            return Err(Error::search_index(format!("cannot create alias {alias}")));
        }
        if !state.indices.contains_key(index) {
            return Err(Error::resource_not_found("index", index));
        }
        state.aliases.insert(alias.to_string(), index.to_string());
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let mut state = self.write()?;
        state.indices.remove(index);
        state.aliases.retain(|_, target| target != index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::PathMatch;
    use serde_json::json;

    #[tokio::test]
    async fn bulk_index_assigns_ids_and_updates_in_place() {
        let index = MemorySearchIndex::new();
        index.put_alias("nfs-file-1", "abcde-nfs-file-1").unwrap();

        let response = index
            .bulk_write(vec![BulkOperation::Index {
                index: "abcde-nfs-file-1".into(),
                id: None,
                document: json!({ "id": "a.txt", "storage_id": 1, "size": 1 }),
            }])
            .await
            .unwrap();
        assert!(response.failures.is_empty());

        let hit = index.document(1, "a.txt").unwrap();
        index
            .bulk_write(vec![BulkOperation::Index {
                index: hit.index.clone(),
                id: Some(hit.id.clone()),
                document: json!({ "id": "a.txt", "storage_id": 1, "size": 2 }),
            }])
            .await
            .unwrap();

        assert_eq!(index.documents(1).len(), 1);
        assert_eq!(index.document(1, "a.txt").unwrap().source["size"], 2);
    }

    #[tokio::test]
    async fn multi_search_returns_pages_in_request_order() {
        let index = MemorySearchIndex::new();
        index
            .insert_document("idx", "1", json!({ "id": "a", "storage_id": 1 }))
            .unwrap();
        let pages = index
            .multi_search(&[SearchRequest::exact(1, "missing"), SearchRequest::exact(1, "a")])
            .await
            .unwrap();
        assert_eq!(pages[0].total_hits, 0);
        assert_eq!(pages[1].total_hits, 1);
        assert_eq!(pages[1].hits[0].id, "1");
    }

    #[tokio::test]
    async fn rejected_paths_are_item_failures() {
        let index = MemorySearchIndex::new();
        index.reject_path("bad.txt");
        let response = index
            .bulk_write(vec![
                BulkOperation::Index {
                    index: "idx".into(),
                    id: None,
                    document: json!({ "id": "bad.txt", "storage_id": 1 }),
                },
                BulkOperation::Index {
                    index: "idx".into(),
                    id: None,
                    document: json!({ "id": "good.txt", "storage_id": 1 }),
                },
            ])
            .await
            .unwrap();
        assert_eq!(response.failures.len(), 1);
        assert_eq!(response.failures[0].position, 0);
        assert_eq!(index.paths(1), vec!["good.txt"]);
    }

    #[tokio::test]
    async fn storages_are_isolated() {
        let index = MemorySearchIndex::new();
        index
            .insert_document("idx", "1", json!({ "id": "a", "storage_id": 1 }))
            .unwrap();
        index
            .insert_document("idx", "2", json!({ "id": "a", "storage_id": 2 }))
            .unwrap();
        let page = index
            .search(&SearchRequest {
                index_pattern: ALL_INDICES.into(),
                query: DocumentQuery {
                    storage_id: 2,
                    path: PathMatch::All,
                },
                size: 10,
                scroll: None,
            })
            .await
            .unwrap();
        assert_eq!(page.total_hits, 1);
        assert_eq!(page.hits[0].id, "2");
    }

    #[tokio::test]
    async fn delete_index_drops_aliases() {
        let index = MemorySearchIndex::new();
        index.create_index("x-alias", &json!({})).await.unwrap();
        index.create_alias("x-alias", "alias").await.unwrap();
        assert_eq!(index.index_by_alias("alias").await.unwrap().as_deref(), Some("x-alias"));

        index.delete_index("x-alias").await.unwrap();
        assert!(!index.index_exists("x-alias").await.unwrap());
        assert_eq!(index.index_by_alias("alias").await.unwrap(), None);
    }
}
