//! [`SearchIndexGateway`] over the Elasticsearch REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use tidemark_core::error::{Error, Result};
use tidemark_sync::index::{
    BulkItemFailure, BulkOperation, BulkResponse, DocumentQuery, FILE_ID_FIELD, PathMatch,
    STORAGE_ID_FIELD, SearchHit, SearchIndexGateway, SearchPage, SearchRequest,
};

const NDJSON: &str = "application/x-ndjson";

/// HTTP client for an Elasticsearch cluster.
#[derive(Debug, Clone)]
pub struct ElasticsearchClient {
    base_url: String,
    client: reqwest::Client,
}

impl ElasticsearchClient {
    /// Creates a client for `base_url`; every request is bounded by `timeout`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: reqwest::RequestBuilder, context: &str) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::search_index(format!("{context} request failed: {e}")))?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::search_index(format!(
            "{context} failed ({status}): {}",
            error_reason(&body)
        )))
    }

    async fn json<T: for<'de> Deserialize<'de>>(response: reqwest::Response, context: &str) -> Result<T> {
        response.json::<T>().await.map_err(|e| Error::Serialization {
            message: format!("invalid {context} response: {e}"),
        })
    }
}

/// Builds the query clause of a document query.
#[must_use]
pub fn query_body(query: &DocumentQuery) -> Value {
    let mut filter = vec![json!({ "term": { STORAGE_ID_FIELD: query.storage_id } })];
    match &query.path {
        PathMatch::Exact(path) => filter.push(json!({ "term": { FILE_ID_FIELD: path } })),
        PathMatch::Prefix(prefix) => filter.push(json!({ "prefix": { FILE_ID_FIELD: prefix } })),
        PathMatch::All => {}
    }
    json!({ "bool": { "filter": filter } })
}

fn search_body(request: &SearchRequest) -> Value {
    json!({
        "query": query_body(&request.query),
        "size": request.size,
    })
}

fn keep_alive(duration: Duration) -> String {
    format!("{}s", duration.as_secs().max(1))
}

/// Encodes bulk operations as newline-delimited JSON.
///
/// # Errors
///
/// Returns `Error::Serialization` if a document cannot be encoded.
pub fn bulk_body(operations: &[BulkOperation]) -> Result<String> {
    let mut body = String::new();
    for operation in operations {
        let (action, document) = match operation {
            BulkOperation::Index {
                index,
                id,
                document,
            } => {
                let mut meta = json!({ "_index": index });
                if let Some(id) = id {
                    meta["_id"] = json!(id);
                }
                (json!({ "index": meta }), Some(document))
            }
            BulkOperation::Delete { index, id } => {
                (json!({ "delete": { "_index": index, "_id": id } }), None)
            }
        };
        push_line(&mut body, &action)?;
        if let Some(document) = document {
            push_line(&mut body, document)?;
        }
    }
    Ok(body)
}

fn push_line(body: &mut String, value: &Value) -> Result<()> {
    let line = serde_json::to_string(value).map_err(|e| Error::Serialization {
        message: format!("cannot encode bulk line: {e}"),
    })?;
    body.push_str(&line);
    body.push('\n');
    Ok(())
}

fn error_reason(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            let error = value.get("error")?;
            error
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| error.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string())
}

#[derive(Debug, Deserialize)]
struct RawSearchResponse {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    hits: RawHits,
}

#[derive(Debug, Deserialize)]
struct RawHits {
    total: RawTotal,
    #[serde(default)]
    hits: Vec<RawHit>,
}

/// `hits.total` is a number before 7.0 and an object afterwards.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTotal {
    Count(u64),
    Object { value: u64 },
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
}

impl From<RawSearchResponse> for SearchPage {
    fn from(raw: RawSearchResponse) -> Self {
        let total_hits = match raw.hits.total {
            RawTotal::Count(count) | RawTotal::Object { value: count } => count,
        };
        Self {
            hits: raw
                .hits
                .hits
                .into_iter()
                .map(|hit| SearchHit {
                    index: hit.index,
                    id: hit.id,
                    source: hit.source,
                })
                .collect(),
            total_hits,
            scroll_id: raw.scroll_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMultiSearchResponse {
    responses: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawBulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<std::collections::HashMap<String, RawBulkItem>>,
}

#[derive(Debug, Deserialize)]
struct RawBulkItem {
    #[serde(rename = "_index", default)]
    index: String,
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

fn bulk_failures(raw: RawBulkResponse) -> Vec<BulkItemFailure> {
    if !raw.errors {
        return Vec::new();
    }
    raw.items
        .into_iter()
        .enumerate()
        .filter_map(|(position, item)| {
            let item = item.into_values().next()?;
            let error = item.error?;
            let reason = error
                .get("reason")
                .or_else(|| error.get("type"))
                .and_then(Value::as_str)
                .map_or_else(|| error.to_string(), str::to_string);
            Some(BulkItemFailure {
                position,
                index: item.index,
                id: item.id,
                reason,
            })
        })
        .collect()
}

#[async_trait]
impl SearchIndexGateway for ElasticsearchClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage> {
        let mut query = vec![
            ("ignore_unavailable", "true".to_string()),
            ("allow_no_indices", "true".to_string()),
        ];
        if let Some(scroll) = request.scroll {
            query.push(("scroll", keep_alive(scroll)));
        }
        let response = self
            .send(
                self.client
                    .post(self.url(&format!("{}/_search", request.index_pattern)))
                    .query(&query)
                    .json(&search_body(request)),
                "search",
            )
            .await?;
        Self::json::<RawSearchResponse>(response, "search")
            .await
            .map(SearchPage::from)
    }

    async fn scroll_next(&self, scroll_id: &str, keep_alive_for: Duration) -> Result<SearchPage> {
        let response = self
            .send(
                self.client.post(self.url("_search/scroll")).json(&json!({
                    "scroll": keep_alive(keep_alive_for),
                    "scroll_id": scroll_id,
                })),
                "scroll",
            )
            .await?;
        Self::json::<RawSearchResponse>(response, "scroll")
            .await
            .map(SearchPage::from)
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url("_search/scroll"))
            .json(&json!({ "scroll_id": scroll_id }))
            .send()
            .await
            .map_err(|e| Error::search_index(format!("clear scroll request failed: {e}")))?;
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::search_index(format!(
            "clear scroll failed ({status}): {}",
            error_reason(&body)
        )))
    }

    async fn multi_search(&self, requests: &[SearchRequest]) -> Result<Vec<SearchPage>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let mut body = String::new();
        for request in requests {
            push_line(
                &mut body,
                &json!({ "index": request.index_pattern, "ignore_unavailable": true }),
            )?;
            push_line(&mut body, &search_body(request))?;
        }
        let response = self
            .send(
                self.client
                    .post(self.url("_msearch"))
                    .header(reqwest::header::CONTENT_TYPE, NDJSON)
                    .body(body),
                "multi-search",
            )
            .await?;
        let raw = Self::json::<RawMultiSearchResponse>(response, "multi-search").await?;
        if raw.responses.len() != requests.len() {
            return Err(Error::search_index(format!(
                "multi-search returned {} responses for {} requests",
                raw.responses.len(),
                requests.len()
            )));
        }
        raw.responses
            .into_iter()
            .map(|item| {
                if let Some(error) = item.get("error") {
                    return Err(Error::search_index(format!(
                        "multi-search item failed: {error}"
                    )));
                }
                serde_json::from_value::<RawSearchResponse>(item)
                    .map(SearchPage::from)
                    .map_err(|e| Error::Serialization {
                        message: format!("invalid multi-search item: {e}"),
                    })
            })
            .collect()
    }

    async fn bulk_write(&self, operations: Vec<BulkOperation>) -> Result<BulkResponse> {
        if operations.is_empty() {
            return Ok(BulkResponse::default());
        }
        let body = bulk_body(&operations)?;
        let response = self
            .send(
                self.client
                    .post(self.url("_bulk"))
                    .header(reqwest::header::CONTENT_TYPE, NDJSON)
                    .body(body),
                "bulk",
            )
            .await?;
        let raw = Self::json::<RawBulkResponse>(response, "bulk").await?;
        Ok(BulkResponse {
            failures: bulk_failures(raw),
        })
    }

    async fn index_by_alias(&self, alias: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.url(&format!("_alias/{alias}")))
            .send()
            .await
            .map_err(|e| Error::search_index(format!("alias lookup request failed: {e}")))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::search_index(format!(
                "alias lookup failed ({status}): {}",
                error_reason(&body)
            )));
        }
        let indices =
            Self::json::<std::collections::BTreeMap<String, Value>>(response, "alias lookup")
                .await?;
        Ok(indices.into_keys().next())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self
            .client
            .head(self.url(index))
            .send()
            .await
            .map_err(|e| Error::search_index(format!("index lookup request failed: {e}")))?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(Error::search_index(format!(
                "index lookup of {index} failed ({status})"
            ))),
        }
    }

    async fn create_index(&self, index: &str, settings: &Value) -> Result<()> {
        self.send(
            self.client.put(self.url(index)).json(settings),
            "create index",
        )
        .await?;
        Ok(())
    }

    async fn create_alias(&self, index: &str, alias: &str) -> Result<()> {
        self.send(
            self.client.post(self.url("_aliases")).json(&json!({
                "actions": [{ "add": { "index": index, "alias": alias } }]
            })),
            "create alias",
        )
        .await?;
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(index))
            .send()
            .await
            .map_err(|e| Error::search_index(format!("delete index request failed: {e}")))?;
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::search_index(format!(
            "delete index {index} failed ({status}): {}",
            error_reason(&body)
        )))
    }
}
