//! Lazy scroll pagination.

use std::time::Duration;

use futures::Stream;
use futures::stream;
use tidemark_core::Result;

use super::{SearchHit, SearchIndexGateway, SearchRequest};

enum ScrollState {
    Initial(SearchRequest),
    Continue(String),
    Exhausted,
}

/// Streams the pages of a scroll search.
///
/// The first page is fetched on first poll; each following page only when
/// the previous one was consumed. The stream ends at the first empty page or
/// when the index stops returning a scroll id. It cannot be rewound; a
/// restart needs a fresh request.
///
/// The scroll context is cleared when the stream ends or a page fails. A
/// stream dropped early leaves it to expire after `keep_alive`.
pub fn scroll_pages<'a>(
    index: &'a dyn SearchIndexGateway,
    request: SearchRequest,
    keep_alive: Duration,
) -> impl Stream<Item = Result<Vec<SearchHit>>> + Send + 'a {
    stream::try_unfold(ScrollState::Initial(request), move |state| async move {
        let page = match state {
            ScrollState::Initial(request) => index.search(&request).await?,
            ScrollState::Continue(scroll_id) => match index.scroll_next(&scroll_id, keep_alive).await {
                Ok(page) => page,
                Err(error) => {
                    release(index, &scroll_id).await;
                    return Err(error);
                }
            },
            ScrollState::Exhausted => return Ok(None),
        };
        if page.hits.is_empty() {
            if let Some(scroll_id) = &page.scroll_id {
                release(index, scroll_id).await;
            }
            return Ok(None);
        }
        let next = page
            .scroll_id
            .map_or(ScrollState::Exhausted, ScrollState::Continue);
        Ok(Some((page.hits, next)))
    })
}

async fn release(index: &dyn SearchIndexGateway, scroll_id: &str) {
    if let Err(error) = index.clear_scroll(scroll_id).await {
        tracing::debug!(%error, "failed to clear scroll context");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{MemorySearchIndex, PathMatch};
    use futures::TryStreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn pages_until_exhausted() {
        let index = MemorySearchIndex::new();
        for i in 0..5 {
            index
                .insert_document("idx", &format!("d{i}"), json!({ "id": format!("a/{i}"), "storage_id": 1 }))
                .unwrap();
        }
        index
            .insert_document("idx", "other", json!({ "id": "b/0", "storage_id": 1 }))
            .unwrap();

        let request = SearchRequest::scroll(1, PathMatch::Prefix("a/".into()), 2, Duration::from_secs(60));
        let pages: Vec<Vec<SearchHit>> = scroll_pages(&index, request, Duration::from_secs(60))
            .try_collect()
            .await
            .unwrap();

        assert_eq!(pages.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 1]);
        assert_eq!(index.scroll_requests(), 3);
        assert_eq!(index.open_scrolls(), 0);
    }

    #[tokio::test]
    async fn empty_result_yields_no_pages() {
        let index = MemorySearchIndex::new();
        let request = SearchRequest::scroll(1, PathMatch::All, 10, Duration::from_secs(60));
        let pages: Vec<Vec<SearchHit>> = scroll_pages(&index, request, Duration::from_secs(60))
            .try_collect()
            .await
            .unwrap();
        assert!(pages.is_empty());
        assert_eq!(index.open_scrolls(), 0);
    }

    #[tokio::test]
    async fn failed_page_clears_scroll() {
        let index = MemorySearchIndex::new();
        for i in 0..3 {
            index
                .insert_document("idx", &format!("d{i}"), json!({ "id": format!("a/{i}"), "storage_id": 1 }))
                .unwrap();
        }
        index.fail_scroll_pages(true);

        let request = SearchRequest::scroll(1, PathMatch::All, 1, Duration::from_secs(60));
        let result: Result<Vec<Vec<SearchHit>>> =
            scroll_pages(&index, request, Duration::from_secs(60)).try_collect().await;

        assert!(result.is_err());
        assert_eq!(index.open_scrolls(), 0);
    }

    #[tokio::test]
    async fn search_failure_surfaces_as_error() {
        let index = MemorySearchIndex::new();
        index.fail_searches(true);
        let request = SearchRequest::scroll(1, PathMatch::All, 10, Duration::from_secs(60));
        let result: Result<Vec<Vec<SearchHit>>> =
            scroll_pages(&index, request, Duration::from_secs(60)).try_collect().await;
        assert!(result.is_err());
    }
}
