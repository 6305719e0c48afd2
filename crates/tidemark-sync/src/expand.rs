//! Folder event expansion.
//!
//! Folder deletes and moves are turned into per-file events by scrolling
//! over the documents already indexed under the folder prefix.

use std::collections::HashSet;
use std::pin::pin;
use std::time::Duration;

use futures::TryStreamExt;

use crate::error::{Result, SyncError};
use crate::event::{EventRecord, EventType, FolderPrefix};
use crate::index::{PathMatch, SearchIndexGateway, SearchRequest, scroll_pages};

impl From<&FolderPrefix> for PathMatch {
    fn from(prefix: &FolderPrefix) -> Self {
        match prefix {
            FolderPrefix::Root => Self::All,
            FolderPrefix::Prefix(prefix) => Self::Prefix(prefix.clone()),
        }
    }
}

/// Expands folder-scoped events of one storage into file events.
pub struct FolderEventExpander<'a> {
    index: &'a dyn SearchIndexGateway,
    page_size: usize,
    keep_alive: Duration,
}

impl<'a> FolderEventExpander<'a> {
    /// Creates an expander scrolling with the given page size and keep-alive.
    #[must_use]
    pub fn new(index: &'a dyn SearchIndexGateway, page_size: usize, keep_alive: Duration) -> Self {
        Self {
            index,
            page_size,
            keep_alive,
        }
    }

    /// Expands the net events of `storage_id`.
    ///
    /// File events come first, unchanged, followed by the expansion of each
    /// folder event. The result holds at most one event per path; the first
    /// occurrence wins.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::IndexQuery` if a scroll page cannot be fetched.
    pub async fn expand(&self, storage_id: i64, events: Vec<EventRecord>) -> Result<Vec<EventRecord>> {
        let (folder_events, mut expanded): (Vec<_>, Vec<_>) =
            events.into_iter().partition(EventRecord::is_folder_scoped);

        for folder_event in folder_events {
            self.expand_folder(storage_id, &folder_event, &mut expanded)
                .await?;
        }

        let mut seen = HashSet::new();
        expanded.retain(|event| seen.insert(event.path.clone()));
        Ok(expanded)
    }

    async fn expand_folder(
        &self,
        storage_id: i64,
        folder_event: &EventRecord,
        out: &mut Vec<EventRecord>,
    ) -> Result<()> {
        let Some(source) = FolderPrefix::from_folder_path(&folder_event.path) else {
            tracing::warn!(path = %folder_event.path, "folder event without folder wildcard");
            return Ok(());
        };
        let destination = match folder_event.event_type {
            EventType::FolderMoved => {
                let Some(destination) = folder_event
                    .to_path
                    .as_deref()
                    .and_then(FolderPrefix::from_folder_path)
                else {
                    tracing::warn!(path = %folder_event.path, "folder move without destination");
                    return Ok(());
                };
                // MOVED_TO must sort strictly after MOVED_FROM.
                let Some(moved_to_at) = folder_event.timestamp.checked_add(1) else {
                    tracing::warn!(
                        path = %folder_event.path,
                        timestamp = folder_event.timestamp,
                        "folder move timestamp out of range"
                    );
                    return Ok(());
                };
                Some((destination, moved_to_at))
            }
            _ => None,
        };

        let request = SearchRequest::scroll(
            storage_id,
            PathMatch::from(&source),
            self.page_size,
            self.keep_alive,
        );
        let mut pages = pin!(scroll_pages(self.index, request, self.keep_alive));
        let before = out.len();
        while let Some(hits) = pages
            .try_next()
            .await
            .map_err(|error| SyncError::IndexQuery {
                storage_id,
                source: error,
            })?
        {
            for path in hits.iter().filter_map(|hit| hit.path()) {
                let timestamp = folder_event.timestamp;
                let storage = folder_event.storage_id.as_str();
                match &destination {
                    None => out.push(EventRecord::new(timestamp, EventType::Deleted, storage, path)),
                    Some((destination, moved_to_at)) => {
                        let Some(new_path) = source.rewrite(path, destination) else {
                            continue;
                        };
                        out.push(EventRecord::new(timestamp, EventType::MovedFrom, storage, path));
                        out.push(EventRecord::new(
                            *moved_to_at,
                            EventType::MovedTo,
                            storage,
                            new_path,
                        ));
                    }
                }
            }
        }

        tracing::debug!(
            folder = %folder_event.path,
            event_type = %folder_event.event_type,
            produced = out.len() - before,
            "expanded folder event"
        );
        Ok(())
    }
}
