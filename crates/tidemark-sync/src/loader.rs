//! Raw event file discovery and loading.

use std::collections::BTreeMap;
use std::sync::Arc;

use tidemark_core::{ObjectMeta, ObjectStorageGateway, TemporaryCredentials};

use crate::config::StagingLocation;
use crate::error::{Result, SyncError};
use crate::event::EventRecord;
use crate::metrics;
use crate::parser::parse_content;

/// Placeholder file kept by some object stores to materialize empty folders.
pub const HIDDEN_PLACEHOLDER: &str = ".hidden";

/// Events decoded from a set of raw event files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedEvents {
    /// Events in file order, then line order.
    pub events: Vec<EventRecord>,
    /// Files that could not be read.
    pub unreadable_files: usize,
    /// Malformed lines dropped.
    pub malformed_lines: usize,
}

/// Lists and reads raw event files of a staging location.
#[derive(Clone)]
pub struct EventLogLoader {
    storage: Arc<dyn ObjectStorageGateway>,
    location: StagingLocation,
}

impl std::fmt::Debug for EventLogLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLogLoader")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl EventLogLoader {
    /// Creates a loader for `location`.
    #[must_use]
    pub fn new(storage: Arc<dyn ObjectStorageGateway>, location: StagingLocation) -> Self {
        Self { storage, location }
    }

    /// Staging location served by this loader.
    #[must_use]
    pub fn location(&self) -> &StagingLocation {
        &self.location
    }

    /// Lists raw event files grouped by producer.
    ///
    /// Producers are ordered by id; files of a producer by key.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Listing` if the staging location cannot be
    /// enumerated.
    pub async fn list_by_producer(
        &self,
        credentials: &TemporaryCredentials,
    ) -> Result<BTreeMap<String, Vec<ObjectMeta>>> {
        let listed = self
            .storage
            .list(&self.location.bucket, &self.location.prefix(), credentials)
            .await
            .map_err(|source| SyncError::Listing {
                location: self.location.to_string(),
                source,
            })?;

        let mut producers: BTreeMap<String, Vec<ObjectMeta>> = BTreeMap::new();
        for object in listed {
            if is_placeholder(&object.path) {
                continue;
            }
            let Some(producer) = self.location.producer_of(&object.path) else {
                continue;
            };
            producers.entry(producer.to_string()).or_default().push(object);
        }
        for files in producers.values_mut() {
            files.sort_by(|a, b| a.path.cmp(&b.path));
        }

        tracing::debug!(
            location = %self.location,
            producers = producers.len(),
            "listed raw event files"
        );
        Ok(producers)
    }

    /// Reads and decodes `files` in order.
    ///
    /// A file that cannot be read contributes no events and is logged.
    pub async fn read_events(
        &self,
        files: &[ObjectMeta],
        credentials: &TemporaryCredentials,
    ) -> LoadedEvents {
        let mut loaded = LoadedEvents::default();
        for file in files {
            let content = match self
                .storage
                .read(&self.location.bucket, &file.path, credentials)
                .await
            {
                Ok(content) => content,
                Err(error) => {
                    tracing::warn!(file = %file.path, %error, "cannot read raw event file");
                    loaded.unreadable_files += 1;
                    continue;
                }
            };
            let parsed = parse_content(&String::from_utf8_lossy(&content));
            metrics::record_parsed(parsed.events.len() as u64, parsed.malformed as u64);
            loaded.malformed_lines += parsed.malformed;
            loaded.events.extend(parsed.events);
        }
        loaded
    }
}

fn is_placeholder(path: &str) -> bool {
    path.ends_with('/') || path.rsplit('/').next() == Some(HIDDEN_PLACEHOLDER)
}
