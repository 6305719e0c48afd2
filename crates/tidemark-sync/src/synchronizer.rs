//! Synchronization run orchestration.
//!
//! One run lists the staging location once, then processes producers in
//! parallel (bounded) and each producer's chunks in file order:
//!
//! ```text
//! read -> parse -> merge -> expand -> reconcile -> flush -> delete files
//! ```
//!
//! A failing chunk is recorded in the report and its files stay in the
//! staging area; other chunks and producers carry on.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use futures::{StreamExt, stream};
use tidemark_core::observability::{chunk_span, storage_span};
use tidemark_core::{
    AccessScope, CredentialGateway, ObjectMeta, ObjectStorageGateway, StorageCatalog,
    StorageDescriptor, TemporaryCredentials,
};
use tracing::Instrument;

use crate::bulk::BulkRequestEmitter;
use crate::chunk::{ChunkOutcome, ChunkReport, ChunkStage, ProducerReport, SyncReport};
use crate::config::{StagingLocation, SyncConfig};
use crate::error::{Result, SyncError};
use crate::event::EventRecord;
use crate::expand::FolderEventExpander;
use crate::index::SearchIndexGateway;
use crate::loader::EventLogLoader;
use crate::merge::merge_events;
use crate::metrics;
use crate::mount::{FilesystemMountGateway, MountedStorage};
use crate::permissions::PermissionLabels;
use crate::provision::IndexProvisioner;
use crate::reconcile::{IndexReconciler, ReconcileTarget};
use crate::tags::MetadataTagGateway;

/// External collaborators of the synchronizer.
#[derive(Clone)]
pub struct SyncGateways {
    /// Staging area holding raw event files.
    pub object_storage: Arc<dyn ObjectStorageGateway>,
    /// Search index holding file documents.
    pub search_index: Arc<dyn SearchIndexGateway>,
    /// Local mounts of NFS storages.
    pub mounts: Arc<dyn FilesystemMountGateway>,
    /// Temporary credential issuer.
    pub credentials: Arc<dyn CredentialGateway>,
    /// Metadata tag lookup.
    pub tags: Arc<dyn MetadataTagGateway>,
    /// Storage registry and ACLs.
    pub catalog: Arc<dyn StorageCatalog>,
}

impl std::fmt::Debug for SyncGateways {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncGateways").finish_non_exhaustive()
    }
}

/// Storages resolved at the start of a run.
struct RunContext {
    events_storage: StorageDescriptor,
    nfs_storages: HashMap<String, StorageDescriptor>,
}

/// Turns raw change events into search index state.
#[derive(Debug)]
pub struct Synchronizer {
    config: SyncConfig,
    gateways: SyncGateways,
    loader: EventLogLoader,
}

impl Synchronizer {
    /// Creates a synchronizer.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidConfig` or `SyncError::InvalidStagingUri`
    /// if the configuration is invalid.
    pub fn new(config: SyncConfig, gateways: SyncGateways) -> Result<Self> {
        config.validate()?;
        let location = StagingLocation::parse(&config.staging_uri)?;
        let loader = EventLogLoader::new(Arc::clone(&gateways.object_storage), location);
        Ok(Self {
            config,
            gateways,
            loader,
        })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Runs one synchronization pass.
    ///
    /// Never fails: every error is caught at the chunk or run level and
    /// recorded in the returned report.
    pub async fn run(&self) -> SyncReport {
        let started = Instant::now();
        tracing::debug!(location = %self.loader.location(), "starting event synchronization");

        let (context, producers) = match self.prepare().await {
            Ok(prepared) => prepared,
            Err(error) => {
                tracing::error!(%error, "cannot list raw event files");
                return SyncReport::listing_failed(error.to_string());
            }
        };

        let mut reports: Vec<ProducerReport> = stream::iter(producers)
            .map(|(producer, files)| self.run_producer(&context, producer, files))
            .buffer_unordered(self.config.max_concurrent_producers)
            .collect()
            .await;
        reports.sort_by(|a, b| a.producer.cmp(&b.producer));

        let report = SyncReport {
            producers: reports,
            listing_error: None,
        };
        tracing::info!(
            producers = report.producers.len(),
            chunks_succeeded = report.chunks_succeeded(),
            chunks_failed = report.chunks_failed(),
            bulk_requests = report.bulk_requests(),
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "event synchronization finished"
        );
        report
    }

    async fn prepare(&self) -> Result<(RunContext, BTreeMap<String, Vec<ObjectMeta>>)> {
        let storages = self
            .gateways
            .catalog
            .load_storages()
            .await
            .map_err(|source| SyncError::Catalog { source })?;

        let bucket = &self.loader.location().bucket;
        let events_storage = storages
            .iter()
            .find(|storage| &storage.path == bucket)
            .cloned()
            .ok_or_else(|| SyncError::UnknownStagingStorage {
                bucket: bucket.clone(),
            })?;
        let nfs_storages = storages
            .into_iter()
            .filter(StorageDescriptor::is_nfs)
            .map(|storage| (storage.path.clone(), storage))
            .collect();

        let credentials = self
            .issue_credentials(&events_storage, AccessScope::list(), "list")
            .await?;
        let producers = self.loader.list_by_producer(&credentials).await?;

        Ok((
            RunContext {
                events_storage,
                nfs_storages,
            },
            producers,
        ))
    }

    async fn run_producer(
        &self,
        context: &RunContext,
        producer: String,
        files: Vec<ObjectMeta>,
    ) -> ProducerReport {
        let mut chunks = Vec::new();
        for (chunk, chunk_files) in files.chunks(self.config.chunk_size).enumerate() {
            let report = self
                .run_chunk(context, chunk, chunk_files)
                .instrument(chunk_span(&producer, chunk))
                .await;
            chunks.push(report);
        }
        tracing::info!(producer = %producer, chunks = chunks.len(), "finished processing producer events");
        ProducerReport { producer, chunks }
    }

    async fn run_chunk(&self, context: &RunContext, chunk: usize, files: &[ObjectMeta]) -> ChunkReport {
        let started = Instant::now();
        let mut report = ChunkReport::new(chunk, files.len());

        let result = match self.config.chunk_timeout() {
            Some(limit) => {
                tokio::time::timeout(limit, self.process_chunk(context, files, &mut report))
                    .await
                    .unwrap_or(Err(SyncError::ChunkTimeout { limit }))
            }
            None => self.process_chunk(context, files, &mut report).await,
        };

        report.duration = started.elapsed();
        match result {
            Ok(()) => {
                report.outcome = Some(ChunkOutcome::Cleaned);
                metrics::record_chunk("cleaned", report.duration.as_secs_f64());
                tracing::info!(
                    files = report.files,
                    net_events = report.net_events,
                    index_requests = report.bulk.index_requests,
                    delete_requests = report.bulk.delete_requests,
                    "chunk synchronized"
                );
            }
            Err(error) => {
                metrics::record_chunk("failed", report.duration.as_secs_f64());
                tracing::warn!(
                    stage = %report.stage,
                    files = report.files,
                    %error,
                    "chunk failed, event files kept for the next run"
                );
                report.outcome = Some(ChunkOutcome::Failed {
                    stage: report.stage,
                    error: error.to_string(),
                });
            }
        }
        report
    }

    async fn process_chunk(
        &self,
        context: &RunContext,
        files: &[ObjectMeta],
        report: &mut ChunkReport,
    ) -> Result<()> {
        let read_credentials = self
            .issue_credentials(&context.events_storage, AccessScope::read(), "read")
            .await?;
        let loaded = self.loader.read_events(files, &read_credentials).await;
        report.events_parsed = loaded.events.len();
        report.malformed_lines = loaded.malformed_lines;
        report.unreadable_files = loaded.unreadable_files;
        report.advance(ChunkStage::Parsed);

        let groups = group_by_storage(&context.nfs_storages, loaded.events);
        let merged: Vec<(&StorageDescriptor, Vec<EventRecord>)> = groups
            .into_values()
            .map(|(storage, events)| (storage, merge_events(events)))
            .collect();
        report.advance(ChunkStage::Merged);

        let index = self.gateways.search_index.as_ref();
        let expander = FolderEventExpander::new(
            index,
            self.config.scroll_page_size,
            self.config.scroll_keep_alive(),
        );
        let mut expanded = Vec::with_capacity(merged.len());
        for (storage, events) in merged {
            let events = expander.expand(storage.id, events).await?;
            report.net_events += events.len();
            expanded.push((storage, events));
        }
        report.advance(ChunkStage::Expanded);

        let mut emitter = BulkRequestEmitter::new(index, self.config.bulk_insert_size);
        let outcome = self.reconcile_storages(&expanded, &mut emitter).await;
        if outcome.is_ok() {
            report.advance(ChunkStage::Reconciled);
        }
        let ((), bulk) = emitter.close(outcome).await?;
        report.bulk = bulk;
        report.advance(ChunkStage::Flushed);

        let write_credentials = self
            .issue_credentials(&context.events_storage, AccessScope::write(), "write")
            .await?;
        self.delete_files(files, &write_credentials, report).await?;
        report.advance(ChunkStage::Cleaned);
        Ok(())
    }

    async fn reconcile_storages(
        &self,
        groups: &[(&StorageDescriptor, Vec<EventRecord>)],
        emitter: &mut BulkRequestEmitter<'_>,
    ) -> Result<()> {
        let index = self.gateways.search_index.as_ref();
        let provisioner = IndexProvisioner::new(index, &self.config);
        let reconciler = IndexReconciler::new(
            index,
            self.gateways.tags.as_ref(),
            self.config.bulk_load_tags_size,
        );

        for (storage, events) in groups {
            if events.is_empty() {
                continue;
            }
            async {
                let new_index = provisioner.index_for_new_documents(storage).await?;
                let mount = MountedStorage::establish(self.gateways.mounts.as_ref(), storage).await?;
                let acl = self
                    .gateways
                    .catalog
                    .load_permissions(storage)
                    .await
                    .map_err(|source| SyncError::Catalog { source })?;
                let labels = PermissionLabels::from_acl(storage, &acl);
                let target = ReconcileTarget {
                    storage,
                    new_index: &new_index,
                    labels: &labels,
                    mount: &mount,
                };
                reconciler.reconcile(&target, events, emitter).await?;
                Ok::<(), SyncError>(())
            }
            .instrument(storage_span(storage.id, &storage.name))
            .await?;
        }
        Ok(())
    }

    async fn delete_files(
        &self,
        files: &[ObjectMeta],
        credentials: &TemporaryCredentials,
        report: &mut ChunkReport,
    ) -> Result<()> {
        let bucket = &self.loader.location().bucket;
        for file in files {
            self.gateways
                .object_storage
                .delete(bucket, &file.path, credentials)
                .await
                .map_err(|source| SyncError::Cleanup {
                    path: file.path.clone(),
                    source,
                })?;
            report.files_deleted += 1;
        }
        Ok(())
    }

    async fn issue_credentials(
        &self,
        storage: &StorageDescriptor,
        scope: AccessScope,
        action: &'static str,
    ) -> Result<TemporaryCredentials> {
        tracing::debug!(storage = %storage.path, action, "issuing temporary credentials");
        self.gateways
            .credentials
            .issue(storage, scope)
            .await
            .map_err(|source| SyncError::Credentials {
                action,
                storage: storage.path.clone(),
                source,
            })
    }
}

/// Groups events by known NFS storage, dropping the rest.
fn group_by_storage(
    storages: &HashMap<String, StorageDescriptor>,
    events: Vec<EventRecord>,
) -> BTreeMap<i64, (&StorageDescriptor, Vec<EventRecord>)> {
    let mut groups: BTreeMap<i64, (&StorageDescriptor, Vec<EventRecord>)> = BTreeMap::new();
    let mut dropped = 0usize;
    for event in events {
        match storages.get(&event.storage_id) {
            Some(storage) => groups
                .entry(storage.id)
                .or_insert_with(|| (storage, Vec::new()))
                .1
                .push(event),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        tracing::debug!(dropped, "dropped events of unknown or non-NFS storages");
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use tidemark_core::StorageKind;

    fn storage(id: i64, path: &str, kind: StorageKind) -> StorageDescriptor {
        StorageDescriptor {
            id,
            name: format!("storage-{id}"),
            path: path.into(),
            kind,
            owner: None,
        }
    }

    #[test]
    fn grouping_drops_unknown_storages() {
        let storages: HashMap<String, StorageDescriptor> = [
            storage(1, "filer:/a", StorageKind::Nfs),
            storage(2, "filer:/b", StorageKind::Nfs),
        ]
        .into_iter()
        .map(|s| (s.path.clone(), s))
        .collect();

        let groups = group_by_storage(
            &storages,
            vec![
                EventRecord::new(1, EventType::Created, "filer:/b", "x"),
                EventRecord::new(1, EventType::Created, "filer:/a", "y"),
                EventRecord::new(1, EventType::Created, "bucket", "z"),
                EventRecord::new(2, EventType::Modified, "filer:/a", "y"),
            ],
        );

        assert_eq!(groups.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(groups[&1].1.len(), 2);
        assert_eq!(groups[&2].1.len(), 1);
    }
}
