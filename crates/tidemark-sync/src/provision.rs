//! Per-storage index provisioning.
//!
//! New documents of a storage go to the index behind the alias
//! `{index_prefix}{index_name}-{storage_id}`. The first time a storage is
//! seen, a fresh index `{random}-{alias}` is created and the alias pointed
//! at it.

use rand::Rng;
use rand::distributions::Alphanumeric;
use tidemark_core::StorageDescriptor;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::index::SearchIndexGateway;

const INDEX_SUFFIX_LEN: usize = 5;

/// Resolves or creates the index for new documents of a storage.
pub struct IndexProvisioner<'a> {
    index: &'a dyn SearchIndexGateway,
    config: &'a SyncConfig,
}

impl<'a> IndexProvisioner<'a> {
    /// Creates a provisioner.
    #[must_use]
    pub fn new(index: &'a dyn SearchIndexGateway, config: &'a SyncConfig) -> Self {
        Self { index, config }
    }

    /// Returns the index new documents of `storage` are written to.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::IndexProvisioning` if the alias cannot be
    /// resolved or the index cannot be created. A half-created index is
    /// deleted before returning.
    pub async fn index_for_new_documents(&self, storage: &StorageDescriptor) -> Result<String> {
        let alias = self.config.index_alias(storage.id);
        let existing = self
            .index
            .index_by_alias(&alias)
            .await
            .map_err(|source| SyncError::IndexProvisioning {
                alias: alias.clone(),
                source,
            })?;
        if let Some(index) = existing {
            return Ok(index);
        }

        let name = format!("{}-{alias}", random_suffix());
        let created = match self.index.create_index(&name, &self.config.index_settings).await {
            Ok(()) => self.index.create_alias(&name, &alias).await,
            Err(error) => Err(error),
        };

        match created {
            Ok(()) => {
                tracing::info!(storage = %storage.name, index = %name, alias = %alias, "created storage index");
                Ok(name)
            }
            Err(source) => {
                tracing::error!(storage = %storage.name, index = %name, error = %source, "index creation failed");
                self.discard(&name).await;
                Err(SyncError::IndexProvisioning { alias, source })
            }
        }
    }

    async fn discard(&self, name: &str) {
        match self.index.index_exists(name).await {
            Ok(true) => {
                if let Err(error) = self.index.delete_index(name).await {
                    tracing::warn!(index = %name, %error, "cannot delete half-created index");
                }
            }
            Ok(false) => {}
            Err(error) => tracing::warn!(index = %name, %error, "cannot check half-created index"),
        }
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(INDEX_SUFFIX_LEN)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}
