//! Object storage gateway used for the raw event staging area.
//!
//! The synchronizer only needs three operations on the staging bucket:
//! enumerate event files, read one, and delete consumed ones. Each call is
//! authorized with temporary credentials issued for that single action.
//!
//! ## Ordering
//!
//! `list` returns objects in arbitrary order. Callers requiring deterministic
//! order must sort the results (the event loader sorts by `path`).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::credentials::TemporaryCredentials;
use crate::error::{Error, Result};

/// Metadata about a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Object path (key) inside the bucket.
    pub path: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modification timestamp.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Object storage gateway.
///
/// Implementations exist for real cloud buckets
/// ([`crate::object_store_backend::ObjectStoreGateway`]) and for tests
/// ([`MemoryObjectStore`]).
#[async_trait]
pub trait ObjectStorageGateway: Send + Sync + 'static {
    /// Lists every object under `prefix` in `bucket`.
    ///
    /// A failed listing is an error; implementations never return a partial
    /// listing as success.
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        credentials: &TemporaryCredentials,
    ) -> Result<Vec<ObjectMeta>>;

    /// Reads an entire object.
    ///
    /// Returns `Error::NotFound` if the object doesn't exist.
    async fn read(
        &self,
        bucket: &str,
        path: &str,
        credentials: &TemporaryCredentials,
    ) -> Result<Bytes>;

    /// Deletes an object.
    ///
    /// Succeeds even if the object doesn't exist (idempotent).
    async fn delete(
        &self,
        bucket: &str,
        path: &str,
        credentials: &TemporaryCredentials,
    ) -> Result<()>;
}

/// In-memory object storage for testing.
///
/// Thread-safe via `RwLock`. Not suitable for production. Objects are keyed
/// by `(bucket, path)`; credentials are accepted and ignored.
#[derive(Debug, Default, Clone)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<BTreeMap<(String, String), StoredObject>>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

impl MemoryObjectStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes an object, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the lock is poisoned.
    pub fn put(&self, bucket: &str, path: &str, data: impl Into<Bytes>) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?
            .insert(
                (bucket.to_string(), path.to_string()),
                StoredObject {
                    data: data.into(),
                    last_modified: Utc::now(),
                },
            );
        Ok(())
    }

    /// Returns true if the object exists.
    #[must_use]
    pub fn contains(&self, bucket: &str, path: &str) -> bool {
        self.objects
            .read()
            .map(|objects| objects.contains_key(&(bucket.to_string(), path.to_string())))
            .unwrap_or(false)
    }

    /// Returns all paths stored in `bucket`, sorted.
    #[must_use]
    pub fn paths(&self, bucket: &str) -> Vec<String> {
        self.objects
            .read()
            .map(|objects| {
                objects
                    .keys()
                    .filter(|(b, _)| b == bucket)
                    .map(|(_, p)| p.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ObjectStorageGateway for MemoryObjectStore {
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        _credentials: &TemporaryCredentials,
    ) -> Result<Vec<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        Ok(objects
            .iter()
            .filter(|((b, p), _)| b == bucket && p.starts_with(prefix))
            .map(|((_, path), obj)| ObjectMeta {
                path: path.clone(),
                size: obj.data.len() as u64,
                last_modified: Some(obj.last_modified),
            })
            .collect())
    }

    async fn read(
        &self,
        bucket: &str,
        path: &str,
        _credentials: &TemporaryCredentials,
    ) -> Result<Bytes> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        objects
            .get(&(bucket.to_string(), path.to_string()))
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::NotFound(format!("object not found: {bucket}/{path}")))
    }

    async fn delete(
        &self,
        bucket: &str,
        path: &str,
        _credentials: &TemporaryCredentials,
    ) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?
            .remove(&(bucket.to_string(), path.to_string()));
        Ok(())
    }
}
