//! [`ObjectStorageGateway`] backed by the `object_store` crate.
//!
//! A client is built per call from the temporary credentials handed in by the
//! caller, so each operation runs with exactly the scope it was issued for.

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;

use crate::credentials::TemporaryCredentials;
use crate::error::{Error, Result};
use crate::storage::{ObjectMeta, ObjectStorageGateway};

/// Gateway for S3-compatible buckets.
#[derive(Debug, Clone, Default)]
pub struct ObjectStoreGateway {
    endpoint: Option<String>,
    default_region: Option<String>,
}

impl ObjectStoreGateway {
    /// Creates a gateway using the default AWS endpoints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the S3 endpoint (MinIO, on-premise gateways).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Region used when credentials do not carry one.
    #[must_use]
    pub fn with_default_region(mut self, region: impl Into<String>) -> Self {
        self.default_region = Some(region.into());
        self
    }

    /// Returns true if the gateway can serve buckets addressed with `scheme`.
    #[must_use]
    pub fn supports_scheme(scheme: &str) -> bool {
        scheme.eq_ignore_ascii_case("s3")
    }

    fn client(&self, bucket: &str, credentials: &TemporaryCredentials) -> Result<impl ObjectStore> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_access_key_id(&credentials.key_id)
            .with_secret_access_key(&credentials.access_key);
        if let Some(token) = &credentials.token {
            builder = builder.with_token(token);
        }
        if let Some(region) = credentials.region.as_ref().or(self.default_region.as_ref()) {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &self.endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }
        builder
            .build()
            .map_err(|e| Error::storage_with_source(format!("failed to build client for {bucket}"), e))
    }
}

#[async_trait]
impl ObjectStorageGateway for ObjectStoreGateway {
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        credentials: &TemporaryCredentials,
    ) -> Result<Vec<ObjectMeta>> {
        let client = self.client(bucket, credentials)?;
        let prefix = Path::from(prefix);
        let listed: Vec<object_store::ObjectMeta> = client
            .list(Some(&prefix))
            .try_collect()
            .await
            .map_err(|e| Error::storage_with_source(format!("failed to list {bucket}/{prefix}"), e))?;

        Ok(listed
            .into_iter()
            .map(|meta| ObjectMeta {
                path: meta.location.to_string(),
                size: meta.size as u64,
                last_modified: Some(meta.last_modified),
            })
            .collect())
    }

    async fn read(
        &self,
        bucket: &str,
        path: &str,
        credentials: &TemporaryCredentials,
    ) -> Result<Bytes> {
        let client = self.client(bucket, credentials)?;
        let location = Path::from(path);
        let result = client.get(&location).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => {
                Error::NotFound(format!("object not found: {bucket}/{path}"))
            }
            other => Error::storage_with_source(format!("failed to read {bucket}/{path}"), other),
        })?;
        result
            .bytes()
            .await
            .map_err(|e| Error::storage_with_source(format!("failed to read {bucket}/{path}"), e))
    }

    async fn delete(
        &self,
        bucket: &str,
        path: &str,
        credentials: &TemporaryCredentials,
    ) -> Result<()> {
        let client = self.client(bucket, credentials)?;
        match client.delete(&Path::from(path)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(Error::storage_with_source(
                format!("failed to delete {bucket}/{path}"),
                e,
            )),
        }
    }
}
