//! Pipeline API client: storage catalog, temporary credentials and file tags.
//!
//! Every response is wrapped in a `{ "status": "OK", "payload": ... }`
//! envelope; any other status is reported as `Error::Api`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use tidemark_core::error::{Error, Result};
use tidemark_core::{
    AccessScope, AclEntry, CredentialGateway, StorageCatalog, StorageDescriptor, StorageKind,
    TemporaryCredentials,
};
use tidemark_sync::tags::{MetadataTagGateway, Tags};

const STATUS_OK: &str = "OK";
const ACL_CLASS_DATA_STORAGE: &str = "DATA_STORAGE";

/// HTTP client for the pipeline REST API.
#[derive(Clone)]
pub struct PipelineApiClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for PipelineApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineApiClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl PipelineApiClient {
    /// Creates a client for `base_url`; every request is bounded by `timeout`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/{}", self.base_url, path.trim_start_matches('/')));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn call<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder, context: &str) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::api(format!("{context} request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(format!("{context} failed ({status}): {body}")));
        }
        let envelope = response
            .json::<Envelope<T>>()
            .await
            .map_err(|e| Error::Serialization {
                message: format!("invalid {context} response: {e}"),
            })?;
        envelope.into_payload(context)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    #[serde(default)]
    message: Option<String>,
    payload: Option<T>,
}

impl<T> Envelope<T> {
    fn into_payload(self, context: &str) -> Result<T> {
        if self.status != STATUS_OK {
            return Err(Error::api(format!(
                "{context} returned {}: {}",
                self.status,
                self.message.unwrap_or_default()
            )));
        }
        self.payload
            .ok_or_else(|| Error::api(format!("{context} returned no payload")))
    }
}

#[derive(Debug, Deserialize)]
struct RawStorage {
    id: i64,
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    owner: Option<String>,
}

impl From<RawStorage> for StorageDescriptor {
    fn from(raw: RawStorage) -> Self {
        let kind = if raw.kind.eq_ignore_ascii_case("NFS") {
            StorageKind::Nfs
        } else {
            StorageKind::ObjectStore
        };
        Self {
            id: raw.id,
            name: raw.name,
            path: raw.path,
            kind,
            owner: raw.owner,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEntityPermissions {
    #[serde(default)]
    permissions: Vec<RawPermission>,
}

#[derive(Debug, Deserialize)]
struct RawPermission {
    sid: RawSid,
    mask: u32,
}

#[derive(Debug, Deserialize)]
struct RawSid {
    name: String,
    principal: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialAction {
    id: i64,
    bucket_name: String,
    list: bool,
    read: bool,
    write: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCredentials {
    #[serde(rename = "keyID")]
    key_id: String,
    access_key: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RawTag {
    path: String,
    key: String,
    value: String,
}

#[async_trait]
impl StorageCatalog for PipelineApiClient {
    async fn load_storages(&self) -> Result<Vec<StorageDescriptor>> {
        let storages: Vec<RawStorage> = self
            .call(self.request(reqwest::Method::GET, "datastorage/loadAll"), "load storages")
            .await?;
        Ok(storages.into_iter().map(StorageDescriptor::from).collect())
    }

    async fn load_permissions(&self, storage: &StorageDescriptor) -> Result<Vec<AclEntry>> {
        let permissions: RawEntityPermissions = self
            .call(
                self.request(reqwest::Method::GET, "permissions").query(&[
                    ("id", storage.id.to_string()),
                    ("aclClass", ACL_CLASS_DATA_STORAGE.to_string()),
                ]),
                "load permissions",
            )
            .await?;
        Ok(permissions
            .permissions
            .into_iter()
            .map(|permission| AclEntry {
                name: permission.sid.name,
                principal: permission.sid.principal,
                mask: permission.mask,
            })
            .collect())
    }
}

#[async_trait]
impl CredentialGateway for PipelineApiClient {
    async fn issue(
        &self,
        storage: &StorageDescriptor,
        scope: AccessScope,
    ) -> Result<TemporaryCredentials> {
        tracing::debug!(
            storage = %storage.path,
            list = scope.list,
            read = scope.read,
            write = scope.write,
            "Requesting temporary credentials"
        );
        let action = CredentialAction {
            id: storage.id,
            bucket_name: storage.path.clone(),
            list: scope.list,
            read: scope.read,
            write: scope.write,
        };
        let raw: RawCredentials = self
            .call(
                self.request(reqwest::Method::POST, "datastorage/tempCredentials/")
                    .json(&[action]),
                "issue credentials",
            )
            .await?;
        Ok(TemporaryCredentials {
            key_id: raw.key_id,
            access_key: raw.access_key,
            token: raw.token,
            region: raw.region,
            expiration: raw.expiration,
        })
    }
}

#[async_trait]
impl MetadataTagGateway for PipelineApiClient {
    async fn load_tags(&self, storage_id: i64, paths: &[String]) -> Result<HashMap<String, Tags>> {
        if paths.is_empty() {
            return Ok(HashMap::new());
        }
        let requests: Vec<_> = paths.iter().map(|path| json!({ "path": path })).collect();
        let raw: Vec<RawTag> = self
            .call(
                self.request(
                    reqwest::Method::POST,
                    &format!("datastorage/{storage_id}/tags/batch/load"),
                )
                .json(&json!({ "requests": requests })),
                "load tags",
            )
            .await?;
        let mut tags: HashMap<String, Tags> = HashMap::new();
        for tag in raw {
            tags.entry(tag.path).or_default().insert(tag.key, tag.value);
        }
        Ok(tags)
    }
}
