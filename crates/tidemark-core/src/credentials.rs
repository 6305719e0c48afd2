//! Temporary credential issuance for storage access.
//!
//! Every object-storage call made by the synchronizer carries credentials
//! scoped to exactly one action: listing the staging folder, reading event
//! files, or deleting consumed files.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::StorageDescriptor;
use crate::error::Result;

/// The set of actions a credential grants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessScope {
    /// Allows listing objects.
    pub list: bool,
    /// Allows reading object content.
    pub read: bool,
    /// Allows writing and deleting objects.
    pub write: bool,
}

impl AccessScope {
    /// Listing-only scope.
    #[must_use]
    pub const fn list() -> Self {
        Self {
            list: true,
            read: false,
            write: false,
        }
    }

    /// Read-only scope.
    #[must_use]
    pub const fn read() -> Self {
        Self {
            list: false,
            read: true,
            write: false,
        }
    }

    /// Write (delete) scope.
    #[must_use]
    pub const fn write() -> Self {
        Self {
            list: false,
            read: false,
            write: true,
        }
    }
}

/// Short-lived credentials issued for one storage.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryCredentials {
    /// Access key id.
    pub key_id: String,
    /// Secret access key.
    pub access_key: String,
    /// Session token.
    #[serde(default)]
    pub token: Option<String>,
    /// Region the credentials are valid for.
    #[serde(default)]
    pub region: Option<String>,
    /// Expiration time, if reported by the issuer.
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("key_id", &self.key_id)
            .field("access_key", &"[REDACTED]")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("region", &self.region)
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Issues temporary credentials for a storage.
#[async_trait]
pub trait CredentialGateway: Send + Sync + 'static {
    /// Issues credentials for `storage` limited to `scope`.
    async fn issue(
        &self,
        storage: &StorageDescriptor,
        scope: AccessScope,
    ) -> Result<TemporaryCredentials>;
}
