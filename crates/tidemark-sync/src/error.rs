//! Error types for the synchronization engine.
//!
//! Every variant is caught at a chunk or producer boundary; none of them
//! aborts a whole run.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while synchronizing change events.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// The staging URI cannot be parsed.
    #[error("invalid staging uri '{uri}': {message}")]
    InvalidStagingUri {
        /// The offending URI.
        uri: String,
        /// Description of the problem.
        message: String,
    },

    /// The staging storage is not registered in the storage catalog.
    #[error("staging storage '{bucket}' is not registered")]
    UnknownStagingStorage {
        /// Bucket name looked up.
        bucket: String,
    },

    /// The staging location could not be enumerated.
    #[error("failed to list event files under {location}")]
    Listing {
        /// `bucket/folder` that was listed.
        location: String,
        /// Underlying gateway error.
        #[source]
        source: tidemark_core::Error,
    },

    /// Temporary credentials could not be issued.
    #[error("failed to issue {action} credentials for '{storage}'")]
    Credentials {
        /// Action the credentials were requested for.
        action: &'static str,
        /// Storage path.
        storage: String,
        /// Underlying gateway error.
        #[source]
        source: tidemark_core::Error,
    },

    /// The storage catalog could not be loaded.
    #[error("failed to load storage catalog")]
    Catalog {
        /// Underlying gateway error.
        #[source]
        source: tidemark_core::Error,
    },

    /// A search index query failed.
    #[error("search index query failed for storage {storage_id}")]
    IndexQuery {
        /// Storage whose documents were queried.
        storage_id: i64,
        /// Underlying gateway error.
        #[source]
        source: tidemark_core::Error,
    },

    /// The index for new documents could not be resolved or created.
    #[error("failed to provision index '{alias}'")]
    IndexProvisioning {
        /// Alias that could not be resolved.
        alias: String,
        /// Underlying gateway error.
        #[source]
        source: tidemark_core::Error,
    },

    /// The filesystem mount of a storage is unavailable or vanished mid-run.
    #[error("mount for storage '{storage}' is unavailable")]
    MountUnavailable {
        /// Storage name.
        storage: String,
        /// Expected mount root, if one was resolved.
        mount: Option<PathBuf>,
    },

    /// Reading file metadata from the mount failed.
    #[error("failed to stat {path}")]
    FileMetadata {
        /// Absolute path that was inspected.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Tags could not be loaded for a storage.
    #[error("failed to load tags for storage {storage_id}")]
    Tags {
        /// Storage whose tags were requested.
        storage_id: i64,
        /// Underlying gateway error.
        #[source]
        source: tidemark_core::Error,
    },

    /// A file document could not be encoded.
    #[error("failed to encode document for {path}")]
    Document {
        /// File path of the document.
        path: String,
        /// Underlying encoding error.
        #[source]
        source: tidemark_core::Error,
    },

    /// A bulk write to the search index failed.
    #[error("bulk write of {operations} operations failed")]
    BulkWrite {
        /// Number of operations in the failed batch.
        operations: usize,
        /// Underlying gateway error.
        #[source]
        source: tidemark_core::Error,
    },

    /// A consumed event file could not be deleted.
    #[error("failed to delete event file {path}")]
    Cleanup {
        /// Object path.
        path: String,
        /// Underlying gateway error.
        #[source]
        source: tidemark_core::Error,
    },

    /// A chunk exceeded its time budget.
    #[error("chunk did not complete within {limit:?}")]
    ChunkTimeout {
        /// Configured limit.
        limit: Duration,
    },
}

impl SyncError {
    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid staging URI error.
    #[must_use]
    pub fn invalid_staging_uri(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidStagingUri {
            uri: uri.into(),
            message: message.into(),
        }
    }
}
