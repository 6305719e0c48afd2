//! Synchronizer configuration and staging location parsing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Default number of raw event files per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 100;
/// Default bulk buffer size.
pub const DEFAULT_BULK_INSERT_SIZE: usize = 1000;
/// Default number of paths per tag lookup.
pub const DEFAULT_BULK_LOAD_TAGS_SIZE: usize = 1000;
/// Default scroll page size for folder expansion.
pub const DEFAULT_SCROLL_PAGE_SIZE: usize = 1000;
/// Default scroll keep-alive in seconds.
pub const DEFAULT_SCROLL_KEEP_ALIVE_SECS: u64 = 60;
/// Default number of producers processed concurrently.
pub const DEFAULT_MAX_CONCURRENT_PRODUCERS: usize = 4;

/// Configuration for a [`crate::Synchronizer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Staging location of raw event files, e.g. `s3://events-bucket/nfs-events`.
    pub staging_uri: String,
    /// Maximum raw event files per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Bulk buffer size; a full buffer is flushed immediately.
    #[serde(default = "default_bulk_insert_size")]
    pub bulk_insert_size: usize,
    /// Paths per tag gateway call.
    #[serde(default = "default_bulk_load_tags_size")]
    pub bulk_load_tags_size: usize,
    /// Hits per scroll page during folder expansion.
    #[serde(default = "default_scroll_page_size")]
    pub scroll_page_size: usize,
    /// Scroll context keep-alive in seconds.
    #[serde(default = "default_scroll_keep_alive_secs")]
    pub scroll_keep_alive_secs: u64,
    /// Common prefix of every index alias.
    #[serde(default)]
    pub index_prefix: String,
    /// Index name for NFS file documents.
    #[serde(default = "default_index_name")]
    pub index_name: String,
    /// Settings and mappings used when a storage index is created.
    #[serde(default = "default_index_settings")]
    pub index_settings: serde_json::Value,
    /// Producers processed concurrently.
    #[serde(default = "default_max_concurrent_producers")]
    pub max_concurrent_producers: usize,
    /// Optional time budget of one chunk in seconds.
    #[serde(default)]
    pub chunk_timeout_secs: Option<u64>,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_bulk_insert_size() -> usize {
    DEFAULT_BULK_INSERT_SIZE
}

fn default_bulk_load_tags_size() -> usize {
    DEFAULT_BULK_LOAD_TAGS_SIZE
}

fn default_scroll_page_size() -> usize {
    DEFAULT_SCROLL_PAGE_SIZE
}

fn default_scroll_keep_alive_secs() -> u64 {
    DEFAULT_SCROLL_KEEP_ALIVE_SECS
}

fn default_index_name() -> String {
    "nfs-file".to_string()
}

fn default_index_settings() -> serde_json::Value {
    serde_json::json!({})
}

fn default_max_concurrent_producers() -> usize {
    DEFAULT_MAX_CONCURRENT_PRODUCERS
}

impl SyncConfig {
    /// Creates a configuration with defaults for the given staging URI.
    #[must_use]
    pub fn new(staging_uri: impl Into<String>) -> Self {
        Self {
            staging_uri: staging_uri.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            bulk_insert_size: DEFAULT_BULK_INSERT_SIZE,
            bulk_load_tags_size: DEFAULT_BULK_LOAD_TAGS_SIZE,
            scroll_page_size: DEFAULT_SCROLL_PAGE_SIZE,
            scroll_keep_alive_secs: DEFAULT_SCROLL_KEEP_ALIVE_SECS,
            index_prefix: String::new(),
            index_name: default_index_name(),
            index_settings: default_index_settings(),
            max_concurrent_producers: DEFAULT_MAX_CONCURRENT_PRODUCERS,
            chunk_timeout_secs: None,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidConfig` for zero sizes or an empty index
    /// name, and `SyncError::InvalidStagingUri` when the staging URI cannot
    /// be parsed.
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("chunk_size", self.chunk_size),
            ("bulk_insert_size", self.bulk_insert_size),
            ("bulk_load_tags_size", self.bulk_load_tags_size),
            ("scroll_page_size", self.scroll_page_size),
            ("max_concurrent_producers", self.max_concurrent_producers),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, value)| *value == 0) {
            return Err(SyncError::invalid_config(format!("{name} must be positive")));
        }
        if self.index_name.trim().is_empty() {
            return Err(SyncError::invalid_config("index_name must not be empty"));
        }
        if self.chunk_timeout_secs == Some(0) {
            return Err(SyncError::invalid_config("chunk_timeout_secs must be positive"));
        }
        StagingLocation::parse(&self.staging_uri)?;
        Ok(())
    }

    /// Scroll keep-alive as a duration.
    #[must_use]
    pub fn scroll_keep_alive(&self) -> Duration {
        Duration::from_secs(self.scroll_keep_alive_secs)
    }

    /// Chunk time budget, if configured.
    #[must_use]
    pub fn chunk_timeout(&self) -> Option<Duration> {
        self.chunk_timeout_secs.map(Duration::from_secs)
    }

    /// Alias of the index holding documents of `storage_id`.
    #[must_use]
    pub fn index_alias(&self, storage_id: i64) -> String {
        format!("{}{}-{storage_id}", self.index_prefix, self.index_name)
    }
}

/// Parsed staging location: `scheme://bucket/folder`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingLocation {
    /// URI scheme (`s3`, `gs`, ...).
    pub scheme: String,
    /// Bucket holding the raw event files.
    pub bucket: String,
    /// Folder inside the bucket, without leading or trailing `/`.
    pub folder: String,
}

impl StagingLocation {
    /// Parses a staging URI.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidStagingUri` if the scheme or bucket is missing.
    pub fn parse(uri: &str) -> Result<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| SyncError::invalid_staging_uri(uri, "scheme is not specified"))?;
        if scheme.is_empty() {
            return Err(SyncError::invalid_staging_uri(uri, "scheme is not specified"));
        }
        let (bucket, folder) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(SyncError::invalid_staging_uri(uri, "bucket is not specified"));
        }
        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            bucket: bucket.to_string(),
            folder: folder.trim_matches('/').to_string(),
        })
    }

    /// Listing prefix for the staging folder.
    #[must_use]
    pub fn prefix(&self) -> String {
        if self.folder.is_empty() {
            String::new()
        } else {
            format!("{}/", self.folder)
        }
    }

    /// Producer id of an object key: its first segment below the folder.
    ///
    /// Returns `None` for keys outside the folder.
    #[must_use]
    pub fn producer_of<'a>(&self, key: &'a str) -> Option<&'a str> {
        let relative = key.strip_prefix(self.prefix().as_str())?;
        relative.split('/').next().filter(|segment| !segment.is_empty())
    }
}

impl std::fmt::Display for StagingLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_staging_uri() {
        let location = StagingLocation::parse("s3://events/nfs-events/").unwrap();
        assert_eq!(location.scheme, "s3");
        assert_eq!(location.bucket, "events");
        assert_eq!(location.folder, "nfs-events");
        assert_eq!(location.prefix(), "nfs-events/");
    }

    #[test]
    fn nested_folder_is_trimmed() {
        let location = StagingLocation::parse("S3://events//a/b//").unwrap();
        assert_eq!(location.scheme, "s3");
        assert_eq!(location.folder, "a/b");
    }

    #[test]
    fn missing_scheme_is_rejected() {
        let err = StagingLocation::parse("events/nfs").unwrap_err();
        assert!(matches!(err, SyncError::InvalidStagingUri { .. }));
        assert!(StagingLocation::parse("://events").is_err());
        assert!(StagingLocation::parse("s3:///folder").is_err());
    }

    #[test]
    fn producer_is_first_segment_below_folder() {
        let location = StagingLocation::parse("s3://events/nfs-events").unwrap();
        assert_eq!(
            location.producer_of("nfs-events/watcher-01/0001.log"),
            Some("watcher-01")
        );
        assert_eq!(location.producer_of("other/watcher-01/0001.log"), None);

        let root = StagingLocation::parse("s3://events").unwrap();
        assert_eq!(root.prefix(), "");
        assert_eq!(root.producer_of("watcher-02/0001.log"), Some("watcher-02"));
    }

    #[test]
    fn validate_rejects_zero_sizes() {
        let mut config = SyncConfig::new("s3://events/nfs-events");
        config.validate().unwrap();

        config.bulk_insert_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bulk_insert_size"));
    }

    #[test]
    fn validate_rejects_bad_uri() {
        let config = SyncConfig::new("events-bucket");
        assert!(matches!(
            config.validate(),
            Err(SyncError::InvalidStagingUri { .. })
        ));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"staging_uri":"s3://events/nfs","index_prefix":"cp-"}"#)
                .unwrap();
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.scroll_keep_alive(), Duration::from_secs(60));
        assert_eq!(config.chunk_timeout(), None);
        assert_eq!(config.index_alias(7), "cp-nfs-file-7");
    }
}
