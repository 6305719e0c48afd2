//! Agent configuration.
//!
//! Loaded from `TIDEMARK_*` environment variables; CLI flags override the
//! loaded values (see `main.rs`).

use std::path::PathBuf;
use std::time::Duration;

use tidemark_core::error::{Error, Result};
use tidemark_core::observability::LogFormat;
use tidemark_sync::SyncConfig;

/// Default base URL of the search index.
pub const DEFAULT_ELASTICSEARCH_URL: &str = "http://localhost:9200";
/// Default directory below which NFS shares are mounted.
pub const DEFAULT_MOUNT_ROOT: &str = "/cloud-data";
/// Default timeout of every outbound HTTP request in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Complete agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Synchronizer settings.
    pub sync: SyncConfig,
    /// Base URL of the pipeline API (catalog, credentials, tags).
    pub api_url: String,
    /// Bearer token for the pipeline API.
    pub api_token: Option<String>,
    /// Base URL of the search index.
    pub elasticsearch_url: String,
    /// S3 endpoint override for the staging bucket.
    pub s3_endpoint: Option<String>,
    /// Region used when credentials do not carry one.
    pub s3_region: Option<String>,
    /// Directory below which NFS shares are mounted.
    pub mount_root: PathBuf,
    /// Timeout of outbound HTTP requests in seconds.
    pub request_timeout_secs: u64,
    /// Enables pretty logs.
    pub debug: bool,
}

impl AgentConfig {
    /// Loads configuration from environment variables.
    ///
    /// Required: `TIDEMARK_STAGING_URI`, `TIDEMARK_API_URL`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if a required variable is missing or a
    /// value cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup` instead of the process environment.
    ///
    /// # Errors
    ///
    /// See [`AgentConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env { lookup: &lookup };

        let staging_uri = env.required("TIDEMARK_STAGING_URI")?;
        let mut sync = SyncConfig::new(staging_uri);
        if let Some(size) = env.usize("TIDEMARK_CHUNK_SIZE")? {
            sync.chunk_size = size;
        }
        if let Some(size) = env.usize("TIDEMARK_BULK_INSERT_SIZE")? {
            sync.bulk_insert_size = size;
        }
        if let Some(size) = env.usize("TIDEMARK_BULK_LOAD_TAGS_SIZE")? {
            sync.bulk_load_tags_size = size;
        }
        if let Some(size) = env.usize("TIDEMARK_SCROLL_PAGE_SIZE")? {
            sync.scroll_page_size = size;
        }
        if let Some(secs) = env.u64("TIDEMARK_SCROLL_KEEP_ALIVE_SECS")? {
            sync.scroll_keep_alive_secs = secs;
        }
        if let Some(prefix) = env.string("TIDEMARK_INDEX_PREFIX") {
            sync.index_prefix = prefix;
        }
        if let Some(name) = env.string("TIDEMARK_INDEX_NAME") {
            sync.index_name = name;
        }
        if let Some(path) = env.string("TIDEMARK_INDEX_SETTINGS_PATH") {
            sync.index_settings = load_index_settings(&path)?;
        }
        if let Some(producers) = env.usize("TIDEMARK_MAX_CONCURRENT_PRODUCERS")? {
            sync.max_concurrent_producers = producers;
        }
        sync.chunk_timeout_secs = env.u64("TIDEMARK_CHUNK_TIMEOUT_SECS")?;

        Ok(Self {
            sync,
            api_url: env.required("TIDEMARK_API_URL")?,
            api_token: env.string("TIDEMARK_API_TOKEN"),
            elasticsearch_url: env
                .string("TIDEMARK_ELASTICSEARCH_URL")
                .unwrap_or_else(|| DEFAULT_ELASTICSEARCH_URL.to_string()),
            s3_endpoint: env.string("TIDEMARK_S3_ENDPOINT"),
            s3_region: env.string("TIDEMARK_S3_REGION"),
            mount_root: env
                .string("TIDEMARK_MOUNT_ROOT")
                .map_or_else(|| PathBuf::from(DEFAULT_MOUNT_ROOT), PathBuf::from),
            request_timeout_secs: env
                .u64("TIDEMARK_REQUEST_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            debug: env.bool("TIDEMARK_DEBUG")?.unwrap_or(false),
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for an invalid synchronizer setting or a
    /// zero request timeout.
    pub fn validate(&self) -> Result<()> {
        self.sync
            .validate()
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidInput(
                "TIDEMARK_REQUEST_TIMEOUT_SECS must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Timeout of outbound HTTP requests.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Log format: pretty in debug mode, JSON otherwise.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        if self.debug {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

fn load_index_settings(path: &str) -> Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::InvalidInput(format!("cannot read TIDEMARK_INDEX_SETTINGS_PATH {path}: {e}"))
    })?;
    serde_json::from_str(&raw).map_err(|e| {
        Error::InvalidInput(format!("TIDEMARK_INDEX_SETTINGS_PATH {path} is not JSON: {e}"))
    })
}

struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    fn required(&self, name: &str) -> Result<String> {
        self.string(name)
            .ok_or_else(|| Error::InvalidInput(format!("missing {name}")))
    }

    fn u64(&self, name: &str) -> Result<Option<u64>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        v.parse::<u64>()
            .map(Some)
            .map_err(|e| Error::InvalidInput(format!("{name} must be a u64: {e}")))
    }

    fn usize(&self, name: &str) -> Result<Option<usize>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        v.parse::<usize>()
            .map(Some)
            .map_err(|e| Error::InvalidInput(format!("{name} must be a usize: {e}")))
    }

    fn bool(&self, name: &str) -> Result<Option<bool>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        parse_bool(name, &v).map(Some)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be a boolean (true/false/1/0)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("TIDEMARK_STAGING_URI", "s3://events/nfs-events"),
        ("TIDEMARK_API_URL", "https://pipeline.example.com/restapi"),
    ];

    #[test]
    fn required_variables_only_yield_defaults() {
        let config = AgentConfig::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(config.sync, SyncConfig::new("s3://events/nfs-events"));
        assert_eq!(config.elasticsearch_url, DEFAULT_ELASTICSEARCH_URL);
        assert_eq!(config.mount_root, PathBuf::from(DEFAULT_MOUNT_ROOT));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.log_format(), LogFormat::Json);
        assert!(config.api_token.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn missing_staging_uri_is_rejected() {
        let err = AgentConfig::from_lookup(lookup(&[("TIDEMARK_API_URL", "http://api")]))
            .unwrap_err();
        assert!(err.to_string().contains("TIDEMARK_STAGING_URI"));
    }

    #[test]
    fn overrides_are_applied() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("TIDEMARK_CHUNK_SIZE", "10"),
            ("TIDEMARK_BULK_INSERT_SIZE", "50"),
            ("TIDEMARK_INDEX_PREFIX", "cp-"),
            ("TIDEMARK_CHUNK_TIMEOUT_SECS", "120"),
            ("TIDEMARK_MOUNT_ROOT", "/mnt/shares"),
            ("TIDEMARK_DEBUG", "yes"),
            ("TIDEMARK_API_TOKEN", "  "),
        ]);
        let config = AgentConfig::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.sync.chunk_size, 10);
        assert_eq!(config.sync.bulk_insert_size, 50);
        assert_eq!(config.sync.index_alias(7), "cp-nfs-file-7");
        assert_eq!(config.sync.chunk_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.mount_root, PathBuf::from("/mnt/shares"));
        assert_eq!(config.log_format(), LogFormat::Pretty);
        assert!(config.api_token.is_none(), "blank values count as unset");
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("TIDEMARK_CHUNK_SIZE", "lots"));
        let err = AgentConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("TIDEMARK_CHUNK_SIZE"));
    }

    #[test]
    fn validate_rejects_zero_sizes() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("TIDEMARK_CHUNK_SIZE", "0"));
        let config = AgentConfig::from_lookup(lookup(&pairs)).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("TEST", "TRUE").unwrap());
        assert!(parse_bool("TEST", "1").unwrap());
        assert!(!parse_bool("TEST", "no").unwrap());
        assert!(parse_bool("TEST", "maybe").is_err());
    }
}
