//! Observability infrastructure for Tidemark.
//!
//! Structured logging with consistent spans. The engine logs through
//! `tracing`; binaries call [`init_logging`] once at startup.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(format!("unknown log format '{other}' (expected json or pretty)")),
        }
    }
}

/// Initializes the logging subsystem.
///
/// Safe to call multiple times; subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `tidemark_sync=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for one producer chunk.
///
/// # Example
///
/// ```rust
/// use tidemark_core::observability::chunk_span;
///
/// let span = chunk_span("watcher-01", 3);
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn chunk_span(producer: &str, chunk: usize) -> Span {
    tracing::info_span!("sync_chunk", producer = producer, chunk = chunk)
}

/// Creates a span for one storage within a chunk.
#[must_use]
pub fn storage_span(storage_id: i64, storage_name: &str) -> Span {
    tracing::info_span!("sync_storage", storage_id = storage_id, storage = storage_name)
}
