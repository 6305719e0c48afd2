//! `tidemark-agent` binary entrypoint.
//!
//! ## Usage
//!
//! ```bash
//! # Run as service (default port 8082, one cycle per minute)
//! tidemark-agent serve --port 8082 --interval-secs 60
//!
//! # Single synchronization pass; exits non-zero if any chunk failed
//! tidemark-agent sync --chunk-size 20
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};

use tidemark_agent::config::AgentConfig;
use tidemark_agent::service::{self, AgentState, ServiceState};
use tidemark_agent::{build_gateways, metrics};
use tidemark_core::ObjectStoreGateway;
use tidemark_core::observability::init_logging;
use tidemark_sync::{StagingLocation, Synchronizer};

// ============================================================================
// CLI Arguments
// ============================================================================

/// Tidemark change-event synchronizer.
#[derive(Debug, Parser)]
#[command(name = "tidemark-agent")]
#[command(about = "Synchronizes filesystem change events into the search index")]
#[command(version)]
struct Args {
    /// Staging location of raw event files (overrides `TIDEMARK_STAGING_URI`).
    #[arg(long, global = true)]
    staging_uri: Option<String>,

    /// Raw event files per chunk (overrides `TIDEMARK_CHUNK_SIZE`).
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Bulk buffer size (overrides `TIDEMARK_BULK_INSERT_SIZE`).
    #[arg(long, global = true)]
    bulk_insert_size: Option<usize>,

    /// Producers processed concurrently (overrides `TIDEMARK_MAX_CONCURRENT_PRODUCERS`).
    #[arg(long, global = true)]
    max_concurrent_producers: Option<usize>,

    /// Time budget of one chunk in seconds (overrides `TIDEMARK_CHUNK_TIMEOUT_SECS`).
    #[arg(long, global = true)]
    chunk_timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run as a service with health endpoints.
    Serve {
        /// HTTP port for health endpoints.
        #[arg(long, env = "TIDEMARK_AGENT_PORT", default_value = "8082")]
        port: u16,

        /// Synchronization interval in seconds.
        #[arg(long, env = "TIDEMARK_SYNC_INTERVAL_SECS", default_value = "60")]
        interval_secs: u64,

        /// Maximum time without a successful cycle before unhealthy (seconds).
        #[arg(
            long,
            env = "TIDEMARK_UNHEALTHY_THRESHOLD_SECS",
            default_value = "600"
        )]
        unhealthy_threshold_secs: u64,
    },

    /// Run a single synchronization pass.
    Sync,
}

impl Args {
    /// Applies CLI overrides; the staging URI is resolved while loading.
    fn apply(&self, config: &mut AgentConfig) {
        if let Some(size) = self.chunk_size {
            config.sync.chunk_size = size;
        }
        if let Some(size) = self.bulk_insert_size {
            config.sync.bulk_insert_size = size;
        }
        if let Some(producers) = self.max_concurrent_producers {
            config.sync.max_concurrent_producers = producers;
        }
        if let Some(secs) = self.chunk_timeout_secs {
            config.sync.chunk_timeout_secs = Some(secs);
        }
    }
}

fn synchronizer(config: &AgentConfig) -> Result<Synchronizer> {
    let location = StagingLocation::parse(&config.sync.staging_uri)?;
    if !ObjectStoreGateway::supports_scheme(&location.scheme) {
        bail!(
            "staging scheme '{}' is not supported (expected s3)",
            location.scheme
        );
    }
    Ok(Synchronizer::new(
        config.sync.clone(),
        build_gateways(config),
    )?)
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AgentConfig::from_lookup(|name| {
        if name == "TIDEMARK_STAGING_URI" && args.staging_uri.is_some() {
            return args.staging_uri.clone();
        }
        std::env::var(name).ok()
    })?;
    args.apply(&mut config);
    config.validate()?;

    init_logging(config.log_format());

    let synchronizer = Arc::new(synchronizer(&config)?);

    match args.command {
        Commands::Serve {
            port,
            interval_secs,
            unhealthy_threshold_secs,
        } => {
            metrics::init_metrics();

            tracing::info!(
                port = port,
                interval_secs = interval_secs,
                unhealthy_threshold_secs = unhealthy_threshold_secs,
                staging_uri = %config.sync.staging_uri,
                "Starting synchronization agent"
            );

            let state = ServiceState {
                agent: Arc::new(AgentState::new(unhealthy_threshold_secs)),
                synchronizer,
            };

            let loop_state = state.clone();
            let interval = Duration::from_secs(interval_secs.max(1));
            tokio::spawn(async move {
                service::run_sync_loop(loop_state, interval).await;
            });

            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            tracing::info!(address = %addr, "Starting health server");

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, service::router(state)).await?;
        }

        Commands::Sync => {
            tracing::info!(staging_uri = %config.sync.staging_uri, "Starting single synchronization pass");

            let report = synchronizer.run().await;
            service::log_report(&report);

            if !report.is_success() {
                bail!(
                    "synchronization incomplete: {} chunk(s) failed{}",
                    report.chunks_failed(),
                    report
                        .listing_error
                        .as_deref()
                        .map(|e| format!(", listing failed: {e}"))
                        .unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}
