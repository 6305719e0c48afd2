//! Service mode: periodic synchronization loop with HTTP endpoints.
//!
//! - `GET /health` - Shallow liveness check (always 200)
//! - `GET /ready` - Readiness with synchronization health
//! - `GET /metrics` - Prometheus metrics
//! - `POST /sync` - Trigger a cycle on demand

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use tidemark_sync::{SyncReport, Synchronizer};

use crate::metrics;

// ============================================================================
// Health State
// ============================================================================

/// Shared state tracking synchronization health.
#[derive(Debug)]
pub struct AgentState {
    ready: AtomicBool,
    last_successful_cycle_ts: AtomicU64,
    successful_cycles: AtomicU64,
    failed_cycles: AtomicU64,
    failed_chunks: AtomicU64,
    cycle_in_progress: AtomicBool,
    /// Serializes cycles so they never overlap.
    cycle_lock: Arc<Mutex<()>>,
    unhealthy_threshold_secs: u64,
}

impl AgentState {
    /// Creates state that turns unhealthy after `unhealthy_threshold_secs`
    /// without a completed cycle.
    #[must_use]
    pub fn new(unhealthy_threshold_secs: u64) -> Self {
        Self {
            ready: AtomicBool::new(false),
            last_successful_cycle_ts: AtomicU64::new(0),
            successful_cycles: AtomicU64::new(0),
            failed_cycles: AtomicU64::new(0),
            failed_chunks: AtomicU64::new(0),
            cycle_in_progress: AtomicBool::new(false),
            cycle_lock: Arc::new(Mutex::new(())),
            unhealthy_threshold_secs,
        }
    }

    fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Records a finished cycle.
    ///
    /// A cycle counts as successful once it listed its producers; failed
    /// chunks are retried by the next cycle and only tracked.
    pub fn record(&self, report: &SyncReport) {
        let failed_chunks = u64::try_from(report.chunks_failed()).unwrap_or(u64::MAX);
        self.failed_chunks.fetch_add(failed_chunks, Ordering::Relaxed);

        if report.listing_error.is_some() {
            self.failed_cycles.fetch_add(1, Ordering::Relaxed);
            metrics::record_cycle("failed");
            return;
        }

        let now = Utc::now().timestamp();
        self.last_successful_cycle_ts
            .store(u64::try_from(now).unwrap_or_default(), Ordering::Release);
        self.successful_cycles.fetch_add(1, Ordering::Relaxed);
        if report.is_success() {
            metrics::record_cycle("success");
            metrics::set_last_success(now);
        } else {
            metrics::record_cycle("partial");
        }
    }

    /// True if ready and a cycle succeeded within the threshold.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        if !self.ready.load(Ordering::Acquire) {
            return false;
        }
        let last = self.last_successful_cycle_ts.load(Ordering::Acquire);
        if last == 0 {
            return false;
        }
        let now: u64 = Utc::now().timestamp().try_into().unwrap_or_default();
        now.saturating_sub(last) < self.unhealthy_threshold_secs
    }

    fn last_successful_cycle(&self) -> Option<DateTime<Utc>> {
        let ts = self.last_successful_cycle_ts.load(Ordering::Acquire);
        if ts == 0 {
            return None;
        }
        DateTime::from_timestamp(i64::try_from(ts).ok()?, 0)
    }
}

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct ServiceState {
    /// Health tracking.
    pub agent: Arc<AgentState>,
    /// The synchronizer run by every cycle.
    pub synchronizer: Arc<Synchronizer>,
}

// ============================================================================
// Endpoints
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    ready: bool,
    healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_successful_cycle: Option<String>,
    successful_cycles: u64,
    failed_cycles: u64,
    failed_chunks: u64,
    cycle_in_progress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /ready
async fn ready(State(state): State<ServiceState>) -> impl IntoResponse {
    let agent = &state.agent;
    let ready = agent.ready.load(Ordering::Acquire);
    let healthy = agent.is_healthy();
    let successful_cycles = agent.successful_cycles.load(Ordering::Relaxed);

    let message = if !ready {
        Some("Service starting up".to_string())
    } else if successful_cycles == 0 {
        Some("Waiting for first successful synchronization".to_string())
    } else if !healthy {
        Some(format!(
            "No successful synchronization in {} seconds",
            agent.unhealthy_threshold_secs
        ))
    } else {
        None
    };

    let status = if ready && healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            ready,
            healthy,
            last_successful_cycle: agent.last_successful_cycle().map(|dt| dt.to_rfc3339()),
            successful_cycles,
            failed_cycles: agent.failed_cycles.load(Ordering::Relaxed),
            failed_chunks: agent.failed_chunks.load(Ordering::Relaxed),
            cycle_in_progress: agent.cycle_in_progress.load(Ordering::Acquire),
            message,
        }),
    )
}

/// POST /sync - `202 Accepted` if a cycle was started, `409 Conflict` if one is running.
async fn trigger_sync(State(state): State<ServiceState>) -> impl IntoResponse {
    let Ok(guard) = Arc::clone(&state.agent.cycle_lock).try_lock_owned() else {
        return (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "status": "already_running",
                "message": "Synchronization is already in progress"
            })),
        );
    };

    tokio::spawn(async move {
        let _guard = guard;
        run_cycle(&state).await;
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "status": "started",
            "message": "Synchronization triggered"
        })),
    )
}

/// Builds the HTTP router.
pub fn router(state: ServiceState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics::serve_metrics))
        .route("/sync", post(trigger_sync))
        .with_state(state)
}

// ============================================================================
// Synchronization Loop
// ============================================================================

/// Runs a cycle immediately, then one every `interval`.
pub async fn run_sync_loop(state: ServiceState, interval: Duration) {
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // The first tick completes immediately.
    timer.tick().await;
    state.agent.mark_ready();
    tracing::info!("Agent ready, starting synchronization loop");

    loop {
        run_cycle_guarded(&state).await;
        timer.tick().await;
    }
}

/// Runs one cycle while holding the cycle lock.
pub async fn run_cycle_guarded(state: &ServiceState) -> SyncReport {
    let _guard = state.agent.cycle_lock.lock().await;
    run_cycle(state).await
}

/// Runs one cycle; the caller holds the cycle lock.
async fn run_cycle(state: &ServiceState) -> SyncReport {
    state.agent.cycle_in_progress.store(true, Ordering::Release);

    tracing::info!("Starting synchronization cycle");
    let report = state.synchronizer.run().await;
    log_report(&report);
    state.agent.record(&report);

    state.agent.cycle_in_progress.store(false, Ordering::Release);
    report
}

/// Logs the summary of a run.
pub fn log_report(report: &SyncReport) {
    if let Some(error) = &report.listing_error {
        tracing::error!(error = %error, "Synchronization cycle could not list producers");
        return;
    }
    for producer in &report.producers {
        for chunk in &producer.chunks {
            if let Some(tidemark_sync::ChunkOutcome::Failed { stage, error }) = &chunk.outcome {
                tracing::warn!(
                    producer = %producer.producer,
                    chunk = chunk.chunk,
                    stage = %stage,
                    error = %error,
                    "Chunk failed; source files retained"
                );
            }
        }
    }
    tracing::info!(
        producers = report.producers.len(),
        chunks_succeeded = report.chunks_succeeded(),
        chunks_failed = report.chunks_failed(),
        bulk_requests = report.bulk_requests(),
        "Synchronization cycle finished"
    );
}
