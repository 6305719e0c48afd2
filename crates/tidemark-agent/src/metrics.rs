//! Agent metrics and the Prometheus exporter.
//!
//! Engine metrics are described by `tidemark_sync::metrics::register_metrics`;
//! this module adds the per-cycle metrics of the service loop.

use std::sync::OnceLock;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// ============================================================================
// Metric Names
// ============================================================================

/// Synchronization cycles, labelled by `outcome` (`success`, `partial`, `failed`).
pub const SYNC_CYCLES_TOTAL: &str = "sync_cycles_total";

/// Unix timestamp of the last cycle without failed chunks.
pub const SYNC_LAST_SUCCESS_TIMESTAMP: &str = "sync_last_success_timestamp_seconds";

// ============================================================================
// Prometheus Recorder
// ============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initializes the global metrics recorder with Prometheus exporter.
///
/// Safe to call multiple times; subsequent calls are no-ops.
///
/// # Panics
///
/// Panics if the Prometheus recorder cannot be installed. The service should
/// not start without metrics.
#[allow(clippy::panic)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .unwrap_or_else(|e| panic!("failed to install prometheus recorder: {e}"));

            describe_counter!(SYNC_CYCLES_TOTAL, "Total synchronization cycles");
            describe_gauge!(
                SYNC_LAST_SUCCESS_TIMESTAMP,
                "Unix timestamp of the last fully successful synchronization cycle"
            );
            tidemark_sync::metrics::register_metrics();

            tracing::info!("Prometheus metrics recorder initialized for agent");
            handle
        })
        .clone()
}

/// Returns the global Prometheus handle, if initialized.
#[must_use]
pub fn prometheus_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// ============================================================================
// Metrics Endpoint
// ============================================================================

/// Handler for the `/metrics` endpoint.
pub async fn serve_metrics() -> impl IntoResponse {
    match prometheus_handle() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain; charset=utf-8")],
            "Metrics not initialized".to_string(),
        ),
    }
}

// ============================================================================
// Metric Recording
// ============================================================================

/// Records the outcome of a synchronization cycle.
pub fn record_cycle(outcome: &'static str) {
    counter!(SYNC_CYCLES_TOTAL, "outcome" => outcome).increment(1);
}

/// Records the time of a fully successful cycle.
#[allow(clippy::cast_precision_loss)]
pub fn set_last_success(timestamp: i64) {
    gauge!(SYNC_LAST_SUCCESS_TIMESTAMP).set(timestamp as f64);
}
