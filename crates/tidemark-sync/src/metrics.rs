//! Synchronizer metrics.
//!
//! Recorded through the `metrics` facade; the agent installs the Prometheus
//! recorder and exposes them at `/metrics`. Without a recorder every call is
//! a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram};

// ============================================================================
// Metric Names
// ============================================================================

/// Chunks processed, labelled by `outcome` (`cleaned` or `failed`).
pub const SYNC_CHUNKS_TOTAL: &str = "sync_chunks_total";

/// Event records parsed from raw event files.
pub const SYNC_EVENTS_PARSED_TOTAL: &str = "sync_events_parsed_total";

/// Raw event lines dropped as malformed.
pub const SYNC_MALFORMED_LINES_TOTAL: &str = "sync_malformed_lines_total";

/// Bulk operations sent to the search index, labelled by `op`.
pub const SYNC_BULK_REQUESTS_TOTAL: &str = "sync_bulk_requests_total";

/// Wall-clock duration of one chunk.
pub const SYNC_CHUNK_DURATION: &str = "sync_chunk_duration_seconds";

// ============================================================================
// Metric Registration
// ============================================================================

/// Registers all synchronizer metric descriptions.
///
/// Call this once at application startup after initializing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(SYNC_CHUNKS_TOTAL, "Total producer chunks processed");
    describe_counter!(SYNC_EVENTS_PARSED_TOTAL, "Total event records parsed");
    describe_counter!(
        SYNC_MALFORMED_LINES_TOTAL,
        "Total raw event lines dropped as malformed"
    );
    describe_counter!(
        SYNC_BULK_REQUESTS_TOTAL,
        "Total bulk operations sent to the search index"
    );
    describe_histogram!(SYNC_CHUNK_DURATION, "Duration of producer chunks in seconds");
}

// ============================================================================
// Metric Recording
// ============================================================================

/// Records the outcome and duration of a chunk.
pub fn record_chunk(outcome: &'static str, duration_secs: f64) {
    counter!(SYNC_CHUNKS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(SYNC_CHUNK_DURATION, "outcome" => outcome).record(duration_secs);
}

/// Records parsing results for one raw event file.
pub fn record_parsed(events: u64, malformed: u64) {
    counter!(SYNC_EVENTS_PARSED_TOTAL).increment(events);
    if malformed > 0 {
        counter!(SYNC_MALFORMED_LINES_TOTAL).increment(malformed);
    }
}

/// Records bulk operations sent in one flush.
pub fn record_bulk(index_requests: u64, delete_requests: u64) {
    counter!(SYNC_BULK_REQUESTS_TOTAL, "op" => "index").increment(index_requests);
    counter!(SYNC_BULK_REQUESTS_TOTAL, "op" => "delete").increment(delete_requests);
}
