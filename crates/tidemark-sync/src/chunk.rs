//! Chunk lifecycle and run reports.

use std::fmt;
use std::time::Duration;

use crate::bulk::BulkStats;

/// Lifecycle stage of a producer chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChunkStage {
    /// Files assigned to the chunk.
    Loaded,
    /// Files read and decoded.
    Parsed,
    /// Events merged per path.
    Merged,
    /// Folder events expanded.
    Expanded,
    /// Index operations decided.
    Reconciled,
    /// Index operations written.
    Flushed,
    /// Source files deleted.
    Cleaned,
}

impl fmt::Display for ChunkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loaded => "loaded",
            Self::Parsed => "parsed",
            Self::Merged => "merged",
            Self::Expanded => "expanded",
            Self::Reconciled => "reconciled",
            Self::Flushed => "flushed",
            Self::Cleaned => "cleaned",
        };
        f.write_str(name)
    }
}

/// Final state of a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Mutations flushed and source files deleted.
    Cleaned,
    /// Processing stopped; source files are left for the next run.
    Failed {
        /// Last stage completed before the failure.
        stage: ChunkStage,
        /// Error message.
        error: String,
    },
}

/// Report of one producer chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReport {
    /// Position of the chunk within its producer.
    pub chunk: usize,
    /// Raw event files in the chunk.
    pub files: usize,
    /// Last stage completed.
    pub stage: ChunkStage,
    /// Events decoded.
    pub events_parsed: usize,
    /// Malformed lines dropped.
    pub malformed_lines: usize,
    /// Files that could not be read.
    pub unreadable_files: usize,
    /// Net events after merging and expansion.
    pub net_events: usize,
    /// Bulk counters.
    pub bulk: BulkStats,
    /// Source files deleted.
    pub files_deleted: usize,
    /// Outcome, `None` while running.
    pub outcome: Option<ChunkOutcome>,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl ChunkReport {
    /// Starts a report for a chunk of `files` files.
    #[must_use]
    pub fn new(chunk: usize, files: usize) -> Self {
        Self {
            chunk,
            files,
            stage: ChunkStage::Loaded,
            events_parsed: 0,
            malformed_lines: 0,
            unreadable_files: 0,
            net_events: 0,
            bulk: BulkStats::default(),
            files_deleted: 0,
            outcome: None,
            duration: Duration::ZERO,
        }
    }

    /// Records that `stage` completed.
    pub fn advance(&mut self, stage: ChunkStage) {
        self.stage = self.stage.max(stage);
    }

    /// True if the chunk was cleaned.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, Some(ChunkOutcome::Cleaned))
    }
}

/// Report of one producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerReport {
    /// Producer id.
    pub producer: String,
    /// Chunk reports in processing order.
    pub chunks: Vec<ChunkReport>,
}

impl ProducerReport {
    /// Number of failed chunks.
    #[must_use]
    pub fn failed_chunks(&self) -> usize {
        self.chunks.iter().filter(|chunk| !chunk.succeeded()).count()
    }
}

/// Report of a whole synchronization run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Producer reports, ordered by producer id.
    pub producers: Vec<ProducerReport>,
    /// Error that prevented any producer from running.
    pub listing_error: Option<String>,
}

impl SyncReport {
    /// Report of a run that could not list its producers.
    #[must_use]
    pub fn listing_failed(error: impl Into<String>) -> Self {
        Self {
            producers: Vec::new(),
            listing_error: Some(error.into()),
        }
    }

    /// Chunks that were cleaned.
    #[must_use]
    pub fn chunks_succeeded(&self) -> usize {
        self.chunks().filter(|chunk| chunk.succeeded()).count()
    }

    /// Chunks that failed.
    #[must_use]
    pub fn chunks_failed(&self) -> usize {
        self.chunks().filter(|chunk| !chunk.succeeded()).count()
    }

    /// True if the run listed its producers and every chunk was cleaned.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.listing_error.is_none() && self.chunks_failed() == 0
    }

    /// Total bulk operations sent.
    #[must_use]
    pub fn bulk_requests(&self) -> usize {
        self.chunks()
            .map(|chunk| chunk.bulk.index_requests + chunk.bulk.delete_requests)
            .sum()
    }

    /// All chunk reports.
    pub fn chunks(&self) -> impl Iterator<Item = &ChunkReport> {
        self.producers.iter().flat_map(|producer| producer.chunks.iter())
    }
}
