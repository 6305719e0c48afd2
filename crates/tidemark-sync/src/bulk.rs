//! Buffered bulk writes.
//!
//! Usage follows an acquire / body / close shape:
//!
//! ```text
//! let mut emitter = BulkRequestEmitter::new(index, size);   // acquire
//! let outcome = body(&mut emitter).await;                   // body
//! let value = emitter.close(outcome).await?;                 // always flushes
//! ```
//!
//! An emitter dropped with buffered requests (for example when the chunk
//! future is cancelled) logs a warning; those requests are never sent.

use crate::error::{Result, SyncError};
use crate::index::{BulkOperation, SearchIndexGateway};
use crate::metrics;

/// Counters of one emitter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkStats {
    /// Index operations sent.
    pub index_requests: usize,
    /// Delete operations sent.
    pub delete_requests: usize,
    /// Bulk calls made.
    pub flushes: usize,
    /// Operations rejected individually by the index.
    pub item_failures: usize,
}

/// Buffers index and delete operations and writes them in batches.
pub struct BulkRequestEmitter<'a> {
    index: &'a dyn SearchIndexGateway,
    max_batch: usize,
    buffer: Vec<BulkOperation>,
    stats: BulkStats,
}

impl std::fmt::Debug for BulkRequestEmitter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkRequestEmitter")
            .field("max_batch", &self.max_batch)
            .field("pending", &self.buffer.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<'a> BulkRequestEmitter<'a> {
    /// Creates an emitter flushing every `max_batch` operations.
    #[must_use]
    pub fn new(index: &'a dyn SearchIndexGateway, max_batch: usize) -> Self {
        let max_batch = max_batch.max(1);
        Self {
            index,
            max_batch,
            buffer: Vec::with_capacity(max_batch),
            stats: BulkStats::default(),
        }
    }

    /// Buffers an operation, flushing when the buffer is full.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::BulkWrite` if the triggered flush fails.
    pub async fn add(&mut self, operation: BulkOperation) -> Result<()> {
        self.buffer.push(operation);
        if self.buffer.len() >= self.max_batch {
            self.flush().await?;
        }
        Ok(())
    }

    /// Number of buffered operations.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> BulkStats {
        self.stats
    }

    /// Sends all buffered operations.
    ///
    /// Item-level rejections are logged and counted; only transport
    /// failures are errors.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::BulkWrite` if the bulk call fails.
    pub async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        let operations = batch.len();
        let index_requests = batch.iter().filter(|op| op.is_index()).count();
        let delete_requests = operations - index_requests;

        let response = self
            .index
            .bulk_write(batch)
            .await
            .map_err(|source| SyncError::BulkWrite { operations, source })?;

        self.stats.flushes += 1;
        self.stats.index_requests += index_requests;
        self.stats.delete_requests += delete_requests;
        self.stats.item_failures += response.failures.len();
        metrics::record_bulk(index_requests as u64, delete_requests as u64);

        for failure in &response.failures {
            tracing::warn!(
                index = %failure.index,
                id = ?failure.id,
                reason = %failure.reason,
                "bulk item rejected"
            );
        }
        tracing::debug!(
            operations,
            rejected = response.failures.len(),
            "flushed bulk requests"
        );
        Ok(())
    }

    /// Flushes remaining operations and ends the emitter.
    ///
    /// The flush happens whatever `outcome` is. An error in `outcome` takes
    /// precedence over a flush error.
    ///
    /// # Errors
    ///
    /// Returns the error of `outcome`, or `SyncError::BulkWrite` if the
    /// final flush fails.
    pub async fn close<T>(mut self, outcome: Result<T>) -> Result<(T, BulkStats)> {
        let flushed = self.flush().await;
        let value = match (outcome, flushed) {
            (Err(error), flushed) => {
                if let Err(flush_error) = flushed {
                    tracing::warn!(error = %flush_error, "final flush failed after chunk error");
                }
                return Err(error);
            }
            (Ok(_), Err(flush_error)) => return Err(flush_error),
            (Ok(value), Ok(())) => value,
        };
        Ok((value, self.stats))
    }
}

impl Drop for BulkRequestEmitter<'_> {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            tracing::warn!(
                pending = self.buffer.len(),
                "bulk emitter dropped with unflushed requests"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemorySearchIndex;
    use serde_json::json;

    fn index_op(path: &str) -> BulkOperation {
        BulkOperation::Index {
            index: "idx".into(),
            id: None,
            document: json!({ "id": path, "storage_id": 1 }),
        }
    }

    #[tokio::test]
    async fn flushes_when_full_and_on_close() {
        let index = MemorySearchIndex::new();
        let mut emitter = BulkRequestEmitter::new(&index, 2);
        for path in ["a", "b", "c"] {
            emitter.add(index_op(path)).await.unwrap();
        }
        assert_eq!(index.bulk_batches().len(), 1);
        assert_eq!(emitter.pending(), 1);

        let ((), stats) = emitter.close(Ok(())).await.unwrap();
        assert_eq!(index.bulk_batches().len(), 2);
        assert_eq!(stats.index_requests, 3);
        assert_eq!(stats.flushes, 2);
    }

    #[tokio::test]
    async fn close_flushes_even_when_body_failed() {
        let index = MemorySearchIndex::new();
        let mut emitter = BulkRequestEmitter::new(&index, 10);
        emitter
            .add(BulkOperation::Delete {
                index: "idx".into(),
                id: "1".into(),
            })
            .await
            .unwrap();

        let err = emitter
            .close::<()>(Err(SyncError::invalid_config("body failed")))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig { .. }));
        assert_eq!(index.bulk_batches().len(), 1);
    }

    #[tokio::test]
    async fn transport_failure_fails_close() {
        let index = MemorySearchIndex::new();
        index.fail_bulk_writes(true);
        let mut emitter = BulkRequestEmitter::new(&index, 10);
        emitter.add(index_op("a")).await.unwrap();

        let err = emitter.close(Ok(())).await.unwrap_err();
        assert!(matches!(err, SyncError::BulkWrite { operations: 1, .. }));
    }

    #[tokio::test]
    async fn item_failures_are_counted_not_fatal() {
        let index = MemorySearchIndex::new();
        index.reject_path("bad");
        let mut emitter = BulkRequestEmitter::new(&index, 10);
        emitter.add(index_op("bad")).await.unwrap();
        emitter.add(index_op("good")).await.unwrap();

        let ((), stats) = emitter.close(Ok(())).await.unwrap();
        assert_eq!(stats.item_failures, 1);
        assert_eq!(index.paths(1), vec!["good"]);
    }

    #[tokio::test]
    async fn empty_close_sends_nothing() {
        let index = MemorySearchIndex::new();
        let emitter = BulkRequestEmitter::new(&index, 10);
        let (value, stats) = emitter.close(Ok(5)).await.unwrap();
        assert_eq!(value, 5);
        assert_eq!(stats, BulkStats::default());
        assert!(index.bulk_batches().is_empty());
    }
}
