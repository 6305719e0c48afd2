//! Shared test utilities for Tidemark integration tests.
//!
//! This crate provides:
//! - [`SyncHarness`]: staging bucket, search index, catalog and mounts wired together
//! - In-memory gateways with failure injection ([`StaticCatalog`],
//!   [`StaticCredentials`], [`MemoryTagStore`], [`MountTable`])
//! - Raw event line helpers
//!
//! # Example
//!
//! ```rust,ignore
//! use tidemark_test_utils::{SyncHarness, event_line};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = SyncHarness::new();
//!     let storage = harness.add_nfs_storage(1, "filer:/data");
//!     harness.write_file(1, "a.txt", b"hello");
//!     harness.stage_events("w1", "0001.log", &[event_line(1, "c", &storage.path, "a.txt")]);
//!     assert!(harness.run().await.is_success());
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod fixtures;
pub mod gateways;

pub use fixtures::*;
pub use gateways::*;
pub use tidemark_sync::MemorySearchIndex;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tidemark_sync=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
