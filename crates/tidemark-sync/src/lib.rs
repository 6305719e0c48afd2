//! # tidemark-sync
//!
//! Change-event synchronization engine.
//!
//! Filesystem watchers drop raw change-log files into an object-storage
//! staging area. This crate turns them into search index state:
//!
//! - **Loading**: list staging files, group them by producer, chunk them
//! - **Parsing**: decode `timestamp,type,storage,path[,toPath]` lines
//! - **Merging**: collapse each path's history to one net event
//! - **Expansion**: turn folder deletes and moves into per-file events
//! - **Reconciliation**: create, update or delete documents from live mounts
//! - **Bulk emission**: batch index writes, then delete consumed files
//!
//! Delivery is at-least-once. A chunk's source files are deleted only after
//! its index mutations are flushed, and reconciliation against the live
//! filesystem makes replays idempotent.
//!
//! ## Example
//!
//! ```rust
//! use tidemark_sync::merge::merge_events;
//! use tidemark_sync::parser::parse_content;
//!
//! let parsed = parse_content("1,c,filer:/data,a.txt\n2,d,filer:/data,a.txt\n3,m,filer:/data,b.txt\n");
//! let net = merge_events(parsed.events);
//! assert_eq!(net.len(), 1);
//! assert_eq!(net[0].path, "b.txt");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bulk;
pub mod chunk;
pub mod config;
pub mod error;
pub mod event;
pub mod expand;
pub mod index;
pub mod loader;
pub mod merge;
pub mod metrics;
pub mod mount;
pub mod parser;
pub mod permissions;
pub mod provision;
pub mod reconcile;
pub mod synchronizer;
pub mod tags;

pub use chunk::{ChunkOutcome, ChunkReport, ChunkStage, ProducerReport, SyncReport};
pub use config::{StagingLocation, SyncConfig};
pub use error::{Result, SyncError};
pub use event::{EventRecord, EventType};
pub use index::{MemorySearchIndex, SearchIndexGateway};
pub use mount::{FilesystemMountGateway, LocalMountGateway};
pub use synchronizer::{SyncGateways, Synchronizer};
pub use tags::{MetadataTagGateway, Tags};
