//! # tidemark-core
//!
//! Shared primitives for the Tidemark change-event synchronizer.
//!
//! - **Storage**: object storage gateway for the raw event staging area
//! - **Catalog**: storage descriptors and ACL entries
//! - **Credentials**: single-purpose temporary credentials
//! - **Error Types**: shared error definitions and result types
//! - **Observability**: logging initialization and span helpers
//!
//! ## Example
//!
//! ```rust
//! use tidemark_core::prelude::*;
//!
//! let store = MemoryObjectStore::new();
//! store.put("events", "nfs/watcher-01/0001.log", "1,c,fs,a.txt").unwrap();
//! assert!(store.contains("events", "nfs/watcher-01/0001.log"));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod credentials;
pub mod error;
pub mod object_store_backend;
pub mod observability;
pub mod storage;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::catalog::{AclEntry, StorageCatalog, StorageDescriptor, StorageKind};
    pub use crate::credentials::{AccessScope, CredentialGateway, TemporaryCredentials};
    pub use crate::error::{Error, Result};
    pub use crate::storage::{MemoryObjectStore, ObjectMeta, ObjectStorageGateway};
}

pub use catalog::{AclEntry, StorageCatalog, StorageDescriptor, StorageKind};
pub use credentials::{AccessScope, CredentialGateway, TemporaryCredentials};
pub use error::{Error, Result};
pub use object_store_backend::ObjectStoreGateway;
pub use observability::{LogFormat, init_logging};
pub use storage::{MemoryObjectStore, ObjectMeta, ObjectStorageGateway};
