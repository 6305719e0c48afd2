//! Error types and result aliases shared by Tidemark crates.
//!
//! Gateway implementations report failures through [`Error`]; the engine
//! classifies them (transient, storage-fatal, producer-fatal) at the call site.

use std::fmt;

/// The result type used by gateway contracts.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to an external collaborator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An object storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A search index request failed.
    #[error("search index error: {message}")]
    SearchIndex {
        /// Description of the index failure.
        message: String,
    },

    /// A request to the pipeline API (catalog, credentials, tags) failed.
    #[error("api error: {message}")]
    Api {
        /// Description of the API failure.
        message: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// The requested resource was not found.
    #[error("not found: {resource_type} with id {id}")]
    ResourceNotFound {
        /// The type of resource that was not found.
        resource_type: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// A path or object was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new search index error.
    #[must_use]
    pub fn search_index(message: impl Into<String>) -> Self {
        Self::SearchIndex {
            message: message.into(),
        }
    }

    /// Creates a new pipeline API error.
    #[must_use]
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Creates a new resource not found error.
    #[must_use]
    pub fn resource_not_found(resource_type: &'static str, id: impl fmt::Display) -> Self {
        Self::ResourceNotFound {
            resource_type,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_keeps_source() {
        let io = std::io::Error::other("connection reset");
        let err = Error::storage_with_source("list failed", io);

        assert_eq!(err.to_string(), "storage error: list failed");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn resource_not_found_formats_id() {
        let err = Error::resource_not_found("storage", 42);
        assert_eq!(err.to_string(), "not found: storage with id 42");
    }
}
