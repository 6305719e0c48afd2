//! # tidemark-agent
//!
//! Runs the Tidemark synchronizer against real collaborators:
//!
//! - **Search index**: Elasticsearch over its REST API
//! - **Pipeline API**: storage catalog, temporary credentials, file tags
//! - **Staging bucket**: S3 through `object_store`
//! - **Mounts**: NFS shares mounted below a local root
//!
//! ## Endpoints (service mode)
//!
//! ```text
//! GET  /health   - Liveness
//! GET  /ready    - Readiness with synchronization health
//! GET  /metrics  - Prometheus metrics
//! POST /sync     - Trigger a cycle
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod elasticsearch;
pub mod metrics;
pub mod pipeline_api;
pub mod service;

use std::sync::Arc;

use tidemark_core::ObjectStoreGateway;
use tidemark_sync::{LocalMountGateway, SyncGateways};

use crate::config::AgentConfig;
use crate::elasticsearch::ElasticsearchClient;
use crate::pipeline_api::PipelineApiClient;

/// Wires the production gateways described by `config`.
#[must_use]
pub fn build_gateways(config: &AgentConfig) -> SyncGateways {
    let api = Arc::new(PipelineApiClient::new(
        config.api_url.clone(),
        config.api_token.clone(),
        config.request_timeout(),
    ));

    let mut object_storage = ObjectStoreGateway::new();
    if let Some(endpoint) = &config.s3_endpoint {
        object_storage = object_storage.with_endpoint(endpoint.clone());
    }
    if let Some(region) = &config.s3_region {
        object_storage = object_storage.with_default_region(region.clone());
    }

    SyncGateways {
        object_storage: Arc::new(object_storage),
        search_index: Arc::new(ElasticsearchClient::new(
            config.elasticsearch_url.clone(),
            config.request_timeout(),
        )),
        mounts: Arc::new(LocalMountGateway::new(config.mount_root.clone())),
        credentials: api.clone(),
        tags: api.clone(),
        catalog: api,
    }
}
