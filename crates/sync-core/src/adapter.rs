use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::error::AdapterError;
use crate::model::Metadata;

/// A request to stream matching records from a source.
///
/// Semantics: records matching `query` that no destination in
/// `exclude_present_at` already holds, plus any record whose id appears in
/// `retry_ids`, restricted to `metadata_modified > modified_after` when set.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query: String,
    pub exclude_present_at: Vec<String>,
    pub retry_ids: Vec<String>,
    pub modified_after: Option<DateTime<Utc>>,
}

/// A streamed binary resource payload.
pub struct ResourceResponse {
    pub content_type: Option<String>,
    pub size: Option<u64>,
    pub body: BoxStream<'static, Result<bytes_compat::Bytes, AdapterError>>,
}

/// Minimal re-export boundary so `sync-core` doesn't need to name `bytes`
/// directly in its public API beyond this module.
pub mod bytes_compat {
    pub use bytes::Bytes;
}

/// Abstraction over a catalog endpoint: source or destination. The core
/// depends only on this surface; wire protocol, auth, and retries are an
/// adapter implementation detail.
///
/// Every operation may block on network I/O and may fail for any transport
/// or remote-side reason; the Job's failure classifier interprets the
/// returned [`AdapterError`] together with `is_available()`.
#[async_trait]
pub trait NodeAdapter: Send + Sync {
    /// Stable identifier used for lineage and log context.
    fn system_name(&self) -> &str;

    /// Cheap liveness probe, used only to classify failures.
    async fn is_available(&self) -> bool;

    /// Requests records matching `request.query`. The returned stream is
    /// consumed once and may be lazy; the core never buffers the whole
    /// change set in memory.
    async fn query(
        &self,
        request: QueryRequest,
    ) -> Result<BoxStream<'static, Result<Metadata, AdapterError>>, AdapterError>;

    /// True iff this node already holds a record with `metadata.id`.
    async fn exists(&self, metadata: &Metadata) -> Result<bool, AdapterError>;

    /// Streams the binary payload referenced by `metadata.resource_uri`.
    async fn read_resource(&self, metadata: &Metadata) -> Result<ResourceResponse, AdapterError>;

    async fn create_request(&self, metadata: &Metadata) -> Result<bool, AdapterError>;
    async fn update_request(&self, metadata: &Metadata) -> Result<bool, AdapterError>;
    async fn delete_request(&self, metadata: &Metadata) -> Result<bool, AdapterError>;

    async fn create_resource(
        &self,
        metadata: &Metadata,
        resource: ResourceResponse,
    ) -> Result<bool, AdapterError>;
    async fn update_resource(
        &self,
        metadata: &Metadata,
        resource: ResourceResponse,
    ) -> Result<bool, AdapterError>;
}
