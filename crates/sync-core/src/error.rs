use thiserror::Error;

/// Errors raised by a [`NodeAdapter`](crate::adapter::NodeAdapter) operation.
///
/// The Job's failure classifier catches these and, together with
/// `is_available()` on both adapters, decides whether a transfer attempt is
/// recorded as `FAILURE` or `CONNECTION_LOST`.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("transport error talking to '{adapter}': {message}")]
    Transport { adapter: String, message: String },

    #[error("adapter '{adapter}' rejected the request: {message}")]
    Rejected { adapter: String, message: String },

    #[error("resource for metadata '{metadata_id}' could not be read: {message}")]
    ResourceUnreadable {
        metadata_id: String,
        message: String,
    },
}

/// Errors surfaced by the ledger and filter index stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("filter index version {found} is older than the minimum supported version {minimum}")]
    UnsupportedVersion { found: i32, minimum: i32 },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Top-level error for a [`Job`](crate::job::Job) run.
///
/// Only machine-level, non-recoverable failures should ever reach this type
/// and abort the job outright; every adapter-level or persistence-level
/// failure for an individual record is classified, recorded in the ledger,
/// and the job continues to the next record.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("fatal error: {0}")]
    Fatal(String),
}
