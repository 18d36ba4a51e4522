//! Core replication engine: the record model, the `NodeAdapter` contract,
//! the replication-item ledger, the per-filter watermark store, observer
//! fan-out, and the `Job` that drives one filter from source to
//! destination.
//!
//! Transport, persistence backends, and process wiring live in
//! `sync-providers` and `sync-service`; this crate only depends on
//! `tokio`/`async-trait`/`tracing` and has no knowledge of HTTP or SQL.

pub mod adapter;
pub mod error;
pub mod filter_index;
pub mod job;
pub mod ledger;
pub mod model;
pub mod observer;

pub use adapter::{NodeAdapter, QueryRequest, ResourceResponse};
pub use error::{AdapterError, StoreError, SyncError};
pub use filter_index::{FilterIndexManager, InMemoryFilterIndexStore};
pub use job::{Job, JobSummary};
pub use ledger::{InMemoryReplicationLedger, ReplicationItemManager};
pub use model::{
    Action, Filter, FilterIndex, Metadata, ReplicationItem, Status, CURRENT_FILTER_INDEX_VERSION,
    MINIMUM_FILTER_INDEX_VERSION, REPLICATED_TAG,
};
pub use observer::{LoggingObserver, MetricsObserver, Observer, ObserverRegistry};
