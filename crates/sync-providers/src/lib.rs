//! Concrete, swappable implementations of the `sync-core` traits: sqlx-backed
//! ledger and filter-index stores, and a reqwest-based reference
//! `NodeAdapter`. None of this is required by the core. It exists so
//! `sync-service` has something real to wire up.

pub mod http_adapter;
pub mod sqlx_filter_index;
pub mod sqlx_ledger;

pub use http_adapter::HttpCatalogAdapter;
pub use sqlx_filter_index::SqlxFilterIndexStore;
pub use sqlx_ledger::SqlxReplicationLedger;
