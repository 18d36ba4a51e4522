use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::model::{Filter, FilterIndex};

/// Per-filter watermark store.
#[async_trait]
pub trait FilterIndexManager: Send + Sync {
    /// Returns the existing index for `filter.id`, or constructs a new one
    /// with empty `modified_since`. Never fails for a valid filter.
    async fn get_or_create(&self, filter: &Filter) -> FilterIndex;

    /// Durably persists the current `modified_since`.
    async fn save(&self, index: &FilterIndex);
}

/// In-process filter index store, keyed by filter id.
#[derive(Debug, Default)]
pub struct InMemoryFilterIndexStore {
    indexes: RwLock<HashMap<String, FilterIndex>>,
}

impl InMemoryFilterIndexStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FilterIndexManager for InMemoryFilterIndexStore {
    async fn get_or_create(&self, filter: &Filter) -> FilterIndex {
        if let Some(existing) = self.indexes.read().await.get(&filter.id) {
            return existing.clone();
        }
        let fresh = FilterIndex::empty(filter.id.clone());
        self.indexes
            .write()
            .await
            .entry(filter.id.clone())
            .or_insert_with(|| fresh.clone());
        fresh
    }

    async fn save(&self, index: &FilterIndex) {
        self.indexes
            .write()
            .await
            .insert(index.filter_id.clone(), index.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn get_or_create_returns_empty_index_once() {
        let store = InMemoryFilterIndexStore::new();
        let filter = Filter::new("f1", "Filter One", "type:dataset");

        let first = store.get_or_create(&filter).await;
        assert_eq!(first.modified_since, None);

        let mut advanced = first.clone();
        advanced.modified_since = Some(Utc.timestamp_opt(100, 0).unwrap());
        store.save(&advanced).await;

        let second = store.get_or_create(&filter).await;
        assert_eq!(second.modified_since, Some(Utc.timestamp_opt(100, 0).unwrap()));
    }
}
