use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::RwLock;

use crate::model::ReplicationItem;

/// Durable history of per-(filter, record) transfer attempts.
///
/// Append-only from the Job's point of view: any compaction is an
/// implementation detail invisible to this contract, provided `get_latest`
/// and `get_failure_list` stay correct. Lookup failures (storage errors)
/// surface as `None`/empty, never as an `Err`, so the Job can treat "unknown
/// history" uniformly.
#[async_trait]
pub trait ReplicationItemManager: Send + Sync {
    async fn get_latest(&self, filter_id: &str, metadata_id: &str) -> Option<ReplicationItem>;

    /// Ids whose *latest* entry for this filter has a status other than
    /// `SUCCESS`. Order is irrelevant; duplicates are forbidden.
    async fn get_failure_list(&self, filter_id: &str) -> Vec<String>;

    /// Appends a new entry. Must be durable before returning.
    async fn save(&self, item: ReplicationItem);

    /// Paged listing for operator UIs.
    async fn get_all_for_filter(
        &self,
        filter_id: &str,
        start_index: usize,
        page_size: usize,
    ) -> Vec<ReplicationItem>;

    /// Purges every entry for a filter. Used when a filter is deleted.
    async fn remove_all_for_filter(&self, filter_id: &str);
}

/// In-process ledger backed by a `Vec` behind an `RwLock`. Used by tests and
/// by `sync-service` when no database URL is configured.
#[derive(Debug, Default)]
pub struct InMemoryReplicationLedger {
    entries: RwLock<Vec<ReplicationItem>>,
}

impl InMemoryReplicationLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReplicationItemManager for InMemoryReplicationLedger {
    async fn get_latest(&self, filter_id: &str, metadata_id: &str) -> Option<ReplicationItem> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.filter_id == filter_id && e.metadata_id == metadata_id)
            .max_by_key(|e| e.done_time)
            .cloned()
    }

    async fn get_failure_list(&self, filter_id: &str) -> Vec<String> {
        let entries = self.entries.read().await;
        let mut latest_by_id: std::collections::HashMap<&str, &ReplicationItem> =
            std::collections::HashMap::new();
        for entry in entries.iter().filter(|e| e.filter_id == filter_id) {
            latest_by_id
                .entry(entry.metadata_id.as_str())
                .and_modify(|current| {
                    if entry.done_time > current.done_time {
                        *current = entry;
                    }
                })
                .or_insert(entry);
        }

        let mut seen = HashSet::new();
        latest_by_id
            .values()
            .filter(|e| !e.status.is_success())
            .filter_map(|e| {
                if seen.insert(e.metadata_id.clone()) {
                    Some(e.metadata_id.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    async fn save(&self, item: ReplicationItem) {
        self.entries.write().await.push(item);
    }

    async fn get_all_for_filter(
        &self,
        filter_id: &str,
        start_index: usize,
        page_size: usize,
    ) -> Vec<ReplicationItem> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.filter_id == filter_id)
            .skip(start_index)
            .take(page_size)
            .cloned()
            .collect()
    }

    async fn remove_all_for_filter(&self, filter_id: &str) {
        self.entries.write().await.retain(|e| e.filter_id != filter_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Status};
    use chrono::{TimeZone, Utc};

    fn item(filter: &str, id: &str, done_secs: i64, status: Status) -> ReplicationItem {
        let ts = Utc.timestamp_opt(done_secs, 0).unwrap();
        ReplicationItem {
            metadata_id: id.to_string(),
            filter_id: filter.to_string(),
            source_name: "src".to_string(),
            destination_name: "dst".to_string(),
            action: Action::Create,
            status,
            start_time: ts,
            done_time: ts,
            metadata_modified: ts,
            resource_modified: None,
            metadata_size: None,
            resource_size: None,
        }
    }

    #[tokio::test]
    async fn get_latest_picks_max_done_time() {
        let ledger = InMemoryReplicationLedger::new();
        ledger.save(item("f1", "r1", 100, Status::Failure)).await;
        ledger.save(item("f1", "r1", 200, Status::Success)).await;
        ledger.save(item("f1", "r1", 150, Status::Failure)).await;

        let latest = ledger.get_latest("f1", "r1").await.unwrap();
        assert_eq!(latest.status, Status::Success);
        assert_eq!(latest.done_time, Utc.timestamp_opt(200, 0).unwrap());
    }

    #[tokio::test]
    async fn failure_list_excludes_records_whose_latest_is_success() {
        let ledger = InMemoryReplicationLedger::new();
        ledger.save(item("f1", "r1", 100, Status::Failure)).await;
        ledger.save(item("f1", "r1", 200, Status::Success)).await;
        ledger.save(item("f1", "r2", 100, Status::ConnectionLost)).await;

        let mut failures = ledger.get_failure_list("f1").await;
        failures.sort();
        assert_eq!(failures, vec!["r2".to_string()]);
    }

    #[tokio::test]
    async fn remove_all_for_filter_is_scoped() {
        let ledger = InMemoryReplicationLedger::new();
        ledger.save(item("f1", "r1", 100, Status::Success)).await;
        ledger.save(item("f2", "r1", 100, Status::Success)).await;

        ledger.remove_all_for_filter("f1").await;
        assert!(ledger.get_latest("f1", "r1").await.is_none());
        assert!(ledger.get_latest("f2", "r1").await.is_some());
    }
}
