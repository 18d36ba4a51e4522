//! Integration tests for the six literal scenarios from the base
//! specification's testable-properties section, run against an in-memory
//! `NodeAdapter` fake and the real `Job`, ledger, and filter index
//! implementations.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::{self, BoxStream, StreamExt};

use sync_core::{
    AdapterError, Filter, FilterIndexManager, InMemoryFilterIndexStore, InMemoryReplicationLedger,
    Job, Metadata, NodeAdapter, ObserverRegistry, QueryRequest, ReplicationItemManager,
    ResourceResponse, Status,
};

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// Fixed set of records a fake source hands back, independent of the
/// `QueryRequest` it receives. These tests assert on the Job's behavior
/// given a record, not on query-string filtering.
#[derive(Default)]
struct FakeSource {
    records: Vec<Metadata>,
}

#[async_trait]
impl NodeAdapter for FakeSource {
    fn system_name(&self) -> &str {
        "fake-source"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn query(
        &self,
        _request: QueryRequest,
    ) -> Result<BoxStream<'static, Result<Metadata, AdapterError>>, AdapterError> {
        let items: Vec<Result<Metadata, AdapterError>> =
            self.records.clone().into_iter().map(Ok).collect();
        Ok(stream::iter(items).boxed())
    }

    async fn exists(&self, _metadata: &Metadata) -> Result<bool, AdapterError> {
        Ok(false)
    }

    async fn read_resource(&self, metadata: &Metadata) -> Result<ResourceResponse, AdapterError> {
        Ok(ResourceResponse {
            content_type: Some("application/octet-stream".to_string()),
            size: metadata.resource_size,
            body: stream::empty().boxed(),
        })
    }

    async fn create_request(&self, _metadata: &Metadata) -> Result<bool, AdapterError> {
        unreachable!("source is never the CREATE/UPDATE/DELETE target")
    }
    async fn update_request(&self, _metadata: &Metadata) -> Result<bool, AdapterError> {
        unreachable!("source is never the CREATE/UPDATE/DELETE target")
    }
    async fn delete_request(&self, _metadata: &Metadata) -> Result<bool, AdapterError> {
        unreachable!("source is never the CREATE/UPDATE/DELETE target")
    }
    async fn create_resource(
        &self,
        _metadata: &Metadata,
        _resource: ResourceResponse,
    ) -> Result<bool, AdapterError> {
        unreachable!("source is never the CREATE/UPDATE/DELETE target")
    }
    async fn update_resource(
        &self,
        _metadata: &Metadata,
        _resource: ResourceResponse,
    ) -> Result<bool, AdapterError> {
        unreachable!("source is never the CREATE/UPDATE/DELETE target")
    }
}

/// Call counters shared between a [`FakeDestination`] and the test that
/// constructed it. `FakeDestination` is moved by value into `Job::new`, so
/// assertions after `job.run` read these `Arc` handles rather than the
/// (by-then-moved) destination itself.
#[derive(Clone, Default)]
struct DestinationCounters {
    create_request_calls: Arc<AtomicU64>,
    update_request_calls: Arc<AtomicU64>,
    update_resource_calls: Arc<AtomicU64>,
    delete_request_calls: Arc<AtomicU64>,
}

/// Destination fake whose call counts and canned responses are configurable
/// per test. `available` simulates the liveness probe the failure
/// classifier consults.
struct FakeDestination {
    existing_ids: HashSet<String>,
    available: Arc<std::sync::atomic::AtomicBool>,
    create_request_ok: bool,
    counters: DestinationCounters,
    fail_create_request: bool,
}

impl FakeDestination {
    fn new() -> Self {
        Self {
            existing_ids: HashSet::new(),
            available: Arc::new(std::sync::atomic::AtomicBool::new(true)),
            create_request_ok: true,
            counters: DestinationCounters::default(),
            fail_create_request: false,
        }
    }

    fn counters(&self) -> DestinationCounters {
        self.counters.clone()
    }
}

#[async_trait]
impl NodeAdapter for FakeDestination {
    fn system_name(&self) -> &str {
        "fake-destination"
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn query(
        &self,
        _request: QueryRequest,
    ) -> Result<BoxStream<'static, Result<Metadata, AdapterError>>, AdapterError> {
        Ok(stream::empty().boxed())
    }

    async fn exists(&self, metadata: &Metadata) -> Result<bool, AdapterError> {
        Ok(self.existing_ids.contains(&metadata.id))
    }

    async fn read_resource(&self, _metadata: &Metadata) -> Result<ResourceResponse, AdapterError> {
        unreachable!("destination is never read from in these scenarios")
    }

    async fn create_request(&self, _metadata: &Metadata) -> Result<bool, AdapterError> {
        self.counters.create_request_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create_request {
            return Err(AdapterError::Rejected {
                adapter: self.system_name().to_string(),
                message: "simulated outage".to_string(),
            });
        }
        Ok(self.create_request_ok)
    }

    async fn update_request(&self, _metadata: &Metadata) -> Result<bool, AdapterError> {
        self.counters.update_request_calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn delete_request(&self, _metadata: &Metadata) -> Result<bool, AdapterError> {
        self.counters.delete_request_calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn create_resource(
        &self,
        _metadata: &Metadata,
        _resource: ResourceResponse,
    ) -> Result<bool, AdapterError> {
        Ok(true)
    }

    async fn update_resource(
        &self,
        _metadata: &Metadata,
        _resource: ResourceResponse,
    ) -> Result<bool, AdapterError> {
        self.counters.update_resource_calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

fn harness() -> (
    Arc<InMemoryReplicationLedger>,
    Arc<InMemoryFilterIndexStore>,
    Filter,
) {
    (
        Arc::new(InMemoryReplicationLedger::new()),
        Arc::new(InMemoryFilterIndexStore::new()),
        Filter::new("f1", "Filter One", "type:dataset"),
    )
}

#[tokio::test]
async fn s1_first_run_create_no_resource() {
    let (ledger, filter_index, filter) = harness();
    let source = FakeSource {
        records: vec![Metadata::new("r1", ts(100))],
    };
    let destination = FakeDestination::new();

    let job = Job::new(
        source,
        destination,
        filter.clone(),
        ledger.clone(),
        filter_index.clone(),
        ObserverRegistry::new(),
    );
    let summary = job.run(None).await.expect("job run");

    assert_eq!(summary.created, 1);
    assert_eq!(summary.processed, 1);

    let item = ledger.get_latest("f1", "r1").await.expect("ledger entry");
    assert_eq!(item.action, sync_core::Action::Create);
    assert_eq!(item.status, Status::Success);

    let index = filter_index.get_or_create(&filter).await;
    assert_eq!(index.modified_since, Some(ts(100)));
}

#[tokio::test]
async fn s2_update_skipped_when_nothing_changed() {
    let (ledger, filter_index, filter) = harness();

    ledger
        .save(sync_core::ReplicationItem {
            metadata_id: "r1".to_string(),
            filter_id: "f1".to_string(),
            source_name: "fake-source".to_string(),
            destination_name: "fake-destination".to_string(),
            action: sync_core::Action::Create,
            status: Status::Success,
            start_time: ts(100),
            done_time: ts(100),
            metadata_modified: ts(100),
            resource_modified: None,
            metadata_size: None,
            resource_size: None,
        })
        .await;
    let mut index = filter_index.get_or_create(&filter).await;
    index.advance(ts(100));
    filter_index.save(&index).await;

    let source = FakeSource {
        records: vec![Metadata::new("r1", ts(100))],
    };
    let mut destination = FakeDestination::new();
    destination.existing_ids.insert("r1".to_string());

    let job = Job::new(
        source,
        destination,
        filter.clone(),
        ledger.clone(),
        filter_index.clone(),
        ObserverRegistry::new(),
    );
    let summary = job.run(None).await.expect("job run");

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.created, 0);

    let index = filter_index.get_or_create(&filter).await;
    assert_eq!(index.modified_since, Some(ts(100)));
}

#[tokio::test]
async fn s3_retry_after_failure_updates_on_prior_failure_alone() {
    let (ledger, filter_index, filter) = harness();

    ledger
        .save(sync_core::ReplicationItem {
            metadata_id: "r1".to_string(),
            filter_id: "f1".to_string(),
            source_name: "fake-source".to_string(),
            destination_name: "fake-destination".to_string(),
            action: sync_core::Action::Create,
            status: Status::Failure,
            start_time: ts(100),
            done_time: ts(100),
            metadata_modified: ts(100),
            resource_modified: None,
            metadata_size: None,
            resource_size: None,
        })
        .await;

    let source = FakeSource {
        records: vec![Metadata::new("r1", ts(100))],
    };
    let mut destination = FakeDestination::new();
    destination.existing_ids.insert("r1".to_string());

    let job = Job::new(
        source,
        destination,
        filter.clone(),
        ledger.clone(),
        filter_index.clone(),
        ObserverRegistry::new(),
    );
    let summary = job.run(None).await.expect("job run");

    assert_eq!(summary.updated, 1);
    let item = ledger.get_latest("f1", "r1").await.expect("ledger entry");
    assert_eq!(item.status, Status::Success);
    assert_eq!(item.action, sync_core::Action::Update);
}

#[tokio::test]
async fn s4_connection_loss_is_recorded_and_watermark_still_advances() {
    let (ledger, filter_index, filter) = harness();

    let source = FakeSource {
        records: vec![Metadata::new("r2", ts(300))],
    };
    let mut destination = FakeDestination::new();
    destination.fail_create_request = true;
    destination.available.store(false, Ordering::SeqCst);

    let job = Job::new(
        source,
        destination,
        filter.clone(),
        ledger.clone(),
        filter_index.clone(),
        ObserverRegistry::new(),
    );
    let summary = job.run(None).await.expect("job run");

    assert_eq!(summary.connection_lost, 1);
    let item = ledger.get_latest("f1", "r2").await.expect("ledger entry");
    assert_eq!(item.status, Status::ConnectionLost);

    let failures = ledger.get_failure_list("f1").await;
    assert_eq!(failures, vec!["r2".to_string()]);

    let index = filter_index.get_or_create(&filter).await;
    assert_eq!(index.modified_since, Some(ts(300)));
}

#[tokio::test]
async fn s5_delete_without_history_is_treated_as_create() {
    let (ledger, filter_index, filter) = harness();

    let mut deleted = Metadata::new("r3", ts(400));
    deleted.is_deleted = true;
    let source = FakeSource {
        records: vec![deleted],
    };
    let destination = FakeDestination::new();

    let job = Job::new(
        source,
        destination,
        filter.clone(),
        ledger.clone(),
        filter_index.clone(),
        ObserverRegistry::new(),
    );
    job.run(None).await.expect("job run");

    let item = ledger.get_latest("f1", "r3").await.expect("ledger entry");
    assert_eq!(item.action, sync_core::Action::Create);
}

#[tokio::test]
async fn s6_resource_update_supersedes_metadata_update() {
    let (ledger, filter_index, filter) = harness();

    ledger
        .save(sync_core::ReplicationItem {
            metadata_id: "r1".to_string(),
            filter_id: "f1".to_string(),
            source_name: "fake-source".to_string(),
            destination_name: "fake-destination".to_string(),
            action: sync_core::Action::Create,
            status: Status::Success,
            start_time: ts(100),
            done_time: ts(100),
            metadata_modified: ts(100),
            resource_modified: Some(ts(100)),
            metadata_size: None,
            resource_size: None,
        })
        .await;

    let mut newer = Metadata::new("r1", ts(200));
    newer.resource_uri = Some("https://example.invalid/r1.bin".to_string());
    newer.resource_modified = Some(ts(200));

    let source = FakeSource {
        records: vec![newer],
    };
    let mut destination = FakeDestination::new();
    destination.existing_ids.insert("r1".to_string());
    let counters = destination.counters();

    let job = Job::new(
        source,
        destination,
        filter.clone(),
        ledger.clone(),
        filter_index.clone(),
        ObserverRegistry::new(),
    );
    job.run(None).await.expect("job run");

    assert_eq!(counters.update_resource_calls.load(Ordering::SeqCst), 1);
    assert_eq!(counters.update_request_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn a_cancelled_job_stops_before_processing_remaining_records() {
    let (ledger, filter_index, filter) = harness();
    let source = FakeSource {
        records: vec![Metadata::new("r1", ts(100)), Metadata::new("r2", ts(200))],
    };
    let destination = FakeDestination::new();

    let job = Arc::new(Job::new(
        source,
        destination,
        filter.clone(),
        ledger.clone(),
        filter_index.clone(),
        ObserverRegistry::new(),
    ));
    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();

    let summary = job.run(Some(cancel)).await.expect("job run");
    assert!(summary.cancelled);
    assert_eq!(summary.processed, 0);
}
