use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::adapter::{NodeAdapter, QueryRequest};
use crate::error::SyncError;
use crate::filter_index::FilterIndexManager;
use crate::ledger::ReplicationItemManager;
use crate::model::{Action, Filter, Metadata, ReplicationItem, Status};
use crate::observer::ObserverRegistry;

/// Per-run counters returned by [`Job::run`]. Populated purely from
/// already-computed per-record outcomes. It adds no decision logic of its
/// own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub failed: u64,
    pub connection_lost: u64,
    pub skipped: u64,
    pub cancelled: bool,
}

/// One-shot replication pass for one filter between one source and one
/// destination.
///
/// A Job is single-threaded from the core's point of view: its `run` future
/// does not itself fan out work across more tasks. Parallelism across
/// filters, or across (source, destination) pairs, is the outer system's
/// responsibility. Running multiple Jobs concurrently on different
/// filters is safe; running two Jobs on the *same* filter concurrently is
/// forbidden by convention and not guarded against here.
pub struct Job<S, D> {
    source: S,
    destination: D,
    filter: Filter,
    ledger: Arc<dyn ReplicationItemManager>,
    filter_index: Arc<dyn FilterIndexManager>,
    observers: ObserverRegistry,
}

impl<S, D> Job<S, D>
where
    S: NodeAdapter,
    D: NodeAdapter,
{
    pub fn new(
        source: S,
        destination: D,
        filter: Filter,
        ledger: Arc<dyn ReplicationItemManager>,
        filter_index: Arc<dyn FilterIndexManager>,
        observers: ObserverRegistry,
    ) -> Self {
        Self {
            source,
            destination,
            filter,
            ledger,
            filter_index,
            observers,
        }
    }

    /// Runs the job to completion. Cooperatively cancellable at iteration
    /// boundaries: a record currently being transferred always completes or
    /// fails naturally before the cancellation check is honored.
    pub async fn run(&self, cancel: Option<CancellationToken>) -> Result<JobSummary, SyncError> {
        let cancel = cancel.unwrap_or_default();
        let mut summary = JobSummary::default();

        let mut index = self.filter_index.get_or_create(&self.filter).await;
        let modified_after = index.modified_since;
        let failed_ids = self.ledger.get_failure_list(&self.filter.id).await;

        info!(
            filter_id = %self.filter.id,
            source = self.source.system_name(),
            destination = self.destination.system_name(),
            modified_after = ?modified_after,
            retry_count = failed_ids.len(),
            "sync job starting"
        );

        let request = QueryRequest {
            query: self.filter.query.clone(),
            exclude_present_at: vec![self.destination.system_name().to_string()],
            retry_ids: failed_ids,
            modified_after,
        };

        let mut stream = self.source.query(request).await?;

        while let Some(next) = stream.next().await {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let metadata = match next {
                Ok(metadata) => metadata,
                Err(err) => {
                    error!(filter_id = %self.filter.id, error = %err, "source query stream errored");
                    return Err(SyncError::Adapter(err));
                }
            };

            self.process_one(metadata, &mut index, &mut summary).await;
        }

        info!(
            filter_id = %self.filter.id,
            processed = summary.processed,
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            failed = summary.failed,
            connection_lost = summary.connection_lost,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            final_watermark = ?index.modified_since,
            "sync job finished"
        );

        Ok(summary)
    }

    async fn process_one(&self, metadata: Metadata, index: &mut crate::model::FilterIndex, summary: &mut JobSummary) {
        summary.processed += 1;

        let existing = self
            .ledger
            .get_latest(&self.filter.id, &metadata.id)
            .await;

        let action = decide_action(&metadata, existing.as_ref(), self.destination_exists(&metadata).await);

        let start_time = Utc::now();
        let outcome = self.execute_action(action, &metadata, existing.as_ref()).await;

        match outcome {
            Ok(Some(status)) => {
                self.record_outcome(&metadata, action, status, start_time, summary).await;
            }
            Ok(None) => {
                // UPDATE with nothing to do: no ledger entry, no observer call.
                summary.skipped += 1;
            }
            Err(err) => {
                let status = self.classify_failure(&err).await;
                self.record_outcome(&metadata, action, status, start_time, summary).await;
            }
        }

        // Watermark advance happens regardless of transfer status.
        if index.advance(metadata.metadata_modified) {
            self.filter_index.save(index).await;
        }
    }

    async fn destination_exists(&self, metadata: &Metadata) -> bool {
        self.destination.exists(metadata).await.unwrap_or(false)
    }

    /// First-match decision tree from the base specification.
    async fn execute_action(
        &self,
        action: Action,
        metadata: &Metadata,
        existing: Option<&ReplicationItem>,
    ) -> Result<Option<Status>, SyncError> {
        match action {
            Action::Create => self.do_create(metadata).await,
            Action::Update => self.do_update(metadata, existing).await,
            Action::Delete => self.do_delete(metadata).await,
        }
    }

    async fn do_create(&self, metadata: &Metadata) -> Result<Option<Status>, SyncError> {
        let mut outgoing = metadata.clone();
        outgoing.augment_for_replication(self.source.system_name());

        let ok = if outgoing.has_resource() {
            let resource = self.source.read_resource(&outgoing).await?;
            self.destination.create_resource(&outgoing, resource).await?
        } else {
            self.destination.create_request(&outgoing).await?
        };

        Ok(Some(if ok { Status::Success } else { Status::Failure }))
    }

    async fn do_update(
        &self,
        metadata: &Metadata,
        existing: Option<&ReplicationItem>,
    ) -> Result<Option<Status>, SyncError> {
        let mut outgoing = metadata.clone();
        outgoing.augment_for_replication(self.source.system_name());

        let existing = match existing {
            Some(existing) => existing,
            // Decision tree guarantees UPDATE only when `existing` is
            // present; treat a missing history defensively as "update
            // everything" rather than panicking.
            None => {
                let ok = self.destination.update_request(&outgoing).await?;
                return Ok(Some(if ok { Status::Success } else { Status::Failure }));
            }
        };

        let should_update_metadata =
            outgoing.metadata_modified > existing.metadata_modified || !existing.status.is_success();

        let should_update_resource = outgoing.has_resource()
            && (outgoing.resource_modified > existing.resource_modified || !existing.status.is_success());

        if should_update_resource {
            let resource = self.source.read_resource(&outgoing).await?;
            let ok = self.destination.update_resource(&outgoing, resource).await?;
            Ok(Some(if ok { Status::Success } else { Status::Failure }))
        } else if should_update_metadata {
            let ok = self.destination.update_request(&outgoing).await?;
            Ok(Some(if ok { Status::Success } else { Status::Failure }))
        } else {
            Ok(None)
        }
    }

    async fn do_delete(&self, metadata: &Metadata) -> Result<Option<Status>, SyncError> {
        let ok = self.destination.delete_request(metadata).await?;
        Ok(Some(if ok { Status::Success } else { Status::Failure }))
    }

    /// Consults both adapters' liveness to distinguish transient
    /// connectivity loss from a permanent, record-level failure.
    async fn classify_failure(&self, err: &SyncError) -> Status {
        let source_available = self.source.is_available().await;
        let destination_available = self.destination.is_available().await;

        if !source_available || !destination_available {
            Status::ConnectionLost
        } else {
            let _ = err; // already logged by the caller via tracing below
            Status::Failure
        }
    }

    async fn record_outcome(
        &self,
        metadata: &Metadata,
        action: Action,
        status: Status,
        start_time: chrono::DateTime<Utc>,
        summary: &mut JobSummary,
    ) {
        let done_time = Utc::now();
        let item = ReplicationItem {
            metadata_id: metadata.id.clone(),
            filter_id: self.filter.id.clone(),
            source_name: self.source.system_name().to_string(),
            destination_name: self.destination.system_name().to_string(),
            action,
            status,
            start_time,
            done_time,
            metadata_modified: metadata.metadata_modified,
            resource_modified: metadata.resource_modified,
            metadata_size: metadata.metadata_size,
            resource_size: metadata.resource_size,
        };

        self.ledger.save(item.clone()).await;
        self.observers.notify(&item).await;

        match (action, status) {
            (Action::Create, Status::Success) => summary.created += 1,
            (Action::Update, Status::Success) => summary.updated += 1,
            (Action::Delete, Status::Success) => summary.deleted += 1,
            (_, Status::Failure) => summary.failed += 1,
            (_, Status::ConnectionLost) => summary.connection_lost += 1,
        }
    }
}

/// Decision tree from §4.4 of the base specification. First match wins:
/// a deletion without prior history is ignored, an update requires both
/// destination presence and local history, otherwise the record is treated
/// as new.
fn decide_action(metadata: &Metadata, existing: Option<&ReplicationItem>, destination_has_it: bool) -> Action {
    if metadata.is_deleted && existing.is_some() {
        Action::Delete
    } else if destination_has_it && existing.is_some() {
        Action::Update
    } else {
        Action::Create
    }
}
