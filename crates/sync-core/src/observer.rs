use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::model::{Action, ReplicationItem, Status};

/// Receives every ledger entry a Job saves, in save order.
///
/// An observer that errors must not abort the Job. Per the resolved open
/// question in the design notes, the error is logged and the next observer
/// is invoked.
#[async_trait]
pub trait Observer: Send + Sync {
    async fn on_item(&self, item: &ReplicationItem) -> Result<(), String>;
}

/// Deduplicated, insertion-ordered collection of observers.
///
/// Deduplication is by `Arc` pointer identity: the only equality a `dyn
/// Observer` handle reliably offers.
#[derive(Default, Clone)]
pub struct ObserverRegistry {
    observers: Vec<Arc<dyn Observer>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Arc<dyn Observer>) {
        let already_present = self
            .observers
            .iter()
            .any(|existing| Arc::ptr_eq(existing, &observer));
        if !already_present {
            self.observers.push(observer);
        }
    }

    /// Invokes every observer synchronously, in registration order. Logs and
    /// continues past an observer error instead of propagating it.
    pub async fn notify(&self, item: &ReplicationItem) {
        for observer in &self.observers {
            if let Err(message) = observer.on_item(item).await {
                error!(
                    filter_id = %item.filter_id,
                    metadata_id = %item.metadata_id,
                    error = %message,
                    "observer failed, continuing to next observer"
                );
            }
        }
    }
}

/// Ambient logging observer: one structured `tracing` event per item.
#[derive(Debug, Default)]
pub struct LoggingObserver;

#[async_trait]
impl Observer for LoggingObserver {
    async fn on_item(&self, item: &ReplicationItem) -> Result<(), String> {
        match item.status {
            Status::Success => info!(
                filter_id = %item.filter_id,
                metadata_id = %item.metadata_id,
                action = item.action.as_str(),
                status = item.status.as_str(),
                "replication item recorded"
            ),
            Status::Failure | Status::ConnectionLost => warn!(
                filter_id = %item.filter_id,
                metadata_id = %item.metadata_id,
                action = item.action.as_str(),
                status = item.status.as_str(),
                "replication item recorded"
            ),
        }
        Ok(())
    }
}

/// Minimal in-process counter observer, standing in for full telemetry
/// export (which is explicitly out of scope for the core).
#[derive(Debug, Default)]
pub struct MetricsObserver {
    counts: std::sync::Mutex<HashMap<(Action, Status), Arc<AtomicU64>>>,
}

impl MetricsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> HashMap<(Action, Status), u64> {
        self.counts
            .lock()
            .expect("metrics mutex poisoned")
            .iter()
            .map(|(k, v)| (*k, v.load(Ordering::Relaxed)))
            .collect()
    }
}

#[async_trait]
impl Observer for MetricsObserver {
    async fn on_item(&self, item: &ReplicationItem) -> Result<(), String> {
        let counter = {
            let mut counts = self.counts.lock().expect("metrics mutex poisoned");
            counts
                .entry((item.action, item.status))
                .or_insert_with(|| Arc::new(AtomicU64::new(0)))
                .clone()
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
