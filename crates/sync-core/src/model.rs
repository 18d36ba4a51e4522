use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag the Job stamps onto every record it hands to the destination.
pub const REPLICATED_TAG: &str = "replicated";

/// Current and minimum-supported [`FilterIndex`] persistence schema versions.
///
/// Entries with `version < MINIMUM_FILTER_INDEX_VERSION` are rejected as
/// unsupported on read; entries with `version > CURRENT_FILTER_INDEX_VERSION`
/// are accepted (forward-compatible read). Every write stamps
/// `CURRENT_FILTER_INDEX_VERSION`.
pub const CURRENT_FILTER_INDEX_VERSION: i32 = 1;
pub const MINIMUM_FILTER_INDEX_VERSION: i32 = 1;

/// A named, persistent query describing which source records are subject to
/// replication. Immutable from the core's perspective.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Filter {
    pub id: String,
    pub name: String,
    pub query: String,
}

impl Filter {
    pub fn new(id: impl Into<String>, name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            query: query.into(),
        }
    }
}

/// A record yielded by a source query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    pub id: String,
    pub metadata_modified: DateTime<Utc>,
    pub resource_uri: Option<String>,
    pub resource_modified: Option<DateTime<Utc>>,
    pub resource_size: Option<u64>,
    pub metadata_size: Option<u64>,
    pub is_deleted: bool,
    pub tags: BTreeSet<String>,
    pub lineage: Vec<String>,
}

impl Metadata {
    pub fn new(id: impl Into<String>, metadata_modified: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            metadata_modified,
            resource_uri: None,
            resource_modified: None,
            resource_size: None,
            metadata_size: None,
            is_deleted: false,
            tags: BTreeSet::new(),
            lineage: Vec::new(),
        }
    }

    pub fn has_resource(&self) -> bool {
        self.resource_uri.is_some()
    }

    /// Mutates this record the way the Job does before handing it to a
    /// destination: appends `system_name` to lineage and adds the
    /// `"replicated"` tag. Idempotent: calling it twice has no further
    /// effect.
    pub fn augment_for_replication(&mut self, system_name: &str) {
        self.lineage.push(system_name.to_string());
        self.tags.insert(REPLICATED_TAG.to_string());
    }
}

/// The action a Job decides to take for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "CREATE",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
        }
    }
}

/// The outcome of one transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Success,
    Failure,
    ConnectionLost,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Failure => "FAILURE",
            Status::ConnectionLost => "CONNECTION_LOST",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }
}

/// Immutable once written. One entry per transfer attempt. Field names on
/// the wire (via serde) match the base specification exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationItem {
    #[serde(rename = "metadataId")]
    pub metadata_id: String,
    #[serde(rename = "filterId")]
    pub filter_id: String,
    #[serde(rename = "source")]
    pub source_name: String,
    #[serde(rename = "destination")]
    pub destination_name: String,
    pub action: Action,
    pub status: Status,
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "doneTime")]
    pub done_time: DateTime<Utc>,
    #[serde(rename = "metadataModified")]
    pub metadata_modified: DateTime<Utc>,
    #[serde(rename = "resourceModified")]
    pub resource_modified: Option<DateTime<Utc>>,
    #[serde(rename = "metadataSize")]
    pub metadata_size: Option<u64>,
    #[serde(rename = "resourceSize")]
    pub resource_size: Option<u64>,
}

/// Per-filter high-water modification timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterIndex {
    pub filter_id: String,
    pub modified_since: Option<DateTime<Utc>>,
    pub version: i32,
}

impl FilterIndex {
    /// A fresh index for a filter that has never been observed.
    pub fn empty(filter_id: impl Into<String>) -> Self {
        Self {
            filter_id: filter_id.into(),
            modified_since: None,
            version: CURRENT_FILTER_INDEX_VERSION,
        }
    }

    /// Advances `modified_since` to `candidate` if it is strictly greater
    /// than the current value (or the index is empty). Returns `true` if the
    /// watermark moved.
    pub fn advance(&mut self, candidate: DateTime<Utc>) -> bool {
        let should_advance = match self.modified_since {
            None => true,
            Some(current) => candidate > current,
        };
        if should_advance {
            self.modified_since = Some(candidate);
        }
        should_advance
    }
}
