use async_trait::async_trait;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};
use tracing::warn;

use sync_core::{Action, ReplicationItem, ReplicationItemManager, Status};

/// `ReplicationItemManager` backed by `sqlx::AnyPool`: Postgres or SQLite,
/// chosen by the scheme of the connection URL passed to [`connect`].
/// Mirrors the teacher's `PostgresLedgerStore`: connect, then
/// `ensure_schema` idempotently, then serve reads/writes as plain SQL.
#[derive(Debug, Clone)]
pub struct SqlxReplicationLedger {
    pool: AnyPool,
}

impl SqlxReplicationLedger {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS replication_items (
                filter_id TEXT NOT NULL,
                metadata_id TEXT NOT NULL,
                source_name TEXT NOT NULL,
                destination_name TEXT NOT NULL,
                action TEXT NOT NULL,
                status TEXT NOT NULL,
                start_time TIMESTAMP NOT NULL,
                done_time TIMESTAMP NOT NULL,
                metadata_modified TIMESTAMP NOT NULL,
                resource_modified TIMESTAMP NULL,
                metadata_size BIGINT NULL,
                resource_size BIGINT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_replication_items_filter_metadata \
             ON replication_items (filter_id, metadata_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_item(row: &sqlx::any::AnyRow) -> Result<ReplicationItem, sqlx::Error> {
        let action_str: String = row.try_get("action")?;
        let status_str: String = row.try_get("status")?;
        Ok(ReplicationItem {
            metadata_id: row.try_get("metadata_id")?,
            filter_id: row.try_get("filter_id")?,
            source_name: row.try_get("source_name")?,
            destination_name: row.try_get("destination_name")?,
            action: parse_action(&action_str),
            status: parse_status(&status_str),
            start_time: row.try_get("start_time")?,
            done_time: row.try_get("done_time")?,
            metadata_modified: row.try_get("metadata_modified")?,
            resource_modified: row.try_get("resource_modified")?,
            metadata_size: row
                .try_get::<Option<i64>, _>("metadata_size")?
                .map(|v| v as u64),
            resource_size: row
                .try_get::<Option<i64>, _>("resource_size")?
                .map(|v| v as u64),
        })
    }
}

fn parse_action(s: &str) -> Action {
    match s {
        "CREATE" => Action::Create,
        "UPDATE" => Action::Update,
        "DELETE" => Action::Delete,
        other => {
            warn!(value = other, "unrecognized action in ledger row, defaulting to CREATE");
            Action::Create
        }
    }
}

fn parse_status(s: &str) -> Status {
    match s {
        "SUCCESS" => Status::Success,
        "FAILURE" => Status::Failure,
        "CONNECTION_LOST" => Status::ConnectionLost,
        other => {
            warn!(value = other, "unrecognized status in ledger row, defaulting to FAILURE");
            Status::Failure
        }
    }
}

#[async_trait]
impl ReplicationItemManager for SqlxReplicationLedger {
    async fn get_latest(&self, filter_id: &str, metadata_id: &str) -> Option<ReplicationItem> {
        let result = sqlx::query(
            "SELECT * FROM replication_items \
             WHERE filter_id = ? AND metadata_id = ? \
             ORDER BY done_time DESC LIMIT 1",
        )
        .bind(filter_id)
        .bind(metadata_id)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(row)) => match Self::row_to_item(&row) {
                Ok(item) => Some(item),
                Err(err) => {
                    warn!(filter_id, metadata_id, error = %err, "failed to decode ledger row");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(filter_id, metadata_id, error = %err, "ledger lookup failed, treating as unknown history");
                None
            }
        }
    }

    async fn get_failure_list(&self, filter_id: &str) -> Vec<String> {
        let result = sqlx::query("SELECT DISTINCT metadata_id FROM replication_items WHERE filter_id = ?")
            .bind(filter_id)
            .fetch_all(&self.pool)
            .await;

        // One query per distinct id to find its latest status, rather than a
        // window-function query whose dialect would differ between Postgres
        // and SQLite under `sqlx::Any`.
        let ids: Vec<String> = match result {
            Ok(rows) => rows
                .into_iter()
                .filter_map(|row| row.try_get::<String, _>("metadata_id").ok())
                .collect(),
            Err(err) => {
                warn!(filter_id, error = %err, "failure list query failed, returning empty list");
                return Vec::new();
            }
        };

        let mut seen = std::collections::HashSet::new();
        let mut failures = Vec::new();
        for metadata_id in ids {
            if !seen.insert(metadata_id.clone()) {
                continue;
            }
            if let Some(latest) = self.get_latest(filter_id, &metadata_id).await {
                if !latest.status.is_success() {
                    failures.push(metadata_id);
                }
            }
        }
        failures
    }

    async fn save(&self, item: ReplicationItem) {
        let result = sqlx::query(
            "INSERT INTO replication_items \
             (filter_id, metadata_id, source_name, destination_name, action, status, \
              start_time, done_time, metadata_modified, resource_modified, metadata_size, resource_size) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.filter_id)
        .bind(&item.metadata_id)
        .bind(&item.source_name)
        .bind(&item.destination_name)
        .bind(item.action.as_str())
        .bind(item.status.as_str())
        .bind(item.start_time)
        .bind(item.done_time)
        .bind(item.metadata_modified)
        .bind(item.resource_modified)
        .bind(item.metadata_size.map(|v| v as i64))
        .bind(item.resource_size.map(|v| v as i64))
        .execute(&self.pool)
        .await;

        if let Err(err) = result {
            warn!(
                filter_id = %item.filter_id,
                metadata_id = %item.metadata_id,
                error = %err,
                "failed to persist ledger entry"
            );
        }
    }

    async fn get_all_for_filter(
        &self,
        filter_id: &str,
        start_index: usize,
        page_size: usize,
    ) -> Vec<ReplicationItem> {
        let result = sqlx::query(
            "SELECT * FROM replication_items WHERE filter_id = ? \
             ORDER BY done_time ASC LIMIT ? OFFSET ?",
        )
        .bind(filter_id)
        .bind(page_size as i64)
        .bind(start_index as i64)
        .fetch_all(&self.pool)
        .await;

        match result {
            Ok(rows) => rows.iter().filter_map(|row| Self::row_to_item(row).ok()).collect(),
            Err(err) => {
                warn!(filter_id, error = %err, "paged ledger listing failed");
                Vec::new()
            }
        }
    }

    async fn remove_all_for_filter(&self, filter_id: &str) {
        let result = sqlx::query("DELETE FROM replication_items WHERE filter_id = ?")
            .bind(filter_id)
            .execute(&self.pool)
            .await;

        if let Err(err) = result {
            warn!(filter_id, error = %err, "failed to purge ledger entries for filter");
        }
    }
}
