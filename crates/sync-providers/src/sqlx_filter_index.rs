use async_trait::async_trait;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};
use tracing::warn;

use sync_core::{Filter, FilterIndex, FilterIndexManager, CURRENT_FILTER_INDEX_VERSION, MINIMUM_FILTER_INDEX_VERSION};

/// `FilterIndexManager` backed by `sqlx::AnyPool`. Schema mirrors
/// `SqlxReplicationLedger`'s connect/ensure_schema shape.
#[derive(Debug, Clone)]
pub struct SqlxFilterIndexStore {
    pool: AnyPool,
}

impl SqlxFilterIndexStore {
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
            CREATE TABLE IF NOT EXISTS filter_indexes (
                id TEXT PRIMARY KEY,
                modified_since TIMESTAMP NULL,
                version INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl FilterIndexManager for SqlxFilterIndexStore {
    async fn get_or_create(&self, filter: &Filter) -> FilterIndex {
        let row = sqlx::query("SELECT id, modified_since, version FROM filter_indexes WHERE id = ?")
            .bind(&filter.id)
            .fetch_optional(&self.pool)
            .await;

        match row {
            Ok(Some(row)) => {
                let version: i32 = row.try_get("version").unwrap_or(CURRENT_FILTER_INDEX_VERSION);
                if version < MINIMUM_FILTER_INDEX_VERSION {
                    warn!(
                        filter_id = %filter.id,
                        found = version,
                        minimum = MINIMUM_FILTER_INDEX_VERSION,
                        "stored filter index schema version is unsupported, starting fresh"
                    );
                    return FilterIndex::empty(filter.id.clone());
                }
                FilterIndex {
                    filter_id: filter.id.clone(),
                    modified_since: row.try_get("modified_since").ok().flatten(),
                    version,
                }
            }
            Ok(None) => FilterIndex::empty(filter.id.clone()),
            Err(err) => {
                warn!(filter_id = %filter.id, error = %err, "filter index lookup failed, starting fresh");
                FilterIndex::empty(filter.id.clone())
            }
        }
    }

    async fn save(&self, index: &FilterIndex) {
        let result = sqlx::query(
            "INSERT INTO filter_indexes (id, modified_since, version) VALUES (?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET modified_since = excluded.modified_since, version = excluded.version",
        )
        .bind(&index.filter_id)
        .bind(index.modified_since)
        .bind(CURRENT_FILTER_INDEX_VERSION)
        .execute(&self.pool)
        .await;

        if let Err(err) = result {
            warn!(filter_id = %index.filter_id, error = %err, "failed to persist filter index");
        }
    }
}
