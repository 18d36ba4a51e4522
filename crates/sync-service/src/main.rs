use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use sync_core::{
    Filter, FilterIndexManager, InMemoryFilterIndexStore, InMemoryReplicationLedger, Job,
    LoggingObserver, MetricsObserver, ObserverRegistry, ReplicationItemManager,
};
use sync_providers::{HttpCatalogAdapter, SqlxFilterIndexStore, SqlxReplicationLedger};

/// Runs one `sync-core` Job, on a repeating poll interval, for a single
/// (source, destination, filter) triple. Multiple instances of this binary,
/// one per filter, are how the outer system gets the parallelism
/// `sync-core` itself deliberately does not provide.
#[derive(Debug, Parser)]
#[command(name = "sync-service", version, about = "Incremental catalog-to-catalog metadata sync")]
struct Cli {
    /// Base URL of the source catalog's HTTP API.
    #[arg(long, env = "SYNC_SOURCE_URL")]
    source_url: String,
    /// Stable name the source reports for lineage/log context.
    #[arg(long, env = "SYNC_SOURCE_NAME", default_value = "source")]
    source_name: String,
    /// Base URL of the destination catalog's HTTP API.
    #[arg(long, env = "SYNC_DEST_URL")]
    dest_url: String,
    /// Stable name the destination reports for lineage/log context.
    #[arg(long, env = "SYNC_DEST_NAME", default_value = "destination")]
    dest_name: String,
    /// Stable id of the filter being synced.
    #[arg(long, env = "SYNC_FILTER_ID")]
    filter_id: String,
    /// Human-readable filter name.
    #[arg(long, env = "SYNC_FILTER_NAME")]
    filter_name: String,
    /// Query string passed to the source's `query` operation.
    #[arg(long, env = "SYNC_FILTER_QUERY")]
    filter_query: String,
    /// Database URL for the ledger and filter-index stores. When unset,
    /// both fall back to in-memory storage (useful for local runs and
    /// smoke tests, not for production durability).
    #[arg(long, env = "SYNC_DATABASE_URL")]
    database_url: Option<String>,
    /// Max pool connections when a database URL is configured.
    #[arg(long, env = "SYNC_DB_MAX_CONNECTIONS", default_value_t = 5)]
    db_max_connections: u32,
    /// Seconds to sleep between passes. A value of 0 runs exactly one pass
    /// and exits.
    #[arg(long, env = "SYNC_POLL_INTERVAL_SECS", default_value_t = 60)]
    poll_interval_secs: u64,
}

enum LedgerBackend {
    Memory(Arc<InMemoryReplicationLedger>),
    Sqlx(Arc<SqlxReplicationLedger>),
}

enum FilterIndexBackend {
    Memory(Arc<InMemoryFilterIndexStore>),
    Sqlx(Arc<SqlxFilterIndexStore>),
}

impl LedgerBackend {
    fn as_ledger_manager(&self) -> Arc<dyn ReplicationItemManager> {
        match self {
            LedgerBackend::Memory(store) => store.clone() as Arc<dyn ReplicationItemManager>,
            LedgerBackend::Sqlx(store) => store.clone() as Arc<dyn ReplicationItemManager>,
        }
    }
}

impl FilterIndexBackend {
    fn as_filter_index_manager(&self) -> Arc<dyn FilterIndexManager> {
        match self {
            FilterIndexBackend::Memory(store) => store.clone() as Arc<dyn FilterIndexManager>,
            FilterIndexBackend::Sqlx(store) => store.clone() as Arc<dyn FilterIndexManager>,
        }
    }
}

async fn resolve_backends(cli: &Cli) -> anyhow::Result<(LedgerBackend, FilterIndexBackend)> {
    match &cli.database_url {
        Some(database_url) => {
            info!(database_url = %database_url, "using sqlx-backed ledger and filter index");
            let ledger = SqlxReplicationLedger::connect(database_url, cli.db_max_connections).await?;
            let filter_index = SqlxFilterIndexStore::connect(database_url, cli.db_max_connections).await?;
            Ok((
                LedgerBackend::Sqlx(Arc::new(ledger)),
                FilterIndexBackend::Sqlx(Arc::new(filter_index)),
            ))
        }
        None => {
            info!("no SYNC_DATABASE_URL configured, using in-memory ledger and filter index");
            Ok((
                LedgerBackend::Memory(Arc::new(InMemoryReplicationLedger::new())),
                FilterIndexBackend::Memory(Arc::new(InMemoryFilterIndexStore::new())),
            ))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "sync_service=info,info".to_string()))
        .init();

    let cli = Cli::parse();
    let (ledger_backend, filter_index_backend) = resolve_backends(&cli).await?;

    let filter = Filter::new(cli.filter_id.clone(), cli.filter_name.clone(), cli.filter_query.clone());

    let mut observers = ObserverRegistry::new();
    observers.register(Arc::new(LoggingObserver));
    let metrics = Arc::new(MetricsObserver::new());
    observers.register(metrics.clone());

    let cancel = CancellationToken::new();
    let shutdown_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal, finishing current record and stopping");
            shutdown_signal.cancel();
        }
    });

    loop {
        let source = HttpCatalogAdapter::new(cli.source_name.clone(), cli.source_url.clone());
        let destination = HttpCatalogAdapter::new(cli.dest_name.clone(), cli.dest_url.clone());

        let job = Job::new(
            source,
            destination,
            filter.clone(),
            ledger_backend.as_ledger_manager(),
            filter_index_backend.as_filter_index_manager(),
            observers.clone(),
        );

        match job.run(Some(cancel.clone())).await {
            Ok(summary) => info!(?summary, "sync pass complete"),
            Err(err) => error!(error = %err, "sync pass aborted"),
        }

        if cancel.is_cancelled() || cli.poll_interval_secs == 0 {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(cli.poll_interval_secs)) => {}
            _ = cancel.cancelled() => {}
        }
    }

    Ok(())
}
