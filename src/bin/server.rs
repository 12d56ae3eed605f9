use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use telemetry_store::{
    actors::SnapshotHandle,
    api::{ApiState, spawn_api_server},
    config::{Config, DEFAULT_BUSY_TIMEOUT_MS, RetryConfig, StorageConfig, read_config_file},
    storage::{
        MemoryStore, MetricStore, RetryPolicy,
        sqlite::{RetriableCodes, SqliteOptions, SqliteStore},
    },
};
use tracing::{debug, error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long, env = "CONFIG")]
    file: Option<String>,

    /// Listen address
    #[arg(short, long, env = "ADDRESS")]
    address: Option<SocketAddr>,

    /// Snapshot file of the in-memory store ("" disables persistence)
    #[arg(long, env = "FILE_STORAGE_PATH")]
    file_storage_path: Option<PathBuf>,

    /// Seconds between snapshots (0 = after every update)
    #[arg(long, env = "STORE_INTERVAL")]
    store_interval: Option<u64>,

    /// Load the snapshot at startup
    #[arg(long, env = "RESTORE")]
    restore: Option<bool>,

    /// SQLite database; selects the relational backend
    #[arg(long, env = "DATABASE_DSN")]
    database_dsn: Option<String>,
}

impl Args {
    /// Apply command line and environment overrides on top of the config file
    fn apply(self, mut config: Config) -> Config {
        if let Some(address) = self.address {
            config.address = address;
        }

        if let Some(database_url) = self.database_dsn {
            let (busy_timeout_ms, retry) = match config.storage {
                StorageConfig::Sqlite {
                    busy_timeout_ms,
                    retry,
                    ..
                } => (busy_timeout_ms, retry),
                StorageConfig::Memory { .. } => (DEFAULT_BUSY_TIMEOUT_MS, RetryConfig::default()),
            };
            config.storage = StorageConfig::Sqlite {
                database_url,
                busy_timeout_ms,
                retry,
            };
            return config;
        }

        if let StorageConfig::Memory {
            file_path,
            store_interval_secs,
            restore,
        } = &mut config.storage
        {
            if let Some(path) = self.file_storage_path {
                *file_path = Some(path);
            }
            if let Some(interval) = self.store_interval {
                *store_interval_secs = interval;
            }
            if let Some(flag) = self.restore {
                *restore = flag;
            }
        }

        config
    }
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("telemetry_store", LevelFilter::TRACE),
        ("telemetry_server", LevelFilter::TRACE),
        ("tower_http", LevelFilter::DEBUG),
        ("sqlx", LevelFilter::WARN),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

async fn open_store(storage: &StorageConfig) -> anyhow::Result<Arc<dyn MetricStore>> {
    match storage {
        StorageConfig::Memory { .. } => {
            info!("using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageConfig::Sqlite {
            database_url,
            busy_timeout_ms,
            retry,
        } => {
            let options = SqliteOptions {
                retry: RetryPolicy::from(retry),
                retriable: RetriableCodes::new(retry.retriable_codes.iter().cloned()),
                busy_timeout: Duration::from_millis(*busy_timeout_ms),
                ..SqliteOptions::default()
            };
            Ok(Arc::new(SqliteStore::with_options(database_url, options).await?))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::default(),
    };
    let config = args.apply(config);
    debug!("effective config: {config:?}");

    let store = open_store(&config.storage).await?;

    let mut state = ApiState::new(store.clone());
    if let Some(settings) = config.storage.snapshot_settings() {
        let snapshots = SnapshotHandle::start(store.clone(), settings).await;
        info!("snapshot mode: {}", snapshots.mode());
        state = state.with_snapshots(snapshots);
    }
    let snapshots = state.snapshots.clone();

    let (_, server) = spawn_api_server(config.address, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for shutdown signal: {e}");
        }
        info!("shutdown signal received");
    })
    .await?;

    if let Err(e) = server.await {
        error!("API server task failed: {e}");
    }

    if let Some(snapshots) = snapshots {
        if let Err(e) = snapshots.shutdown().await {
            error!("final snapshot failed: {e}");
        }
    }

    store.close().await?;
    info!("shutdown complete");

    Ok(())
}
