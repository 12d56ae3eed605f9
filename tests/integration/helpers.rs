//! Helper functions for integration tests

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use telemetry_store::actors::SnapshotSettings;
use telemetry_store::storage::{MemoryStore, MetricStore};

/// A memory store holding a few gauges and counters
pub async fn populated_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.update("gauge", "temperature", "36.6").await.unwrap();
    store.update("gauge", "load", "-0.5").await.unwrap();
    store.update("gauge", "idle", "0").await.unwrap();
    store.update("counter", "requests", "42").await.unwrap();
    store.update("counter", "errors", "-3").await.unwrap();
    store
}

/// Snapshot settings writing to `path`
pub fn snapshot_settings(path: &Path, interval: Duration) -> SnapshotSettings {
    SnapshotSettings {
        file_path: Some(path.to_path_buf()),
        interval,
        restore: true,
    }
}

#[cfg(feature = "storage-sqlite")]
pub async fn create_sqlite_store(
    dir: &tempfile::TempDir,
) -> telemetry_store::storage::sqlite::SqliteStore {
    use telemetry_store::storage::RetryPolicy;
    use telemetry_store::storage::sqlite::{SqliteOptions, SqliteStore};

    let options = SqliteOptions {
        retry: RetryPolicy::new(5, Duration::from_millis(10)),
        ..SqliteOptions::default()
    };
    SqliteStore::with_options(dir.path().join("metrics.db"), options)
        .await
        .unwrap()
}
