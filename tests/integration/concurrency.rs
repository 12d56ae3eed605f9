//! Concurrency and race condition tests
//!
//! These tests verify that:
//! - Concurrent counter increments are never lost
//! - Concurrent gauge writes leave one of the written values
//! - Snapshots taken during updates are consistent

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use telemetry_store::actors::SnapshotHandle;
use telemetry_store::storage::{Memento, MemoryStore, MetricKind, MetricStore, MetricValue};
use tempfile::tempdir;

use crate::helpers::*;

const TASKS: usize = 8;
const INCREMENTS: usize = 250;

async fn hammer_counter(store: Arc<dyn MetricStore>, tasks: usize, increments: usize) {
    let workers = (0..tasks).map(|_| {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..increments {
                store.update("counter", "hits", "1").await.unwrap();
            }
        })
    });

    for result in join_all(workers).await {
        result.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_counter_increments_memory() {
    let store: Arc<dyn MetricStore> = Arc::new(MemoryStore::new());

    hammer_counter(store.clone(), TASKS, INCREMENTS).await;

    assert_eq!(
        store.get_value(MetricKind::Counter, "hits").await.unwrap(),
        MetricValue::Counter((TASKS * INCREMENTS) as i64)
    );
}

#[cfg(feature = "storage-sqlite")]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_counter_increments_sqlite() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn MetricStore> = Arc::new(create_sqlite_store(&dir).await);

    hammer_counter(store.clone(), 4, 25).await;

    assert_eq!(
        store.get_value(MetricKind::Counter, "hits").await.unwrap(),
        MetricValue::Counter(100)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_gauge_writes() {
    let store: Arc<dyn MetricStore> = Arc::new(MemoryStore::new());

    let writers = (0..TASKS).map(|i| {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .update("gauge", "temperature", &format!("{}.5", i))
                .await
                .unwrap();
        })
    });
    for result in join_all(writers).await {
        result.unwrap();
    }

    let value = store
        .get_value(MetricKind::Gauge, "temperature")
        .await
        .unwrap()
        .as_f64()
        .unwrap();
    assert!((0..TASKS).any(|i| value == i as f64 + 0.5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_snapshots_during_updates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics.json");

    let store = Arc::new(MemoryStore::new());
    let snapshots = SnapshotHandle::spawn(
        store.clone(),
        snapshot_settings(&path, Duration::from_millis(5)),
    );

    hammer_counter(store.clone(), TASKS, INCREMENTS).await;
    snapshots.shutdown().await.unwrap();

    // The final flush happens after every increment completed
    let loaded = Memento::load_from_file(&path).await.unwrap().unwrap();
    assert_eq!(
        loaded.state()[&MetricKind::Counter]["hits"],
        MetricValue::Counter((TASKS * INCREMENTS) as i64)
    );
}
