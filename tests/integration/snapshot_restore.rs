//! Snapshot and restore tests
//!
//! These tests verify that:
//! - A flushed snapshot restores to an identical state in a fresh store
//! - Restore happens before serving and only when enabled
//! - A corrupt snapshot leaves the store empty instead of failing startup

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use telemetry_store::actors::SnapshotHandle;
use telemetry_store::storage::{Memento, MemoryStore, MetricKind, MetricStore, MetricValue};
use tempfile::tempdir;

use crate::helpers::*;

#[tokio::test]
async fn test_flush_then_restore_in_fresh_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics.json");

    let store = Arc::new(MemoryStore::new());
    store.update("gauge", "a", "1.5").await.unwrap();
    store.update("counter", "b", "3").await.unwrap();

    let snapshots = SnapshotHandle::spawn(store.clone(), snapshot_settings(&path, Duration::ZERO));
    snapshots.flush().await.unwrap();
    snapshots.shutdown().await.unwrap();

    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"metrics": {"gauge": {"a": 1.5}, "counter": {"b": 3}}})
    );

    let fresh = Arc::new(MemoryStore::new());
    let restored =
        SnapshotHandle::start(fresh.clone(), snapshot_settings(&path, Duration::ZERO)).await;

    assert_eq!(
        fresh.get(MetricKind::Gauge).await.unwrap()["a"],
        MetricValue::Gauge(1.5)
    );
    assert_eq!(
        fresh.get(MetricKind::Counter).await.unwrap()["b"],
        MetricValue::Counter(3)
    );
    restored.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restored_counters_keep_accumulating() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics.json");

    let original = populated_store().await;
    Memento::capture(&original)
        .await
        .unwrap()
        .save_to_file(&path)
        .await
        .unwrap();

    let fresh = Arc::new(MemoryStore::new());
    let handle =
        SnapshotHandle::start(fresh.clone(), snapshot_settings(&path, Duration::ZERO)).await;
    assert_eq!(fresh.get_all().await.unwrap(), original.get_all().await.unwrap());

    fresh.update("counter", "requests", "8").await.unwrap();
    assert_eq!(
        fresh.get_value(MetricKind::Counter, "requests").await.unwrap(),
        MetricValue::Counter(50)
    );
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_missing_snapshot_starts_empty() {
    let dir = tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());

    let handle = SnapshotHandle::start(
        store.clone(),
        snapshot_settings(&dir.path().join("absent.json"), Duration::ZERO),
    )
    .await;

    assert!(store.is_empty().await);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_corrupt_snapshot_starts_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    std::fs::write(&path, br#"{"metrics": {"counter": {"b": "three"}}}"#).unwrap();

    let store = Arc::new(MemoryStore::new());
    let handle =
        SnapshotHandle::start(store.clone(), snapshot_settings(&path, Duration::ZERO)).await;

    assert!(store.is_empty().await);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_periodic_flush_captures_later_updates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics.json");

    let store = Arc::new(MemoryStore::new());
    let handle = SnapshotHandle::spawn(
        store.clone(),
        snapshot_settings(&path, Duration::from_millis(30)),
    );

    store.update("counter", "ticks", "1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let loaded = Memento::load_from_file(&path).await.unwrap().unwrap();
    assert_eq!(
        loaded.state()[&MetricKind::Counter]["ticks"],
        MetricValue::Counter(1)
    );
    handle.shutdown().await.unwrap();
}

#[cfg(feature = "storage-sqlite")]
#[tokio::test]
async fn test_memory_snapshot_restores_into_sqlite() {
    let dir = tempdir().unwrap();
    let original = populated_store().await;
    let memento = Memento::capture(&original).await.unwrap();

    let sqlite = create_sqlite_store(&dir).await;
    memento.clone().restore_into(&sqlite).await.unwrap();

    assert_eq!(Memento::capture(&sqlite).await.unwrap(), memento);
}
