//! SQLite persistence tests
//!
//! These tests verify that:
//! - Upserts accumulate counters and replace gauges
//! - Data survives closing and reopening the database
//! - Batch updates and bulk replace are all-or-nothing

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use telemetry_store::storage::{
    Memento, Metric, MetricKind, MetricStore, MetricValue, StorageError, StoreState,
};
use tempfile::tempdir;

use crate::helpers::*;

#[tokio::test]
async fn test_upsert_semantics() {
    let dir = tempdir().unwrap();
    let store = create_sqlite_store(&dir).await;

    store.update("counter", "hits", "5").await.unwrap();
    store.update("counter", "hits", "-2").await.unwrap();
    store.update("gauge", "temp", "20").await.unwrap();
    store.update("gauge", "temp", "21.25").await.unwrap();

    assert_eq!(
        store.get_value(MetricKind::Counter, "hits").await.unwrap(),
        MetricValue::Counter(3)
    );
    assert_eq!(
        store.get_value(MetricKind::Gauge, "temp").await.unwrap(),
        MetricValue::Gauge(21.25)
    );
}

#[tokio::test]
async fn test_same_name_in_both_kinds() {
    let dir = tempdir().unwrap();
    let store = create_sqlite_store(&dir).await;

    store.update("gauge", "x", "1.5").await.unwrap();
    store.update("counter", "x", "2").await.unwrap();

    assert_eq!(
        store.get_value(MetricKind::Gauge, "x").await.unwrap(),
        MetricValue::Gauge(1.5)
    );
    assert_eq!(
        store.get_value(MetricKind::Counter, "x").await.unwrap(),
        MetricValue::Counter(2)
    );
}

#[tokio::test]
async fn test_invalid_updates_leave_store_unchanged() {
    let dir = tempdir().unwrap();
    let store = create_sqlite_store(&dir).await;
    store.update("counter", "hits", "1").await.unwrap();

    assert_matches!(
        store.update("histogram", "x", "1").await,
        Err(StorageError::InvalidKind(_))
    );
    assert_matches!(
        store.update("counter", "hits", "1.5").await,
        Err(StorageError::InvalidValue(_))
    );
    assert_matches!(
        store.update("gauge", "", "1").await,
        Err(StorageError::InvalidName(_))
    );

    let state = store.get_all().await.unwrap();
    assert_eq!(state.len(), 1);
    assert_eq!(state[&MetricKind::Counter]["hits"], MetricValue::Counter(1));
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let dir = tempdir().unwrap();

    let expected = {
        let store = create_sqlite_store(&dir).await;
        let source = populated_store().await;
        for (kind, metrics) in source.get_all().await.unwrap() {
            for (name, value) in metrics {
                store
                    .update(kind.code(), &name, &value.to_string())
                    .await
                    .unwrap();
            }
        }
        let state = store.get_all().await.unwrap();
        store.close().await.unwrap();
        state
    };

    let reopened = create_sqlite_store(&dir).await;
    assert_eq!(reopened.get_all().await.unwrap(), expected);
    assert_eq!(
        reopened.get_value(MetricKind::Gauge, "temperature").await.unwrap(),
        MetricValue::Gauge(36.6)
    );
}

#[tokio::test]
async fn test_batch_is_atomic() {
    let dir = tempdir().unwrap();
    let store = create_sqlite_store(&dir).await;
    store.update("counter", "a", "1").await.unwrap();

    let bad = vec![
        Metric::counter("a", 10),
        Metric::gauge("b", 2.0),
        Metric {
            id: "c".into(),
            kind: MetricKind::Gauge,
            delta: Some(1),
            value: None,
        },
    ];
    assert_matches!(
        store.update_batch(&bad).await,
        Err(StorageError::InvalidValue(_))
    );
    assert_eq!(
        store.get_value(MetricKind::Counter, "a").await.unwrap(),
        MetricValue::Counter(1)
    );
    assert_matches!(
        store.get_value(MetricKind::Gauge, "b").await,
        Err(StorageError::NotFound { .. })
    );

    let good = vec![
        Metric::counter("a", 10),
        Metric::counter("a", 5),
        Metric::gauge("b", 2.0),
    ];
    store.update_batch(&good).await.unwrap();
    assert_eq!(
        store.get_value(MetricKind::Counter, "a").await.unwrap(),
        MetricValue::Counter(16)
    );
    assert_eq!(
        store.get_value(MetricKind::Gauge, "b").await.unwrap(),
        MetricValue::Gauge(2.0)
    );
}

#[tokio::test]
async fn test_set_all_replaces_everything() {
    let dir = tempdir().unwrap();
    let store = create_sqlite_store(&dir).await;
    store.update("counter", "stale", "7").await.unwrap();

    let replacement = Memento::capture(&populated_store().await).await.unwrap();
    store.set_all(replacement.state().clone()).await.unwrap();

    assert_matches!(
        store.get_value(MetricKind::Counter, "stale").await,
        Err(StorageError::NotFound { .. })
    );
    assert_eq!(Memento::capture(&store).await.unwrap(), replacement);

    store.set_all(StoreState::new()).await.unwrap();
    assert!(store.get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_set_all_rejects_mismatched_kinds() {
    let dir = tempdir().unwrap();
    let store = create_sqlite_store(&dir).await;
    store.update("counter", "kept", "1").await.unwrap();

    let mut state = StoreState::new();
    state
        .entry(MetricKind::Counter)
        .or_default()
        .insert("wrong".into(), MetricValue::Gauge(1.0));

    assert!(store.set_all(state).await.is_err());
    assert_eq!(
        store.get_value(MetricKind::Counter, "kept").await.unwrap(),
        MetricValue::Counter(1)
    );
}

#[tokio::test]
async fn test_ping() {
    let dir = tempdir().unwrap();
    let store = create_sqlite_store(&dir).await;

    store.ping().await.unwrap();
    store.close().await.unwrap();
    assert_matches!(
        store.ping().await,
        Err(StorageError::BackendUnavailable(_))
    );
}
