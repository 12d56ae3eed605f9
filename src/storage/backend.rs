//! Metric store trait definition
//!
//! This module defines the core `MetricStore` trait that every
//! storage backend must implement.

use async_trait::async_trait;

use super::error::{StorageError, StorageResult};
use super::schema::{KindMetrics, Metric, MetricKind, MetricValue, StoreState};

/// Trait for metric storage backends
///
/// Implemented by the in-memory store and the SQLite store. Handlers
/// receive the store as `Arc<dyn MetricStore>` and never touch backend
/// internals.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` and safe to call from any number
/// of concurrent tasks. Updates to the same (kind, name) key are
/// serialized: concurrent counter increments never lose an update.
///
/// ## Error Handling
///
/// Validation failures (`InvalidKind`, `InvalidValue`, `InvalidName`)
/// leave the store unchanged and are never retried.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Apply a raw textual update
    ///
    /// `kind` is the kind code (`"gauge"` / `"counter"`) and `raw` the value
    /// text. Gauges are replaced, counters accumulate.
    async fn update(&self, kind: &str, name: &str, raw: &str) -> StorageResult<()>;

    /// Apply a pre-typed update with the same merge semantics as `update`
    async fn update_typed(&self, metric: &Metric) -> StorageResult<()>;

    /// Apply several typed updates atomically
    ///
    /// Either every update is applied or none is.
    async fn update_batch(&self, metrics: &[Metric]) -> StorageResult<()>;

    /// All values of one kind (empty if the kind has no entries)
    async fn get(&self, kind: MetricKind) -> StorageResult<KindMetrics>;

    /// The full current state
    async fn get_all(&self) -> StorageResult<StoreState>;

    /// Replace the entire store state
    ///
    /// Used by restore-from-snapshot only, not for incremental updates.
    async fn set_all(&self, state: StoreState) -> StorageResult<()>;

    /// Liveness check
    async fn ping(&self) -> StorageResult<()>;

    /// A single value, or `NotFound` if the name is absent from its kind
    async fn get_value(&self, kind: MetricKind, name: &str) -> StorageResult<MetricValue> {
        self.get(kind)
            .await?
            .remove(name)
            .ok_or_else(|| StorageError::NotFound {
                kind: kind.code().to_string(),
                name: name.to_string(),
            })
    }

    /// Release backend resources
    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
