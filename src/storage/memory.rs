//! In-memory metric store (no persistence)
//!
//! Holds the two-level `kind -> name -> value` map behind a single
//! `RwLock`. It's useful for:
//! - Testing without database dependencies
//! - Deployments that persist through snapshot files instead of a database
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart unless wrapped by the
//!   snapshot actor
//! - **Coarse locking**: One lock for the whole store; writers to different
//!   keys still serialize

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::backend::MetricStore;
use super::error::StorageResult;
use super::schema::{
    KindMetrics, Metric, MetricKind, MetricValue, StoreState, kind_from_code, parse_and_merge,
    validate_name, validate_state,
};

/// In-memory metric store
///
/// Reads take the shared lock, updates take the exclusive lock for the
/// duration of a single map mutation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    metrics: RwLock<StoreState>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `state`
    pub fn with_state(state: StoreState) -> StorageResult<Self> {
        validate_state(&state)?;
        Ok(Self {
            metrics: RwLock::new(state),
        })
    }

    /// Number of stored metrics across all kinds
    pub async fn len(&self) -> usize {
        self.metrics.read().await.values().map(|m| m.len()).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    async fn update(&self, kind: &str, name: &str, raw: &str) -> StorageResult<()> {
        let kind = kind_from_code(kind)?;
        validate_name(name)?;

        let mut metrics = self.metrics.write().await;
        let current = metrics.get(&kind).and_then(|m| m.get(name));
        let merged = parse_and_merge(kind, current, raw)?;

        trace!("{}/{} = {}", kind, name, merged);
        metrics
            .entry(kind)
            .or_default()
            .insert(name.to_string(), merged);
        Ok(())
    }

    async fn update_typed(&self, metric: &Metric) -> StorageResult<()> {
        let incoming = metric.incoming()?;

        let mut metrics = self.metrics.write().await;
        let current = metrics.get(&metric.kind).and_then(|m| m.get(&metric.id));
        let merged = MetricValue::merge(current, incoming)?;

        trace!("{}/{} = {}", metric.kind, metric.id, merged);
        metrics
            .entry(metric.kind)
            .or_default()
            .insert(metric.id.clone(), merged);
        Ok(())
    }

    async fn update_batch(&self, batch: &[Metric]) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut metrics = self.metrics.write().await;

        // Merge into a staging map first so a failing entry leaves the store untouched
        let mut staged: BTreeMap<(MetricKind, &str), MetricValue> = BTreeMap::new();
        for metric in batch {
            let incoming = metric.incoming()?;
            let key = (metric.kind, metric.id.as_str());
            let current = staged
                .get(&key)
                .or_else(|| metrics.get(&metric.kind).and_then(|m| m.get(&metric.id)));
            let merged = MetricValue::merge(current, incoming)?;
            staged.insert(key, merged);
        }

        debug!("applying batch of {} updates", staged.len());
        for ((kind, name), value) in staged {
            metrics
                .entry(kind)
                .or_default()
                .insert(name.to_string(), value);
        }
        Ok(())
    }

    async fn get(&self, kind: MetricKind) -> StorageResult<KindMetrics> {
        let metrics = self.metrics.read().await;
        Ok(metrics.get(&kind).cloned().unwrap_or_default())
    }

    async fn get_all(&self) -> StorageResult<StoreState> {
        Ok(self.metrics.read().await.clone())
    }

    async fn set_all(&self, state: StoreState) -> StorageResult<()> {
        validate_state(&state)?;
        let count: usize = state.values().map(|m| m.len()).sum();

        *self.metrics.write().await = state;

        debug!("replaced in-memory state with {} metrics", count);
        Ok(())
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}
