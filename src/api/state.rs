//! API shared state

use std::sync::Arc;

use tracing::warn;

use crate::actors::SnapshotHandle;
use crate::storage::MetricStore;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// The metric store every handler reads and writes
    pub store: Arc<dyn MetricStore>,

    /// Handle to the snapshot actor, when the store is snapshotted
    pub snapshots: Option<SnapshotHandle>,
}

impl ApiState {
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self {
            store,
            snapshots: None,
        }
    }

    pub fn with_snapshots(mut self, snapshots: SnapshotHandle) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Flush after an accepted update when running in synchronous mode
    ///
    /// The update is already applied, so a failed flush is logged and not
    /// reported to the client.
    pub async fn after_update(&self) {
        let Some(snapshots) = self.snapshots.as_ref().filter(|s| s.is_synchronous()) else {
            return;
        };
        if let Err(e) = snapshots.flush().await {
            warn!("synchronous snapshot failed: {}", e);
        }
    }
}
