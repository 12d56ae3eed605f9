//! Store snapshots (mementos) and their file format
//!
//! A [`Memento`] is an owned copy of the full store state. It is taken with
//! [`Memento::capture`], which copies the state under the store's lock and
//! returns immediately; serialization and file I/O happen on the copy,
//! outside any lock.
//!
//! ## File format
//!
//! ```json
//! {
//!   "metrics": {
//!     "gauge": { "temp": 36.6 },
//!     "counter": { "hits": 10 }
//!   }
//! }
//! ```
//!
//! The kind of every value comes from the enclosing map key. An integral
//! gauge such as `10` stays a gauge on load.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use super::backend::MetricStore;
use super::error::{StorageError, StorageResult};
use super::schema::{MetricKind, MetricValue, StoreState, validate_state};

/// Immutable copy of the full store state at one point in time
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Memento {
    state: StoreState,
}

#[derive(Serialize)]
struct SnapshotDocumentRef<'a> {
    metrics: &'a StoreState,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SnapshotDocument {
    metrics: SnapshotMetrics,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SnapshotMetrics {
    #[serde(default)]
    gauge: BTreeMap<String, f64>,

    #[serde(default)]
    counter: BTreeMap<String, i64>,
}

impl Memento {
    /// Wrap an owned state, dropping kinds without entries
    pub fn new(mut state: StoreState) -> Self {
        state.retain(|_, metrics| !metrics.is_empty());
        Self { state }
    }

    /// Copy the current state of `store`
    pub async fn capture(store: &dyn MetricStore) -> StorageResult<Self> {
        Ok(Self::new(store.get_all().await?))
    }

    pub fn state(&self) -> &StoreState {
        &self.state
    }

    pub fn into_state(self) -> StoreState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.state.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Encode as an indented JSON document
    pub fn serialize(&self) -> StorageResult<Vec<u8>> {
        let document = SnapshotDocumentRef {
            metrics: &self.state,
        };
        Ok(serde_json::to_vec_pretty(&document)?)
    }

    /// Decode a JSON document, taking each value's kind from its map key
    pub fn deserialize(bytes: &[u8]) -> StorageResult<Self> {
        let document: SnapshotDocument = serde_json::from_slice(bytes)?;

        let mut state = StoreState::new();
        let gauges = document
            .metrics
            .gauge
            .into_iter()
            .map(|(name, value)| (name, MetricValue::Gauge(value)))
            .collect();
        state.insert(MetricKind::Gauge, gauges);

        let counters = document
            .metrics
            .counter
            .into_iter()
            .map(|(name, value)| (name, MetricValue::Counter(value)))
            .collect();
        state.insert(MetricKind::Counter, counters);

        validate_state(&state)?;
        Ok(Self::new(state))
    }

    /// Write the snapshot to `path`
    ///
    /// The document goes to a temporary file in the same directory, is
    /// synced, and then renamed over `path`, so a crash never leaves a
    /// truncated snapshot behind.
    #[instrument(skip(self), fields(metrics = self.len()))]
    pub async fn save_to_file(&self, path: &Path) -> StorageResult<()> {
        let bytes = self.serialize()?;
        let tmp_path = temp_path_for(path);

        let write = async {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }

            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            drop(file);

            tokio::fs::rename(&tmp_path, path).await
        };

        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StorageError::PersistenceFailure(format!(
                "writing {}: {}",
                path.display(),
                e
            )));
        }

        debug!("snapshot written to {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Read a snapshot from `path`
    ///
    /// A missing file is the first-run case and yields `Ok(None)`.
    #[instrument]
    pub async fn load_from_file(path: &Path) -> StorageResult<Option<Self>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no snapshot at {}", path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(StorageError::PersistenceFailure(format!(
                    "reading {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let memento = Self::deserialize(&bytes)?;
        debug!("loaded snapshot with {} metrics", memento.len());
        Ok(Some(memento))
    }

    /// Replace the state of `store` with this snapshot
    pub async fn restore_into(self, store: &dyn MetricStore) -> StorageResult<()> {
        let count = self.len();
        store.set_all(self.state).await?;
        info!("restored {} metrics from snapshot", count);
        Ok(())
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut file_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    file_name.push(".tmp");
    path.with_file_name(file_name)
}
