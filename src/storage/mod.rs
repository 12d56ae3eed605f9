//! Metric storage backends
//!
//! Every backend implements the [`MetricStore`] trait, so the HTTP layer
//! and the snapshot actor work the same against all of them.
//!
//! ## Backends
//!
//! - **In-Memory**: `MemoryStore`, guarded by a single `RwLock`. Usually
//!   paired with file snapshots for durability
//! - **SQLite** (default feature `storage-sqlite`): `SqliteStore`, with
//!   atomic upserts, transactional batch writes and retries on transient
//!   errors
//!
//! ## Usage
//!
//! ```no_run
//! use telemetry_store::storage::{MetricStore, sqlite::SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteStore::new("./metrics.db").await?;
//!     store.update("counter", "requests", "1").await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod retry;
pub mod schema;
pub mod snapshot;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::MetricStore;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use retry::RetryPolicy;
pub use schema::{KindMetrics, Metric, MetricKind, MetricValue, StoreState};
pub use snapshot::Memento;
