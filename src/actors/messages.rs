//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to a specific actor via mpsc
//! 2. **Replies**: Sent back over a oneshot channel carried in the command

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::storage::StorageResult;

/// Commands that can be sent to the SnapshotActor
#[derive(Debug)]
pub enum SnapshotCommand {
    /// Write a snapshot now, independent of the timer
    Flush {
        respond_to: oneshot::Sender<StorageResult<()>>,
    },

    /// Get flush statistics
    GetStats {
        respond_to: oneshot::Sender<SnapshotStats>,
    },

    /// Write a final snapshot and stop
    ///
    /// The reply is sent once the final flush has been attempted.
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// When snapshots are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// No snapshot file configured
    #[default]
    Disabled,

    /// Only on explicit request (flush interval of zero)
    Synchronous,

    /// On a fixed period
    Periodic(Duration),
}

impl fmt::Display for FlushMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushMode::Disabled => write!(f, "disabled"),
            FlushMode::Synchronous => write!(f, "synchronous"),
            FlushMode::Periodic(every) => write!(f, "every {:?}", every),
        }
    }
}

/// Snapshot statistics
#[derive(Debug, Clone, Default)]
pub struct SnapshotStats {
    pub mode: FlushMode,

    /// Number of snapshots written successfully
    pub flush_count: u64,

    /// Number of flush cycles that failed and were skipped
    pub failed_flushes: u64,

    /// Completion time of the last successful flush
    pub last_flush: Option<DateTime<Utc>>,

    /// Metrics contained in the last written snapshot
    pub last_flush_metrics: usize,
}
