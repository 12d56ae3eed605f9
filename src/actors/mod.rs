//! Background actors
//!
//! Each actor runs as an independent async task and is driven through a
//! cloneable handle.
//!
//! ```text
//!   HTTP handlers ──update──▶ MetricStore ◀──capture── SnapshotActor ──▶ snapshot file
//!         │                                                 ▲
//!         └──────────── flush (synchronous mode) ───────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: the actor has an mpsc command channel for control messages
//! 2. **Request/Response**: oneshot channels carried in the commands

pub mod messages;
pub mod snapshot;

pub use messages::{FlushMode, SnapshotStats};
pub use snapshot::{SnapshotHandle, SnapshotSettings};
