//! SnapshotActor - Periodically persists a store to a snapshot file
//!
//! ## Architecture
//!
//! The actor owns the flush schedule for one store. Every flush takes a
//! [`Memento`] (a copy of the state, taken under the store's lock), then
//! serializes and writes it with no lock held, so request handlers are
//! never blocked on disk I/O.
//!
//! Flushes are processed one at a time by the actor loop, so at most one
//! snapshot is being written at any moment (`Idle -> Saving -> Idle`).
//!
//! ## Flush triggers
//!
//! - **Time trigger**: every `interval` when the interval is non-zero
//! - **Explicit**: [`SnapshotHandle::flush`], e.g. after every update when
//!   the interval is zero
//! - **Shutdown**: a best-effort final flush before the actor stops
//!
//! A failed flush is logged and the cycle skipped; the store keeps serving
//! from memory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, trace, warn};

use super::messages::{FlushMode, SnapshotCommand, SnapshotStats};
use crate::storage::{MetricStore, StorageError, StorageResult, snapshot::Memento};

/// Snapshot persistence settings
#[derive(Debug, Clone, Default)]
pub struct SnapshotSettings {
    /// Snapshot file; `None` disables persistence
    pub file_path: Option<PathBuf>,

    /// Flush period; zero means flush only on request
    pub interval: Duration,

    /// Load the snapshot into the store at startup
    pub restore: bool,
}

impl SnapshotSettings {
    pub fn mode(&self) -> FlushMode {
        match (&self.file_path, self.interval.is_zero()) {
            (None, _) => FlushMode::Disabled,
            (Some(_), true) => FlushMode::Synchronous,
            (Some(_), false) => FlushMode::Periodic(self.interval),
        }
    }
}

/// Load the snapshot file into `store`, once, before serving
///
/// Returns the number of restored metrics. A missing, unreadable or corrupt
/// snapshot is logged and treated as "no snapshot": the store stays empty
/// and startup continues.
#[instrument(skip_all)]
pub async fn restore_at_startup(store: &dyn MetricStore, settings: &SnapshotSettings) -> usize {
    let Some(path) = settings.file_path.as_deref().filter(|_| settings.restore) else {
        debug!("snapshot restore disabled");
        return 0;
    };

    let memento = match Memento::load_from_file(path).await {
        Ok(Some(memento)) => memento,
        Ok(None) => {
            info!("no snapshot at {}, starting empty", path.display());
            return 0;
        }
        Err(e) => {
            warn!(
                "could not load snapshot {}: {}, starting empty",
                path.display(),
                e
            );
            return 0;
        }
    };

    let count = memento.len();
    match memento.restore_into(store).await {
        Ok(()) => count,
        Err(e) => {
            warn!("could not restore snapshot: {}, starting empty", e);
            0
        }
    }
}

/// Snapshot actor bound to one store
pub struct SnapshotActor {
    store: Arc<dyn MetricStore>,

    settings: SnapshotSettings,

    /// Command receiver
    command_rx: mpsc::Receiver<SnapshotCommand>,

    stats: SnapshotStats,
}

impl SnapshotActor {
    pub fn new(
        store: Arc<dyn MetricStore>,
        settings: SnapshotSettings,
        command_rx: mpsc::Receiver<SnapshotCommand>,
    ) -> Self {
        let mode = settings.mode();
        debug!("creating snapshot actor (mode: {})", mode);

        Self {
            store,
            settings,
            command_rx,
            stats: SnapshotStats {
                mode,
                ..SnapshotStats::default()
            },
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        let mut ticker = match self.stats.mode {
            FlushMode::Periodic(every) => {
                let mut ticker = time::interval_at(Instant::now() + every, every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Some(ticker)
            }
            FlushMode::Synchronous | FlushMode::Disabled => None,
        };

        loop {
            tokio::select! {
                _ = next_tick(&mut ticker) => {
                    trace!("time-based flush triggered");
                    let _ = self.flush().await;
                }

                cmd = self.command_rx.recv() => match cmd {
                    Some(cmd) => {
                        if !self.handle_command(cmd).await {
                            return;
                        }
                    }
                    None => {
                        warn!("command channel closed, shutting down");
                        break;
                    }
                }
            }
        }

        self.final_flush().await;
    }

    /// Handle one command; returns false once the actor should stop
    async fn handle_command(&mut self, cmd: SnapshotCommand) -> bool {
        match cmd {
            SnapshotCommand::Flush { respond_to } => {
                trace!("manual flush requested");
                let result = self.flush().await;
                let _ = respond_to.send(result);
            }

            SnapshotCommand::GetStats { respond_to } => {
                let _ = respond_to.send(self.stats.clone());
            }

            SnapshotCommand::Shutdown { respond_to } => {
                debug!("received shutdown command");
                self.final_flush().await;
                let _ = respond_to.send(());
                return false;
            }
        }
        true
    }

    async fn final_flush(&mut self) {
        if self.stats.mode == FlushMode::Disabled {
            return;
        }
        debug!("final flush before shutdown");
        if self.flush().await.is_ok() {
            info!("final snapshot written");
        }
    }

    /// Take a snapshot and write it to the configured file
    async fn flush(&mut self) -> StorageResult<()> {
        let Some(path) = self.settings.file_path.clone() else {
            trace!("flush skipped, persistence disabled");
            return Ok(());
        };

        let result = match Memento::capture(self.store.as_ref()).await {
            Ok(memento) => {
                let count = memento.len();
                memento.save_to_file(&path).await.map(|()| count)
            }
            Err(e) => Err(StorageError::PersistenceFailure(format!(
                "taking snapshot: {}",
                e
            ))),
        };

        match result {
            Ok(count) => {
                self.stats.flush_count += 1;
                self.stats.last_flush = Some(chrono::Utc::now());
                self.stats.last_flush_metrics = count;
                trace!("flush #{} complete ({} metrics)", self.stats.flush_count, count);
                Ok(())
            }
            Err(e) => {
                self.stats.failed_flushes += 1;
                error!("failed to write snapshot, skipping cycle: {}", e);
                Err(e)
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Handle for controlling the SnapshotActor
#[derive(Clone)]
pub struct SnapshotHandle {
    sender: mpsc::Sender<SnapshotCommand>,
    mode: FlushMode,
}

impl SnapshotHandle {
    /// Spawn a snapshot actor for `store`
    pub fn spawn(store: Arc<dyn MetricStore>, settings: SnapshotSettings) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let mode = settings.mode();

        let actor = SnapshotActor::new(store, settings, cmd_rx);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            mode,
        }
    }

    /// Restore the snapshot into `store` (if configured), then spawn the actor
    pub async fn start(store: Arc<dyn MetricStore>, settings: SnapshotSettings) -> Self {
        restore_at_startup(store.as_ref(), &settings).await;
        Self::spawn(store, settings)
    }

    pub fn mode(&self) -> FlushMode {
        self.mode
    }

    /// Whether every update should be followed by a flush
    pub fn is_synchronous(&self) -> bool {
        self.mode == FlushMode::Synchronous
    }

    /// Write a snapshot now
    pub async fn flush(&self) -> anyhow::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SnapshotCommand::Flush { respond_to: tx })
            .await?;

        rx.await??;
        Ok(())
    }

    /// Get flush statistics
    pub async fn get_stats(&self) -> Option<SnapshotStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SnapshotCommand::GetStats { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Write a final snapshot and stop the actor
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SnapshotCommand::Shutdown { respond_to: tx })
            .await?;

        rx.await?;
        Ok(())
    }
}
