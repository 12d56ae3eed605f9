use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

use crate::actors::SnapshotSettings;
use crate::storage::RetryPolicy;
use crate::storage::retry::{
    DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRIABLE_CODES,
};

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage, optionally snapshotted to a file
    Memory {
        /// Snapshot file; null or empty disables persistence
        #[serde(default = "default_file_path")]
        file_path: Option<PathBuf>,

        /// Seconds between snapshots; 0 flushes after every update
        #[serde(default = "default_store_interval")]
        store_interval_secs: u64,

        /// Load the snapshot at startup
        #[serde(default = "default_restore")]
        restore: bool,
    },

    /// SQLite database
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_database_url")]
        database_url: String,

        /// SQLite busy timeout in milliseconds
        #[serde(default = "default_busy_timeout_ms")]
        busy_timeout_ms: u64,

        #[serde(default)]
        retry: RetryConfig,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory {
            file_path: default_file_path(),
            store_interval_secs: default_store_interval(),
            restore: default_restore(),
        }
    }
}

impl StorageConfig {
    /// Snapshot settings for the in-memory backend
    ///
    /// The relational backend persists by itself and gets none.
    pub fn snapshot_settings(&self) -> Option<SnapshotSettings> {
        match self {
            StorageConfig::Memory {
                file_path,
                store_interval_secs,
                restore,
            } => Some(SnapshotSettings {
                file_path: file_path
                    .clone()
                    .filter(|path| !path.as_os_str().is_empty()),
                interval: Duration::from_secs(*store_interval_secs),
                restore: *restore,
            }),
            StorageConfig::Sqlite { .. } => None,
        }
    }
}

/// Retry settings for the relational backend
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct RetryConfig {
    /// Total attempts per operation, the first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Overall deadline per operation; 0 disables it
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Driver error codes treated as transient
    #[serde(default = "default_retriable_codes")]
    pub retriable_codes: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
            retriable_codes: default_retriable_codes(),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        let policy = RetryPolicy::new(
            config.max_attempts,
            Duration::from_millis(config.initial_delay_ms),
        );
        match config.operation_timeout_ms {
            0 => policy,
            ms => policy.with_deadline(Duration::from_millis(ms)),
        }
    }
}

fn default_file_path() -> Option<PathBuf> {
    Some(PathBuf::from("/tmp/metrics-db.json"))
}

fn default_store_interval() -> u64 {
    300
}

fn default_restore() -> bool {
    true
}

fn default_database_url() -> String {
    "./metrics.db".to_string()
}

/// SQLite busy timeout used when none is configured
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_initial_delay_ms() -> u64 {
    DEFAULT_INITIAL_DELAY.as_millis() as u64
}

fn default_operation_timeout_ms() -> u64 {
    15_000
}

fn default_retriable_codes() -> Vec<String> {
    DEFAULT_RETRIABLE_CODES.map(String::from).to_vec()
}

fn default_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Config {
    /// Address the HTTP server listens on
    #[serde(default = "default_address")]
    pub address: SocketAddr,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: default_address(),
            storage: StorageConfig::default(),
        }
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
