//! Error types for storage operations

use std::fmt;
use std::time::Duration;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug)]
pub enum StorageError {
    /// Unrecognized metric kind code (caller's fault, store unchanged)
    InvalidKind(String),

    /// Value text could not be parsed for the metric kind (caller's fault, store unchanged)
    InvalidValue(String),

    /// Metric name is empty
    InvalidName(String),

    /// Requested metric name is absent from its kind
    NotFound { kind: String, name: String },

    /// Backend is unreachable or retries were exhausted
    BackendUnavailable(String),

    /// The overall operation deadline elapsed
    Timeout(Duration),

    /// Snapshot file could not be written or read
    PersistenceFailure(String),

    /// Database query failed
    QueryFailed(String),

    /// Migration failed
    MigrationFailed(String),

    /// Snapshot serialization/deserialization error
    SerializationError(String),

    /// I/O error (file access, etc.)
    IoError(std::io::Error),
}

impl StorageError {
    /// Whether the error was caused by the caller's input rather than the backend
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StorageError::InvalidKind(_)
                | StorageError::InvalidValue(_)
                | StorageError::InvalidName(_)
                | StorageError::NotFound { .. }
        )
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::InvalidKind(kind) => write!(f, "invalid metric kind: {}", kind),
            StorageError::InvalidValue(msg) => write!(f, "invalid metric value: {}", msg),
            StorageError::InvalidName(msg) => write!(f, "invalid metric name: {}", msg),
            StorageError::NotFound { kind, name } => {
                write!(f, "metric {} of kind {} not found", name, kind)
            }
            StorageError::BackendUnavailable(msg) => {
                write!(f, "storage backend unavailable: {}", msg)
            }
            StorageError::Timeout(after) => {
                write!(f, "storage operation timed out after {:?}", after)
            }
            StorageError::PersistenceFailure(msg) => {
                write!(f, "snapshot persistence failed: {}", msg)
            }
            StorageError::QueryFailed(msg) => write!(f, "storage query failed: {}", msg),
            StorageError::MigrationFailed(msg) => write!(f, "database migration failed: {}", msg),
            StorageError::SerializationError(msg) => {
                write!(f, "snapshot serialization error: {}", msg)
            }
            StorageError::IoError(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => StorageError::IoError(io_err),
            sqlx::Error::RowNotFound => StorageError::QueryFailed("no rows found".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StorageError::BackendUnavailable(err.to_string())
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::MigrationFailed(err.to_string())
    }
}
