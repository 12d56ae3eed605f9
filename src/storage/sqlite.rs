//! SQLite metric store implementation
//!
//! This module provides a SQLite-based implementation of the `MetricStore` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **Atomic upserts**: One `INSERT ... ON CONFLICT DO UPDATE` per update,
//!   never read-then-write
//! - **Transactions**: Batch updates and bulk replace are all-or-nothing
//! - **Retry**: Lock contention and transient connection errors are retried
//!   with exponential backoff (see [`RetryPolicy`])
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! ## Limitations
//!
//! - **Concurrency**: SQLite allows one writer at a time; contention shows
//!   up as `SQLITE_BUSY` and is handled by the retry policy
//!
//! Counter overflow is caught by a `typeof(counter) = 'integer'` check on
//! the table: SQLite would otherwise store the overflowing sum as REAL. The
//! check violation is reported as `InvalidValue` and the row is unchanged.

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Pool, Sqlite};
use tracing::{debug, error, info, instrument, warn};

use super::backend::MetricStore;
use super::error::{StorageError, StorageResult};
use super::retry::{DEFAULT_RETRIABLE_CODES, RetryError, RetryPolicy};
use super::schema::{
    KindMetrics, Metric, MetricKind, MetricRow, MetricValue, StoreState, kind_from_code,
    validate_name, validate_state,
};

/// How long `ping` waits for the database
const PING_TIMEOUT: Duration = Duration::from_secs(5);

const UPSERT_GAUGE: &str = r#"
    INSERT INTO metrics (name, kind, gauge)
    VALUES (?, 'gauge', ?)
    ON CONFLICT (name, kind) DO UPDATE SET
        gauge = excluded.gauge
"#;

const UPSERT_COUNTER: &str = r#"
    INSERT INTO metrics (name, kind, counter)
    VALUES (?, 'counter', ?)
    ON CONFLICT (name, kind) DO UPDATE SET
        counter = COALESCE(metrics.counter, 0) + excluded.counter
"#;

const INSERT_ROW: &str = r#"
    INSERT INTO metrics (name, kind, counter, gauge)
    VALUES (?, ?, ?, ?)
"#;

/// Classifies sqlx errors as retriable
///
/// Database errors are retriable when their driver code is in the
/// configured set. I/O errors and pool acquisition timeouts are always
/// transient.
#[derive(Debug, Clone)]
pub struct RetriableCodes {
    codes: HashSet<String>,
}

impl RetriableCodes {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_retriable(&self, err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => db_err
                .code()
                .is_some_and(|code| self.codes.contains(&*code)),
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
            _ => false,
        }
    }
}

impl Default for RetriableCodes {
    fn default() -> Self {
        Self::new(DEFAULT_RETRIABLE_CODES)
    }
}

/// Connection and retry settings for [`SqliteStore`]
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    /// Retry policy applied to every database operation
    pub retry: RetryPolicy,

    /// Error codes considered transient
    pub retriable: RetriableCodes,

    /// How long SQLite itself waits on a locked database before reporting BUSY
    pub busy_timeout: Duration,

    /// Connection pool size
    pub max_connections: u32,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            retriable: RetriableCodes::default(),
            busy_timeout: Duration::from_secs(5),
            max_connections: 5,
        }
    }
}

/// SQLite metric store
///
/// One row per (name, kind) in the `metrics` table.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
    retry: RetryPolicy,
    retriable: RetriableCodes,
}

impl SqliteStore {
    /// Open a store with default options
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use telemetry_store::storage::sqlite::SqliteStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteStore::new("./metrics.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::with_options(db_path, SqliteOptions::default()).await
    }

    /// Open a store
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create the `metrics` table
    /// 3. Configure SQLite for concurrent access (WAL mode)
    #[instrument(skip_all)]
    pub async fn with_options(
        db_path: impl AsRef<Path>,
        options: SqliteOptions,
    ) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite store at: {}", db_path_str);

        let connect_options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(options.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .connect_with(connect_options)
            .await
            .map_err(|e| StorageError::BackendUnavailable(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("SQLite store ready");

        Ok(Self {
            pool,
            db_path: db_path_str,
            retry: options.retry,
            retriable: options.retriable,
        })
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Run a database operation under the retry policy
    ///
    /// Exhausted retries escalate to `BackendUnavailable`, an elapsed
    /// deadline to `Timeout`.
    async fn with_retry<T, F, Fut>(&self, operation: &str, op: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        self.retry
            .run(|err| self.retriable.is_retriable(err), op)
            .await
            .map_err(|err| match err {
                RetryError::Permanent(e) => permanent_error(e),
                RetryError::Exhausted { attempts, last } => {
                    error!("{} failed after {} attempts: {}", operation, attempts, last);
                    StorageError::BackendUnavailable(format!(
                        "{} failed after {} attempts: {}",
                        operation, attempts, last
                    ))
                }
                RetryError::DeadlineExceeded(after) => {
                    error!("{} timed out after {:?}", operation, after);
                    StorageError::Timeout(after)
                }
            })
    }

    fn rows_to_metrics(rows: Vec<MetricRow>) -> StorageResult<StoreState> {
        let mut state = StoreState::new();
        for row in rows {
            let (kind, name, value) = row.into_value()?;
            state.entry(kind).or_default().insert(name, value);
        }
        Ok(state)
    }
}

/// Map a non-retriable sqlx error
///
/// A check violation can only come from the counter type check, i.e. an
/// overflowing counter sum.
fn permanent_error(err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
            StorageError::InvalidValue(format!("counter overflow: {}", db_err.message()))
        }
        _ => StorageError::from(err),
    }
}

/// Build the atomic upsert statement for one incoming value
fn upsert_query<'q>(
    name: &'q str,
    incoming: MetricValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match incoming {
        MetricValue::Gauge(value) => sqlx::query(UPSERT_GAUGE).bind(name).bind(value),
        MetricValue::Counter(delta) => sqlx::query(UPSERT_COUNTER).bind(name).bind(delta),
    }
}

#[async_trait]
impl MetricStore for SqliteStore {
    #[instrument(skip(self))]
    async fn update(&self, kind: &str, name: &str, raw: &str) -> StorageResult<()> {
        let kind = kind_from_code(kind)?;
        validate_name(name)?;
        let incoming = MetricValue::parse(kind, raw)?;

        self.with_retry("update", || upsert_query(name, incoming).execute(&self.pool))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, metric), fields(id = %metric.id, kind = %metric.kind))]
    async fn update_typed(&self, metric: &Metric) -> StorageResult<()> {
        let incoming = metric.incoming()?;

        self.with_retry("update", || {
            upsert_query(&metric.id, incoming).execute(&self.pool)
        })
        .await?;
        Ok(())
    }

    #[instrument(skip(self, metrics), fields(count = metrics.len()))]
    async fn update_batch(&self, metrics: &[Metric]) -> StorageResult<()> {
        if metrics.is_empty() {
            return Ok(());
        }

        let updates = metrics
            .iter()
            .map(|m| m.incoming().map(|value| (m.id.as_str(), value)))
            .collect::<StorageResult<Vec<_>>>()?;

        debug!("applying batch of {} updates", updates.len());

        self.with_retry("update_batch", || {
            let pool = &self.pool;
            let updates = &updates;
            async move {
                // Dropping `tx` on an error rolls the transaction back
                let mut tx = pool.begin().await?;
                for (name, incoming) in updates {
                    upsert_query(name, *incoming).execute(&mut *tx).await?;
                }
                tx.commit().await
            }
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get(&self, kind: MetricKind) -> StorageResult<KindMetrics> {
        let rows = self
            .with_retry("get", || {
                sqlx::query_as::<_, MetricRow>(
                    "SELECT name, kind, counter, gauge FROM metrics WHERE kind = ? ORDER BY name",
                )
                .bind(kind.code())
                .fetch_all(&self.pool)
            })
            .await?;

        let mut state = Self::rows_to_metrics(rows)?;
        Ok(state.remove(&kind).unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn get_all(&self) -> StorageResult<StoreState> {
        let rows = self
            .with_retry("get_all", || {
                sqlx::query_as::<_, MetricRow>(
                    "SELECT name, kind, counter, gauge FROM metrics ORDER BY kind, name",
                )
                .fetch_all(&self.pool)
            })
            .await?;

        Self::rows_to_metrics(rows)
    }

    #[instrument(skip(self))]
    async fn get_value(&self, kind: MetricKind, name: &str) -> StorageResult<MetricValue> {
        let row = self
            .with_retry("get_value", || {
                sqlx::query_as::<_, MetricRow>(
                    "SELECT name, kind, counter, gauge FROM metrics WHERE name = ? AND kind = ?",
                )
                .bind(name)
                .bind(kind.code())
                .fetch_optional(&self.pool)
            })
            .await?;

        let row = row.ok_or_else(|| StorageError::NotFound {
            kind: kind.code().to_string(),
            name: name.to_string(),
        })?;
        let (_, _, value) = row.into_value()?;
        Ok(value)
    }

    #[instrument(skip(self, state))]
    async fn set_all(&self, state: StoreState) -> StorageResult<()> {
        validate_state(&state)?;

        let rows: Vec<MetricRow> = state
            .into_iter()
            .flat_map(|(_, metrics)| metrics.into_iter())
            .map(|(name, value)| MetricRow::from_value(name, value))
            .collect();

        info!("replacing stored state with {} metrics", rows.len());

        self.with_retry("set_all", || {
            let pool = &self.pool;
            let rows = &rows;
            async move {
                // Dropping `tx` on an error rolls the transaction back
                let mut tx = pool.begin().await?;
                sqlx::query("DELETE FROM metrics").execute(&mut *tx).await?;
                for row in rows {
                    sqlx::query(INSERT_ROW)
                        .bind(&row.name)
                        .bind(&row.kind)
                        .bind(row.counter)
                        .bind(row.gauge)
                        .execute(&mut *tx)
                        .await?;
                }
                tx.commit().await
            }
        })
        .await
    }

    #[instrument(skip(self))]
    async fn ping(&self) -> StorageResult<()> {
        match tokio::time::timeout(PING_TIMEOUT, sqlx::query("SELECT 1").execute(&self.pool)).await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                warn!("ping failed: {}", e);
                Err(StorageError::BackendUnavailable(e.to_string()))
            }
            Err(_) => {
                warn!("ping timed out after {:?}", PING_TIMEOUT);
                Err(StorageError::BackendUnavailable(format!(
                    "ping timed out after {:?}",
                    PING_TIMEOUT
                )))
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite store");
        self.pool.close().await;
        Ok(())
    }
}
