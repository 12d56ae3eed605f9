//! Retry with exponential backoff
//!
//! `RetryPolicy` is independent of any database client: it runs an async
//! operation, asks a predicate whether a failure is retriable, and sleeps
//! with exponential backoff between attempts. An optional overall deadline
//! bounds the whole sequence, backoff sleeps included.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Default number of attempts (the first try included)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// SQLite result codes treated as transient by default
///
/// BUSY (5), LOCKED (6), BUSY_RECOVERY (261), LOCKED_SHAREDCACHE (262),
/// BUSY_SNAPSHOT (517), BUSY_TIMEOUT (773).
pub const DEFAULT_RETRIABLE_CODES: [&str; 6] = ["5", "6", "261", "262", "517", "773"];

/// Upper bound for a single backoff sleep
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Why a retried operation finally failed
#[derive(Debug)]
pub enum RetryError<E> {
    /// A non-retriable error, returned on first occurrence
    Permanent(E),

    /// Every attempt failed with a retriable error
    Exhausted { attempts: u32, last: E },

    /// The overall deadline elapsed before the operation succeeded
    DeadlineExceeded(Duration),
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Permanent(err) => write!(f, "{}", err),
            RetryError::Exhausted { attempts, last } => {
                write!(f, "giving up after {} attempts: {}", attempts, last)
            }
            RetryError::DeadlineExceeded(after) => write!(f, "deadline of {:?} exceeded", after),
        }
    }
}

/// Exponential backoff policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included (minimum 1)
    pub max_attempts: u32,

    /// Sleep before the first retry; doubles on every further retry
    pub initial_delay: Duration,

    /// Overall deadline for all attempts and sleeps
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Backoff before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(MAX_DELAY)
    }

    /// Run `op` until it succeeds, fails permanently, or the policy gives up
    pub async fn run<T, E, F, Fut, P>(&self, is_retriable: P, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: fmt::Display,
    {
        let attempts = self.attempt_loop(is_retriable, op);

        match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, attempts)
                .await
                .unwrap_or_else(|_| {
                    warn!("operation deadline of {:?} exceeded", deadline);
                    Err(RetryError::DeadlineExceeded(deadline))
                }),
            None => attempts.await,
        }
    }

    async fn attempt_loop<T, E, F, Fut, P>(
        &self,
        is_retriable: P,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("operation succeeded on attempt {}", attempt);
                    }
                    return Ok(value);
                }
                Err(err) if !is_retriable(&err) => return Err(RetryError::Permanent(err)),
                Err(err) if attempt >= max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        ?delay,
                        "retriable error: {}, retrying",
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
