use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Constant delay between two attempts
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

/// Error types that should trigger retries
pub trait RetryableError: std::error::Error {
    /// Check if this error should trigger a retry
    fn is_retryable(&self) -> bool;
}

/// The retry budget was spent, or a non-retryable error ended the loop early
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last: E,
}

/// Run `operation` until it succeeds or the attempt budget is spent.
///
/// Attempts are strictly sequential; attempt `k + 1` starts only after attempt `k`
/// failed and the backoff elapsed. The operation receives the 1-based attempt number.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retries");
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_retryable() {
                    debug!(attempt, error = %err, "Error is not retryable, aborting");
                    return Err(RetryExhausted { attempts: attempt, last: err });
                }
                if attempt >= max_attempts {
                    warn!(attempt, max_attempts, error = %err, "Retrier failed, giving up");
                    return Err(RetryExhausted { attempts: attempt, last: err });
                }
                warn!(
                    attempt,
                    max_attempts,
                    error = %err,
                    "Retrier failed, retrying in {:?}",
                    config.backoff
                );
                sleep(config.backoff).await;
                attempt += 1;
            }
        }
    }
}
