use crate::{LastFmError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// When to stop retrying a failing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    /// Give up once the next wait would push total time past this ceiling
    MaxElapsed(Duration),
    /// Give up after this many attempts in total (first call included)
    MaxAttempts(u32),
    /// Never retry
    Disabled,
}

/// Exponential backoff policy for remote calls.
///
/// Each call to [`retry_with_backoff`] starts its own backoff sequence; nothing is
/// shared between calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Factor applied to the delay after each retry
    pub multiplier: u32,
    /// Maximum delay cap
    pub max_delay: Duration,
    pub limit: RetryLimit,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 2,
            max_delay: Duration::from_secs(60),
            limit: RetryLimit::MaxElapsed(Duration::from_secs(60 * 60)),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with retries disabled
    pub fn disabled() -> Self {
        Self {
            limit: RetryLimit::Disabled,
            ..Default::default()
        }
    }

    /// Create a policy bounded by attempt count instead of elapsed time
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            limit: if max_attempts > 1 {
                RetryLimit::MaxAttempts(max_attempts)
            } else {
                RetryLimit::Disabled
            },
            ..Default::default()
        }
    }

    /// Create a policy with custom delays
    pub fn with_delays(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            ..Default::default()
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        delay.saturating_mul(self.multiplier).min(self.max_delay)
    }

    fn allows(&self, attempts: u32, elapsed: Duration, delay: Duration) -> bool {
        match self.limit {
            RetryLimit::Disabled => false,
            RetryLimit::MaxAttempts(max) => attempts < max,
            RetryLimit::MaxElapsed(ceiling) => elapsed + delay <= ceiling,
        }
    }
}

/// Result of a retry operation with context
#[derive(Debug)]
pub struct RetryResult<T> {
    /// The successful result
    pub result: T,
    /// Number of retry attempts made
    pub attempts_made: u32,
    /// Total time spent waiting between attempts
    pub total_retry_time: Duration,
}

/// Execute an async operation, retrying transient failures with exponential backoff.
///
/// Failures for which [`LastFmError::is_retryable`] is false propagate immediately.
/// Transient failures are retried until the policy's limit is reached, after which
/// the last error propagates.
///
/// # Arguments
/// * `policy` - Backoff configuration
/// * `operation_name` - Name of the operation for logging
/// * `operation` - Async function that returns a Result
/// * `on_retry` - Called with the upcoming delay and the error before each wait
pub async fn retry_with_backoff<T, F, Fut, OnRetry>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
    mut on_retry: OnRetry,
) -> Result<RetryResult<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    OnRetry: FnMut(Duration, &LastFmError),
{
    let started = Instant::now();
    let mut retries = 0;
    let mut total_retry_time = Duration::ZERO;
    let mut delay = policy.base_delay.min(policy.max_delay);

    loop {
        let error = match operation().await {
            Ok(result) => {
                return Ok(RetryResult {
                    result,
                    attempts_made: retries,
                    total_retry_time,
                });
            }
            Err(e) if e.is_retryable() => e,
            Err(e) => return Err(e),
        };

        let wait = match error {
            LastFmError::RateLimit { retry_after } => {
                delay.max(Duration::from_secs(retry_after)).min(policy.max_delay)
            }
            _ => delay,
        };

        if !policy.allows(retries + 1, started.elapsed(), wait) {
            log::warn!(
                "Giving up on {operation_name} after {} attempts: {error}",
                retries + 1
            );
            return Err(error);
        }

        log::info!(
            "{operation_name} failed ({error}). Waiting {}s before retry {}",
            wait.as_secs_f64(),
            retries + 1
        );
        on_retry(wait, &error);

        tokio::time::sleep(wait).await;
        retries += 1;
        total_retry_time += wait;
        delay = policy.next_delay(delay);
    }
}

/// Simplified retry function for callers that only need the value
pub async fn retry_operation<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with_backoff(policy, operation_name, operation, |delay, error| {
        log::debug!("{operation_name}: waiting {delay:?} after {error}");
    })
    .await
    .map(|r| r.result)
}
