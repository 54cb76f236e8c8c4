//! Retry logic with exponential backoff
//!
//! [`with_retry`] runs a bounded loop. Each attempt reports an [`Attempt`]:
//! a value, a fatal error, or a retryable error with its wait. The loop
//! owns the rule that the last attempt's error is returned instead of
//! sleeping again.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use tokio::time::sleep;
use tracing::debug;

use crate::Error;
use crate::config::RetryConfig;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first
    pub max_attempts: u32,
    /// `Retry-After` fallback in seconds
    pub default_retry_after: u64,
    /// Length of one backoff second
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Create from config
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            default_retry_after: config.default_retry_after,
            backoff_unit: config.backoff_unit,
        }
    }

    /// Same policy with a different attempt budget
    #[must_use]
    pub fn with_max_attempts(&self, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..self.clone()
        }
    }

    /// Exponential schedule for network failures: `2^1, 2^2, ...` backoff
    /// units, one step per retry
    #[must_use]
    pub fn create_backoff(&self) -> impl Iterator<Item = Duration> + use<> {
        let steps = self.max_attempts.max(1);
        ExponentialBuilder::default()
            .with_min_delay(self.backoff_unit * 2)
            .with_max_delay(self.backoff_unit.saturating_mul(2u32.saturating_pow(steps)))
            .with_factor(2.0)
            .with_max_times(steps as usize)
            .build()
    }

    /// Wait for a `Retry-After` of `seconds`
    #[must_use]
    pub fn retry_after_delay(&self, seconds: u64) -> Duration {
        self.backoff_unit
            .saturating_mul(u32::try_from(seconds).unwrap_or(u32::MAX))
    }
}

/// Result of a single attempt
#[derive(Debug)]
pub enum Attempt<T> {
    /// Finished successfully
    Done(T),
    /// Failed; retrying won't help
    Fatal(Error),
    /// Failed; retry after the given wait
    RetryAfter(Duration, Error),
    /// Failed; retry after the next exponential backoff step
    Backoff(Error),
}

/// Execute an attempt function with retry logic.
///
/// `f` receives the 1-based attempt number.
///
/// # Errors
///
/// Returns the fatal error of an attempt, or the error of the last attempt
/// once `policy.max_attempts` is reached.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, name: &str, mut f: F) -> Result<T, Error>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.create_backoff();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let (error, delay) = match f(attempt).await {
            Attempt::Done(value) => return Ok(value),
            Attempt::Fatal(e) => return Err(e),
            Attempt::RetryAfter(delay, e) => (e, delay),
            Attempt::Backoff(e) => match backoff.next() {
                Some(delay) => (e, delay),
                None => return Err(e),
            },
        };

        if attempt >= max_attempts {
            debug!(operation = name, attempts = attempt, "Max retry attempts reached");
            return Err(error);
        }

        debug!(
            operation = name,
            attempt = attempt,
            delay_ms = delay.as_millis(),
            error = %error,
            "Retrying after backoff"
        );
        sleep(delay).await;
    }
}
