//! Retry policies.
//!
//! A policy only decides whether and when to try again. The executor owns
//! the loop and re-sends the same prepared request each time.

use crate::config::RetryConfig;
use crate::error::StorageError;
use std::fmt;
use std::time::Duration;

/// Decides whether a failed attempt is retried.
pub trait RetryPolicy: Send + Sync + fmt::Debug {
    /// Delay before the next attempt, or `None` to give up.
    ///
    /// `attempts` counts the attempts made so far, the failed one included.
    fn next_delay(&self, attempts: u32, error: &StorageError) -> Option<Duration>;
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn next_delay(&self, _attempts: u32, _error: &StorageError) -> Option<Duration> {
        None
    }
}

/// Retries retryable errors with a doubling delay.
///
/// A `Retry-After` from the service overrides the computed delay, still
/// bounded by `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialRetry {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ExponentialRetry {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for ExponentialRetry {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy for ExponentialRetry {
    fn next_delay(&self, attempts: u32, error: &StorageError) -> Option<Duration> {
        if attempts >= self.max_attempts || !error.is_retryable() {
            return None;
        }
        let delay = error.retry_after().unwrap_or_else(|| {
            let factor = 2u32.saturating_pow(attempts.saturating_sub(1));
            self.base_delay.saturating_mul(factor)
        });
        Some(delay.min(self.max_delay))
    }
}
