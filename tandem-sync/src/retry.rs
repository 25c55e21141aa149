//! Bounded retries with exponential backoff.
//!
//! Record applies against either store go through [`RetryPolicy::execute`].
//! The scheduling helpers ([`RetryPolicy::next_retry_at`] and
//! [`is_retry_due`]) serve deferred retry bookkeeping that lives outside a
//! single run.

use crate::config::RetryConfig;
use chrono::{DateTime, Utc};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound for the delay computed by [`RetryPolicy::next_retry_at`].
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// How often and how patiently an operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    exponential: bool,
}

impl RetryPolicy {
    /// `max_retries` counts every attempt, the first included; values
    /// below one are raised to one.
    pub fn new(max_retries: u32, base_delay: Duration, exponential: bool) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay,
            exponential,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
            config.exponential,
        )
    }

    /// A policy that tries exactly once.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, false)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if !self.exponential || attempt <= 1 {
            return self.base_delay;
        }
        let factor = 1u32 << (attempt - 1).min(31);
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `operation` until it succeeds or the attempts run out, in which
    /// case the last error is returned unchanged.
    pub async fn execute<T, E, F, Fut>(&self, name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", name, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if attempt < self.max_retries => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        name, attempt, self.max_retries, delay, e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("{} failed after {} attempt(s): {}", name, attempt, e);
                    return Err(e);
                }
            }
        }
    }

    /// When an operation that has already failed `retry_count` times may be
    /// tried again: `from + base_delay * 2^retry_count`, capped at one hour.
    pub fn next_retry_at(&self, retry_count: u32, from: DateTime<Utc>) -> DateTime<Utc> {
        let factor = 1u32 << retry_count.min(31);
        let delay = self.base_delay.saturating_mul(factor).min(MAX_RETRY_BACKOFF);
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::hours(1));
        from + delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Whether a deferred retry scheduled for `next_retry_at` may run at `now`.
/// Entries without a schedule are always due.
pub fn is_retry_due(next_retry_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    next_retry_at.is_none_or(|at| at <= now)
}
