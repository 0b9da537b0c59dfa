//! Caller-side retry for transient conflicts
//!
//! The transfer handler reports serialization failures and deadlocks as
//! retryable errors and never retries on its own. Callers that want retries
//! wrap the call with [`retry_transient`].

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::LedgerResult;

/// Bounded retry with full-jitter exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Upper bound of the sleep before retry number `attempt` (0-based)
    pub fn backoff_cap(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Random sleep in `0..=backoff_cap(attempt)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let cap = self.backoff_cap(attempt).as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=cap))
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` is used up. The last error is returned unchanged.
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> LedgerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LedgerResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < max_attempts => {
                let delay = policy.backoff(attempt);
                attempt += 1;
                tracing::warn!(
                    "Transient conflict, retrying in {:?} (attempt {}/{}): {}",
                    delay,
                    attempt + 1,
                    max_attempts,
                    err
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
