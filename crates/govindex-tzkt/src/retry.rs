//! Exponential backoff retry policy with server-hint override.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of tries, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on every further retry.
    pub base_delay: Duration,
    /// Upper bound on computed backoff. A `Retry-After` hint is not capped.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Stateless retry policy: computes the next delay given the attempt number.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay to wait after try `attempt` (0-based) failed, or `None` when the
    /// attempt ceiling is reached.
    ///
    /// `retry_after` is the server's hint and wins over computed backoff;
    /// otherwise the delay is `base_delay * 2^attempt`, capped at `max_delay`.
    pub fn next_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Option<Duration> {
        if attempt + 1 >= self.config.max_attempts {
            return None;
        }
        if let Some(hint) = retry_after {
            return Some(hint);
        }
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let backoff = self.config.base_delay.saturating_mul(factor);
        Some(backoff.min(self.config.max_delay))
    }

    /// Returns `true` for HTTP statuses worth retrying (429 and 5xx).
    pub fn is_retryable_status(status: u16) -> bool {
        status == 429 || (500..600).contains(&status)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
