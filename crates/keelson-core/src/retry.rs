//! Backoff policy applied between connect attempts.

use std::time::Duration;

use keelson_proto::defaults::DEFAULT_RETRY_BASE;

/// Binary exponential backoff: `base`, `2 * base`, `4 * base`, ...
///
/// The strategy holds no per-connection state; callers pass in the number of
/// the attempt that just failed (starting at 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryStrategy {
    base: Duration,
    max_delay: Option<Duration>,
    limit: Option<u32>,
}

impl RetryStrategy {
    /// Unbounded binary exponential backoff starting at `base`.
    pub fn binary_exponential(base: Duration) -> Self {
        Self {
            base,
            max_delay: None,
            limit: None,
        }
    }

    /// Cap every delay at `max_delay`.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Give up after `limit` attempts.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    /// Whether another attempt may follow attempt number `attempt`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.limit.map_or(true, |limit| attempt < limit)
    }

    /// Delay to wait after attempt number `attempt` failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        let delay = self
            .base
            .checked_mul(1u32 << shift)
            .unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::binary_exponential(DEFAULT_RETRY_BASE)
    }
}
