//! HTTP tuning shared by transports: connection pool sizing and retry backoff.
//!
//! The per-request timeout is not set here; it comes from
//! [`DatoClientConfig::timeout`](crate::config::DatoClientConfig::timeout).

use std::time::Duration;

/// Records requested per page when a collection is fetched page by page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Seconds an idle pooled connection is kept open.
pub const DEFAULT_POOL_IDLE_TIMEOUT: u64 = 90;

/// Idle pooled connections kept per host.
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 10;

/// Re-sends after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Backoff before the first re-send, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Backoff ceiling, in milliseconds.
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 5000;

/// Exponential backoff for transient transport failures.
///
/// The delay doubles with every attempt until it reaches `max_delay`. Only transports
/// consult this policy; the dispatcher and paginator surface the first failure they see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Re-sends allowed after the first attempt
    pub max_retries: u32,
    /// Wait before the first re-send
    pub initial_delay: Duration,
    /// Upper bound for any single wait
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Three retries starting at 500ms, capped at 5s.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
        }
    }

    /// Set how many times a failed request is re-sent.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the wait before the first re-send.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Wait before re-send number `attempt` (1-based); zero for attempt 0.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let Some(exponent) = attempt.checked_sub(1) else {
            return Duration::ZERO;
        };
        let factor = 2u32.saturating_pow(exponent);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection and retry settings for an HTTP transport.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backoff for transient failures; the retry count is taken from the client config
    pub retry_policy: RetryPolicy,
    /// How long an idle pooled connection is kept
    pub pool_idle_timeout: Duration,
    /// Idle connections kept per host
    pub pool_max_idle_per_host: usize,
    /// Emit a `debug!` event for every request sent
    pub enable_logging: bool,
}

impl ClientConfig {
    /// Default pool sizing, default backoff, request logging on.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            retry_policy: RetryPolicy::new(),
            pool_idle_timeout: Duration::from_secs(DEFAULT_POOL_IDLE_TIMEOUT),
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            enable_logging: true,
        }
    }

    /// Replace the backoff policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
