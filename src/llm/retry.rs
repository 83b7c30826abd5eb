//! Retry policy for rate-limited and flaky model API calls.

use std::time::Duration;

/// Default number of retries after a 429 response.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default number of retries after a transient network error.
pub const DEFAULT_NETWORK_RETRIES: u32 = 2;

/// Base delay for exponential backoff.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Maximum delay between attempts.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(10);

/// How often and how long to back off before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub network_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            network_retries: DEFAULT_NETWORK_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl RetryPolicy {
    /// Fail on the first error.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            network_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// A server-provided Retry-After wins but is still capped.
    pub fn delay(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        match retry_after_secs {
            Some(secs) => Duration::from_secs(secs).min(self.backoff_max),
            None => calculate_backoff(attempt, self.backoff_base, self.backoff_max),
        }
    }
}

/// Whether a reqwest error is worth retrying.
///
/// Connection failures, timeouts, interrupted bodies and 502/503/504 are.
pub fn is_transient_network_error(error: &reqwest::Error) -> bool {
    if error.is_connect() || error.is_timeout() || error.is_body() {
        return true;
    }

    error
        .status()
        .is_some_and(|status| matches!(status.as_u16(), 502..=504))
}

/// Retry-After header in whole seconds, if present and numeric.
pub fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// min(base * 2^attempt + base/2, max)
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt));
    exponential.saturating_add(base / 2).min(max)
}
