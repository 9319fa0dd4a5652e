//! Retry with exponential backoff for opening a completion stream
//!
//! Only the request phase is retried. Once the provider has answered with a
//! stream, a fault surfaces to the caller as is.

use std::time::{Duration, SystemTime};

/// Retry policy for completion requests
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first try
    pub max_retries: u32,
    /// Base delay between retries (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

/// Whether an HTTP status from the provider is worth retrying
#[must_use]
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Whether a transport error happened before any response arrived
#[must_use]
pub fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_connect() || (err.is_request() && !err.is_body() && !err.is_decode())
}

/// Compute the delay before the next retry attempt
///
/// `min(base_delay * 2^attempt + jitter, max_delay)` with 0-25% jitter taken
/// from the subsecond clock.
#[must_use]
pub fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(policy.max_delay);

    let jitter_nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();

    let jitter_fraction = f64::from(jitter_nanos % 250) / 1000.0;
    let jitter = base.mul_f64(jitter_fraction);

    (base + jitter).min(policy.max_delay)
}
