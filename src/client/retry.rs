use std::time::Duration;

use reqwest::Method;
use reqwest::header::{HeaderMap, RETRY_AFTER};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 0.8;
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(120);
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Chat completions are retried even though POST is not idempotent.
const RETRYABLE_METHODS: [Method; 7] = [
    Method::HEAD,
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
    Method::TRACE,
];

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub max_backoff: Duration,
    pub retryable_statuses: Vec<u16>,
    pub retryable_methods: Vec<Method>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BACKOFF_FACTOR)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_factor: f64) -> Self {
        let backoff_factor = if backoff_factor.is_finite() && backoff_factor > 0.0 {
            backoff_factor
        } else {
            0.0
        };

        Self {
            max_retries,
            backoff_factor,
            max_backoff: DEFAULT_MAX_BACKOFF,
            retryable_statuses: RETRYABLE_STATUSES.to_vec(),
            retryable_methods: RETRYABLE_METHODS.to_vec(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn allows_method(&self, method: &Method) -> bool {
        self.retryable_methods.contains(method)
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Delay to wait before `attempt` (1-based). The first attempt never waits;
    /// attempt `n` waits `backoff_factor * 2^(n-2)` seconds, capped at `max_backoff`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt < 2 || self.backoff_factor == 0.0 {
            return Duration::ZERO;
        }

        let exponent = (attempt - 2).min(63) as i32;
        let secs = self.backoff_factor * 2f64.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// A `Retry-After: <seconds>` header on a retryable response replaces the
    /// computed delay.
    pub fn delay_after_response(&self, attempt: u32, headers: &HeaderMap) -> Duration {
        retry_after(headers)
            .map(|delay| delay.min(self.max_backoff))
            .unwrap_or_else(|| self.delay_before(attempt))
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
