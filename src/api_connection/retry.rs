//! Bounded retry with exponential backoff.
//!
//! Every failed attempt is retried the same way, whether the transport broke
//! or the endpoint answered with a non-success status. Attempts run strictly
//! one after another; there is no cancellation once a chain has started.
//!
//! The delay is injected through [`Sleeper`] so the schedule can be checked
//! without waiting on a real clock.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::connection::ApiConnectionError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub initial_delay: Duration,
    backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            ..Self::default()
        }
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Result<Self, ApiConnectionError> {
        if !multiplier.is_finite() || multiplier <= 1.0 {
            return Err(ApiConnectionError::InvalidRetryPolicy(format!(
                "backoff multiplier must be greater than 1, got {}",
                multiplier
            )));
        }
        self.backoff_multiplier = multiplier;
        Ok(self)
    }

    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    /// Delay before retry `k` (0-indexed): `initial_delay * multiplier^k`, saturating.
    pub fn delay_before_retry(&self, k: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(k.min(i32::MAX as u32) as i32);
        Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }
}

pub trait Sleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// Runs `attempt` until it succeeds or the retry budget is spent.
///
/// `attempt` receives the 1-based attempt number. On exhaustion the last
/// failure is wrapped in [`ApiConnectionError::RetriesExhausted`].
pub async fn fetch_with_retry<T, F, Fut, S>(
    policy: &RetryPolicy,
    sleeper: &S,
    mut attempt: F,
) -> Result<T, ApiConnectionError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ApiConnectionError>>,
    S: Sleeper,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let error = match attempt(attempts).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let retries_used = attempts - 1;
        if retries_used >= policy.max_retries {
            return Err(ApiConnectionError::RetriesExhausted {
                attempts,
                last_error: Box::new(error),
            });
        }

        let delay = policy.delay_before_retry(retries_used);
        warn!(
            attempt = attempts,
            retries_remaining = policy.max_retries - retries_used,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "request failed; retrying"
        );
        sleeper.sleep(delay).await;
    }
}
