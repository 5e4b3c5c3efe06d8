//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RetryConfig;

/// Retry policy shared by the provisioner and the TTL reconciler.
///
/// `max_attempts` counts the first attempt, so a policy with three attempts
/// sleeps at most twice.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Creates a policy from configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Total number of attempts.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Delay after failed attempt number `attempt` (1-based):
    /// `initial_delay * multiplier^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let seconds =
            self.config.initial_delay.as_secs_f64() * self.config.backoff_multiplier.powi(exponent);
        if !seconds.is_finite() || seconds >= self.config.max_delay.as_secs_f64() {
            return self.config.max_delay;
        }
        Duration::from_secs_f64(seconds.max(0.0))
    }

    /// Runs `operation` until it succeeds or the attempts are used up, and
    /// returns the last error in the latter case.
    pub async fn run<T, E, F, Fut>(&self, label: &str, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run_while(label, |_| true, operation).await
    }

    /// Like [`run`](Self::run), but gives up at once on an error for which
    /// `retryable` returns `false`.
    pub async fn run_while<T, E, R, F, Fut>(
        &self,
        label: &str,
        retryable: R,
        mut operation: F,
    ) -> Result<T, E>
    where
        R: Fn(&E) -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = label, attempts = attempt, "Succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(e) if attempt >= max_attempts => return Err(e),
                Err(e) if !retryable(&e) => {
                    warn!(
                        operation = label,
                        attempt = attempt,
                        error = %e,
                        "Attempt failed with a non-retryable error"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = label,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
