//! Retry with exponential backoff
//!
//! Every attempt runs under a timeout and races the caller's cancellation
//! token. Only errors classified by [`RepoError::is_retryable`] are retried.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{RepoError, Result};

/// Backoff parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Upper bound for a single attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

/// Value produced by [`RetryPolicy::run`] together with attempt accounting
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub attempts: u32,
    pub elapsed: Duration,
}

impl RetryPolicy {
    /// Total number of attempts
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = self.backoff_factor.max(1.0);
        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * factor.powi(exponent);
        let max = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Upper bound of the time spent before giving up
    pub fn worst_case(&self) -> Duration {
        let delays: Duration = (1..=self.max_retries).map(|n| self.delay_for(n)).sum();
        delays + self.attempt_timeout * self.attempts()
    }

    /// Run `op` until it succeeds, fails permanently, exhausts its attempts
    /// or `cancel` fires. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        label: &str,
        mut op: F,
    ) -> Result<RetryOutcome<T>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RepoError::Cancelled),
                result = tokio::time::timeout(self.attempt_timeout, op(attempt)) => result,
            };

            let err = match result {
                Ok(Ok(value)) => {
                    return Ok(RetryOutcome {
                        value,
                        attempts: attempt,
                        elapsed: started.elapsed(),
                    });
                }
                Ok(Err(e)) => e,
                Err(_) => RepoError::Timeout {
                    message: format!(
                        "{} did not complete within {:?}",
                        label, self.attempt_timeout
                    ),
                },
            };

            if !err.is_retryable() || attempt >= self.attempts() {
                return Err(err);
            }

            let delay = self.delay_for(attempt);
            tracing::debug!(
                label,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying after transient failure"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RepoError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
