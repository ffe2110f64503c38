//! Retry loop with exponential backoff

use std::future::Future;

use ferry_connection::BackoffStrategy;
use ferry_core::{FerryError, Result};
use tokio_util::sync::CancellationToken;

/// How many times to try, and how long to wait in between
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffStrategy,
}

impl RetryPolicy {
    /// Waits `base_ms × 2^n` before retry `n + 1`, capped at `max_ms`
    pub fn new(max_attempts: u32, base_ms: u64, max_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: BackoffStrategy::new(base_ms, max_ms),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> &BackoffStrategy {
        &self.backoff
    }
}

/// A value and the number of attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub attempts: u32,
}

/// The last error once retrying stopped
#[derive(Debug, thiserror::Error)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct RetryFailure {
    pub error: FerryError,
    pub attempts: u32,
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempts are used up.
///
/// `operation` receives the one-based attempt number. Cancellation during a
/// backoff delay ends the loop with `FerryError::Cancelled`.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    mut operation: F,
) -> std::result::Result<RetryOutcome<T>, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        if token.is_cancelled() {
            return Err(RetryFailure {
                error: FerryError::Cancelled,
                attempts: attempt,
            });
        }
        attempt += 1;

        let error = match operation(attempt).await {
            Ok(value) => {
                return Ok(RetryOutcome {
                    value,
                    attempts: attempt,
                });
            }
            Err(error) => error,
        };

        if !error.is_retryable() || attempt >= policy.max_attempts {
            return Err(RetryFailure {
                error,
                attempts: attempt,
            });
        }

        let delay = policy.backoff.calculate_delay(attempt - 1);
        tracing::warn!(
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "attempt failed, retrying"
        );
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                return Err(RetryFailure {
                    error: FerryError::Cancelled,
                    attempts: attempt,
                });
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests;
