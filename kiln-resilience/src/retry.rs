//! Retry policy and executor

use log::{debug, info, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::backoff::ExponentialBackoff;

/// Exponential retry policy for backplane mutations
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Randomization fraction applied to each delay (0.0 disables jitter)
    pub jitter: f64,
}

impl RetryPolicy {
    /// 100ms doubling to 5s, 10% jitter, 5 attempts
    pub fn backplane() -> Self {
        Self::exponential(Duration::from_millis(100), Duration::from_millis(5000), 2.0, 0.1, 5)
    }

    pub fn exponential(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            multiplier,
            jitter,
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.initial_delay, self.max_delay, self.multiplier, self.jitter)
    }
}

/// Errors that classify themselves as transient
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Runs a fallible call under a [`RetryPolicy`]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Call `f` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget runs out; the last error is returned in either failure case
    pub async fn execute<F, Fut, T, E>(&self, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let backoff = self.policy.backoff();
        let mut attempt = 1;

        loop {
            debug!("Executing attempt {} of {}", attempt, self.policy.max_attempts);

            let error = match f().await {
                Ok(result) => {
                    if attempt > 1 {
                        info!("Operation succeeded after {} attempts", attempt);
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                warn!("Operation failed with non-retryable error: {}", error);
                return Err(RetryError::NonRetryableError(error));
            }

            if attempt >= self.policy.max_attempts {
                warn!("Operation failed after {} attempts: {}", attempt, error);
                return Err(RetryError::MaxAttemptsExceeded {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = backoff.delay(attempt);
            warn!("Attempt {} failed: {}. Retrying in {:?}", attempt, error, delay);
            sleep(delay).await;
            attempt += 1;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("Maximum retry attempts ({attempts}) exceeded. Last error: {last_error}")]
    MaxAttemptsExceeded { attempts: u32, last_error: E },

    #[error("Non-retryable error: {0}")]
    NonRetryableError(E),
}

impl<E> RetryError<E> {
    /// The last error the call produced
    pub fn into_inner(self) -> E {
        match self {
            RetryError::MaxAttemptsExceeded { last_error, .. } => last_error,
            RetryError::NonRetryableError(error) => error,
        }
    }
}
