//! Bounded retry of fallible ledger calls.
//!
//! Only errors that [`LedgerError::is_retryable`] accepts are retried.
//! Validation, encoding and stale-ownership failures return immediately.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn, Instrument, Span};

use crate::error::{LedgerError, LedgerResult};

/// Delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// Doubles after each failed attempt, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the given failed attempt (0-indexed)
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
                base.checked_mul(factor).unwrap_or(max).min(max)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    span: Span,
}

impl RetryPolicy {
    /// `max_attempts` counts the first call; zero is treated as one.
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            span: Span::none(),
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, Backoff::Fixed(delay))
    }

    /// Events are emitted inside `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable
    /// error, or runs out of attempts. The last error is returned.
    pub async fn run<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        let max_attempts = self.max_attempts;
        let backoff = self.backoff;

        async move {
            let mut attempt = 0;
            loop {
                let err = match operation().await {
                    Ok(value) => {
                        if attempt > 0 {
                            debug!(operation = operation_name, attempts = attempt + 1, "succeeded after retry");
                        }
                        return Ok(value);
                    }
                    Err(err) => err,
                };

                if !err.is_retryable() {
                    debug!(operation = operation_name, error = %err, "not retrying");
                    return Err(err);
                }

                attempt += 1;
                if attempt >= max_attempts {
                    warn!(operation = operation_name, attempts = attempt, error = %err, "all attempts failed");
                    return Err(err);
                }

                let delay = backoff.delay(attempt - 1);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                sleep(delay).await;
            }
        }
        .instrument(self.span.clone())
        .await
    }
}

impl Default for RetryPolicy {
    /// Twenty attempts ten seconds apart.
    fn default() -> Self {
        Self::fixed(20, Duration::from_secs(10))
    }
}

/// Wraps `operation` with `policy`; see [`RetryPolicy::run`].
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, operation_name: &str, operation: F) -> LedgerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LedgerResult<T>>,
{
    policy.run(operation_name, operation).await
}
