//! Bounded retry loop with linear backoff.

use std::future::Future;
use std::time::Duration;

use super::error::ApiError;
use super::instrument::Logger;
use super::fields;

/// Attempt budget and backoff unit for one logical operation.
///
/// The wait after failed attempt `n` is `base_delay * n`, with no jitter and
/// no cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` below 1 is raised to 1.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Wait before the attempt that follows failed attempt `attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(attempt)
            .unwrap_or(Duration::MAX)
    }

    /// Runs `operation` until it succeeds, fails with an error that is not
    /// retry-eligible, or the attempt budget is spent.
    ///
    /// Attempts are strictly sequential. The error returned is the one from
    /// the last attempt, unmodified.
    pub async fn run<T, F, Fut>(&self, logger: &dyn Logger, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 1;
        loop {
            let err = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        logger.info("request succeeded after retry", &fields! { "attempt" => attempt });
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retry_eligible() {
                logger.debug(
                    "error is not retryable",
                    &fields! {
                        "attempt" => attempt,
                        "kind" => err.kind().as_str(),
                        "http_status" => err.http_status(),
                    },
                );
                return Err(err);
            }

            if attempt >= self.max_attempts {
                logger.warn(
                    "retries exhausted",
                    &fields! {
                        "attempts" => attempt,
                        "kind" => err.kind().as_str(),
                        "http_status" => err.http_status(),
                    },
                );
                return Err(err);
            }

            let delay = self.delay_after(attempt);
            logger.warn(
                "attempt failed, retrying",
                &fields! {
                    "attempt" => attempt,
                    "max_attempts" => self.max_attempts,
                    "kind" => err.kind().as_str(),
                    "http_status" => err.http_status(),
                    "delay_ms" => delay.as_millis() as u64,
                },
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}
