//! Bounded retry with exponential backoff for provider calls.
//!
//! Embedding and completion requests share one policy: a call is re-issued only while its
//! error is classified transient (network failure, timeout, 429/5xx) and the attempt budget
//! has not been exhausted. Non-transient errors propagate immediately.

use std::future::Future;
use std::time::Duration;

/// Retry policy applied uniformly to retryable provider calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after every further failure.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Run `operation` until it succeeds, fails terminally, or the attempt budget runs out.
    ///
    /// `is_transient` decides whether an error is worth another attempt.
    pub async fn run<T, E, F, Fut, P>(&self, mut operation: F, is_transient: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let budget = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < budget && is_transient(&error) => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    tracing::warn!(
                        attempt,
                        max_attempts = budget,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient provider error; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
