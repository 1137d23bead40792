//! Retry policy with exponential backoff
//!
//! Transient failures are retried with capped exponential backoff against a
//! session-wide budget; logical failures fail immediately. Once the budget
//! is spent the last transient error is wrapped in `SessionExhausted` so
//! callers keep the underlying cause.

use crate::config::SessionConfig;
use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff parameters for one session
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy with explicit delays
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Build the policy from session configuration
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            Duration::from_millis(config.retry_base_delay_ms),
            Duration::from_millis(config.retry_max_delay_ms),
        )
    }

    /// Backoff delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(20);
        let delay_ms = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay_ms).min(self.max_delay)
    }

    /// Run `operation` with retries drawn from `budget`
    ///
    /// `budget` is shared across all operations of a session: every retry
    /// decrements it, and a transient failure with no budget left returns
    /// `SessionExhausted` carrying the attempt count of this call and the
    /// last error.
    pub async fn run<T, F, Fut>(
        &self,
        budget: &mut u32,
        operation: &str,
        mut f: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;

        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("{} succeeded after {} retries", operation, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && *budget > 0 => {
                    let delay = self.delay_for(attempt);
                    *budget -= 1;
                    warn!(
                        "{} failed transiently ({}); retrying in {:?}, {} retries left",
                        operation, e, delay, budget
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(Error::SessionExhausted {
                        attempts: attempt + 1,
                        source: Box::new(e),
                    });
                }
                // Logical errors will not succeed on retry.
                Err(e) => return Err(e),
            }
        }
    }
}
