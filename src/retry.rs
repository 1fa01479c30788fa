use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::config::{DEFAULT_UPSERT_MAX_ATTEMPTS, DEFAULT_UPSERT_RETRY_DELAY_MS};

/// Fixed-delay retry for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included. Never below 1.
    pub max_attempts: u32,
    /// Wait between consecutive attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it succeeds or `max_attempts` is used up. `op` receives
    /// the 1-based attempt number and must build a fresh attempt each call.
    /// The last error is returned unchanged.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => {
                    error!(attempt, "{what} failed after {attempt} attempts: {e}");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        attempt,
                        "{what} attempt {attempt} failed: {e}, retrying in {}ms",
                        self.delay.as_millis()
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(
            DEFAULT_UPSERT_MAX_ATTEMPTS,
            Duration::from_millis(DEFAULT_UPSERT_RETRY_DELAY_MS),
        )
    }
}
