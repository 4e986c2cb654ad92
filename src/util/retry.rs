//! Retry of rate-limited requests using the server's delay hint.

use std::future::Future;
use std::time::Duration;

use crate::error::{AgentError, Result};

/// Retry policy for opening a provider stream.
///
/// Only `RateLimited` errors that carry a delay hint within `max_delay` are
/// retried; everything else is returned as-is.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Longest server-requested delay we are willing to wait.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            max_delay,
        }
    }

    /// Delay before retrying after `err`, or `None` to give up.
    pub fn delay_for(&self, err: &AgentError) -> Option<Duration> {
        match err {
            AgentError::RateLimited {
                retry_after_ms: Some(ms),
            } => {
                let delay = Duration::from_millis(*ms);
                (delay <= self.max_delay).then_some(delay)
            }
            _ => None,
        }
    }

    /// Execute an async operation with retry.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let delay = match self.delay_for(&err) {
                        Some(delay) if attempt < self.max_attempts => delay,
                        _ => return Err(err),
                    };
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "rate limited, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
