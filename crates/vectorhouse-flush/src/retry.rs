//! Retry with Exponential Backoff
//!
//! Shared retry loop for coordinator RPCs. Callers embed their error
//! classification inside the operation: returning `Ok` stops the loop, so
//! a "warn and accept" outcome is expressed by mapping the error to `Ok`
//! inside the closure rather than by policy flags here.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Attempt count and backoff curve for one retried operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
        }
    }
}

/// Run `op` until it succeeds or `max_attempts` is exhausted, sleeping an
/// exponentially growing backoff between attempts.
pub async fn retry<T, E, F, Fut>(config: RetryConfig, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = config.max_attempts.max(1);
    let mut backoff = Duration::from_millis(config.initial_backoff_ms);
    let max_backoff = Duration::from_millis(config.max_backoff_ms);

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt == attempts => {
                tracing::warn!(attempt, error = %e, "operation failed, retries exhausted");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(attempt, backoff_ms = backoff.as_millis() as u64, error = %e, "operation failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(max_backoff);
            }
        }
    }

    unreachable!()
}
