//! Retry with exponential backoff for queue calls
//!
//! Long-running tasks wrap their queue calls in [`with_retry`] so a briefly
//! unavailable store (a locked database file, a full disk that clears) does
//! not kill the task. Errors that are not transient return immediately.

use crate::config::QueueConfig;
use crate::QueueResult;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.transient_retries)
    }

    /// Delay before retry number `attempt` (1-based)
    fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

/// Runs a queue operation, retrying transient failures with backoff
///
/// Returns the last error once the retries are spent.
pub async fn with_retry<T, F>(config: &RetryConfig, mut operation: F) -> QueueResult<T>
where
    F: FnMut() -> QueueResult<T>,
{
    let mut attempt = 0;

    loop {
        match operation() {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt, "Queue operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                attempt += 1;
                let delay = config.calculate_delay(attempt);
                warn!(
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Queue operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
