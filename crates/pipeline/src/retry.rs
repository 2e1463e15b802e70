use collect::CollectError;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Backoff steps for attempts 1..=4.
pub const DEFAULT_BACKOFF_SECS: [u64; 4] = [2, 4, 8, 16];

/// Errors that can tell whether another attempt might succeed.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for CollectError {
    fn is_transient(&self) -> bool {
        CollectError::is_transient(self)
    }
}

impl Retryable for anyhow::Error {
    fn is_transient(&self) -> bool {
        is_rate_limit_message(&format!("{:#}", self))
    }
}

/// Rate-limit or timeout wording in an error message.
pub fn is_rate_limit_message(text: &str) -> bool {
    let text = text.to_lowercase();
    [
        "rate_limit",
        "rate limit",
        "too many requests",
        "429",
        "overloaded",
        "timed out",
        "timeout",
    ]
    .iter()
    .any(|needle| text.contains(needle))
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    schedule: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_secs(DEFAULT_BACKOFF_SECS.len(), &DEFAULT_BACKOFF_SECS)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, schedule: Vec<Duration>) -> Self {
        Self {
            max_retries,
            schedule,
        }
    }

    pub fn from_secs(max_retries: usize, schedule_secs: &[u64]) -> Self {
        Self::new(
            max_retries,
            schedule_secs.iter().map(|s| Duration::from_secs(*s)).collect(),
        )
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Delay before retry number `attempt` (1-based). Past the end of the
    /// schedule the last step repeats.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        self.schedule
            .get(attempt.saturating_sub(1))
            .or_else(|| self.schedule.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Run `f`, retrying transient failures on the fixed schedule.
    /// Permanent failures and the last transient failure are returned as-is.
    pub async fn invoke<F, Fut, T, E>(&self, operation_name: &str, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut attempt = 0;

        loop {
            match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(e) if !e.is_transient() => {
                    warn!(
                        operation = operation_name,
                        error = %e,
                        "Operation failed with a permanent error"
                    );
                    return Err(e);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %e,
                            "Operation failed after max retries"
                        );
                        return Err(e);
                    }

                    let backoff = self.delay_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Rate limited, retrying"
                    );

                    sleep(backoff).await;
                }
            }
        }
    }
}
