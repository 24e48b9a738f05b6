//! Backoff for cloud submissions and log throttling for status polls.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff schedule for transient failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each one after.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Name used in log lines.
    pub operation: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            operation: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before retry number `retry` (zero based).
    fn backoff(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails with an error `is_transient`
/// rejects, or `config.max_retries` retries are used up. The last error is
/// returned unchanged.
pub async fn retry_transient<F, Fut, T, E, P>(
    config: &RetryConfig,
    is_transient: P,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut retry = 0u32;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !is_transient(&err) {
            return Err(err);
        }
        if retry == config.max_retries {
            if retry > 0 {
                warn!(operation = %config.operation, attempts = retry + 1, "Giving up: {}", err);
            }
            return Err(err);
        }

        let delay = config.backoff(retry);
        debug!(
            operation = %config.operation,
            attempt = retry + 1,
            ?delay,
            "Transient failure, retrying: {}", err
        );
        tokio::time::sleep(delay).await;
        retry += 1;
    }
}

/// Counts consecutive failures and stops logging them after `limit` in a row.
#[derive(Debug)]
pub struct ErrorStreak {
    count: u32,
    limit: u32,
}

impl ErrorStreak {
    pub fn new(limit: u32) -> Self {
        Self { count: 0, limit }
    }

    /// Count a failure. Returns `true` while the streak is short enough to log.
    pub fn fail(&mut self) -> bool {
        self.count += 1;
        if self.count == self.limit + 1 {
            debug!(limit = self.limit, "Further consecutive failures are not logged");
        }
        self.count <= self.limit
    }

    /// End the streak. Returns how long it was.
    pub fn reset(&mut self) -> u32 {
        std::mem::take(&mut self.count)
    }

    /// Whether failures were dropped from the log during this streak.
    pub fn suppressed(&self) -> bool {
        self.count > self.limit
    }
}
