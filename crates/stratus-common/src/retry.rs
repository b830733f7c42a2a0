//! Retry logic and exponential backoff for broker-facing operations.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one)
    pub max_attempts: u32,

    /// Initial retry delay
    pub initial_delay: Duration,

    /// Maximum retry delay
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f32,

    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f32,

    /// Retry timeout (total time across all attempts)
    pub timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Exponential backoff implementation
pub struct ExponentialBackoff {
    config: RetryConfig,
    attempt: u32,
    start_time: Instant,
}

impl ExponentialBackoff {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempt: 0,
            start_time: Instant::now(),
        }
    }

    /// Whether another attempt fits within the attempt cap and the deadline.
    pub fn should_retry(&self) -> bool {
        self.attempt < self.config.max_attempts
            && self.start_time.elapsed() < self.config.timeout
    }

    /// Calculate delay for the next retry
    pub fn next_delay(&mut self) -> Duration {
        self.attempt += 1;

        let base_delay = Duration::from_millis(
            (self.config.initial_delay.as_millis() as f32
                * self.config.backoff_multiplier.powi(self.attempt as i32 - 1))
                as u64,
        );

        let capped_delay = base_delay.min(self.config.max_delay);

        // Jitter to avoid thundering herd
        let jitter = if self.config.jitter_factor > 0.0 {
            let jitter_ms = (capped_delay.as_millis() as f32 * self.config.jitter_factor) as u64;
            Duration::from_millis(fastrand::u64(0..=jitter_ms))
        } else {
            Duration::ZERO
        };

        capped_delay + jitter
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Retry an async operation with exponential backoff.
///
/// `should_retry` classifies errors; anything it rejects is returned
/// immediately. On exhaustion the last underlying error is returned
/// unchanged so callers can inspect the terminal cause.
pub async fn retry_async<F, Fut, T, E>(
    config: RetryConfig,
    operation_name: &str,
    should_retry: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut backoff = ExponentialBackoff::new(config);

    loop {
        match operation().await {
            Ok(result) => {
                if backoff.attempt() > 0 {
                    debug!(
                        operation = operation_name,
                        attempts = backoff.attempt() + 1,
                        elapsed = ?backoff.elapsed(),
                        "Operation succeeded after retries"
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if !should_retry(&error) || !backoff.should_retry() {
                    return Err(error);
                }

                let delay = backoff.next_delay();
                warn!(
                    operation = operation_name,
                    attempt = backoff.attempt(),
                    max_attempts = backoff.config.max_attempts,
                    error = %error,
                    "Operation failed, retrying in {:?}",
                    delay
                );
                sleep(delay).await;
            }
        }
    }
}

/// Retry an async operation a fixed number of times with a fixed delay.
pub async fn retry_fixed<F, Fut, T, E>(
    max_attempts: u32,
    delay: Duration,
    operation_name: &str,
    should_retry: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if attempt >= max_attempts.max(1) || !should_retry(&error) {
                    return Err(error);
                }
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    error = %error,
                    "Operation failed, retrying"
                );
                if !delay.is_zero() {
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn no_jitter_config() -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_exponential_backoff_calculation() {
        let mut backoff = ExponentialBackoff::new(no_jitter_config());

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_caps_at_max_delay() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(1),
            jitter_factor: 0.0,
            ..Default::default()
        };
        let mut backoff = ExponentialBackoff::new(config);
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_retry_async_eventual_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let config = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            jitter_factor: 0.0,
            ..Default::default()
        };

        let result: Result<&str, Error> =
            retry_async(config, "test_operation", Error::is_retryable, || {
                let count = counter_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count < 2 {
                        Err(Error::Transient("simulated failure".into()))
                    } else {
                        Ok("success")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_async_returns_last_error_unchanged() {
        let config = RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            jitter_factor: 0.0,
            ..Default::default()
        };

        let result: Result<(), Error> =
            retry_async(config, "test_operation", Error::is_retryable, || async {
                Err(Error::Transient("persistent failure".into()))
            })
            .await;

        match result.unwrap_err() {
            Error::Transient(msg) => assert_eq!(msg, "persistent failure"),
            other => panic!("expected the underlying error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_retry_async_gives_up_on_non_retryable() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<(), Error> = retry_async(
            RetryConfig::default(),
            "test_operation",
            Error::is_retryable,
            || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::TopicExists("orders".into())) }
            },
        )
        .await;

        assert!(matches!(result.unwrap_err(), Error::TopicExists(_)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_fixed_attempt_cap() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<(), Error> = retry_fixed(
            4,
            Duration::ZERO,
            "test_operation",
            Error::is_retryable,
            || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Transient("nope".into())) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}
