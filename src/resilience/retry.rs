//! Retry Logic
//!
//! Bounded exponential backoff for transient token endpoint failures.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::warn;

use crate::error::AuthError;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Extra attempts after the first one fails with a transient error.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        DEFAULT_RETRY_CONFIG
    }
}

/// Default retry configuration.
pub const DEFAULT_RETRY_CONFIG: RetryConfig = RetryConfig {
    max_retries: 1,
    base_delay: Duration::from_secs(1),
    max_delay: Duration::from_secs(30),
};

/// Retry statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryStats {
    pub total_attempts: u32,
    pub successful_retries: u32,
    pub failed_operations: u32,
}

/// Retry executor.
pub struct RetryExecutor {
    config: RetryConfig,
    stats: Mutex<RetryStats>,
}

impl RetryExecutor {
    /// Create new retry executor.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            stats: Mutex::new(RetryStats::default()),
        }
    }

    /// `base * 2^attempt`, capped at `max_delay`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.config
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.config.max_delay)
            .min(self.config.max_delay)
    }

    /// Run `operation`, retrying errors for which
    /// [`AuthError::is_retryable`] holds, at most `max_retries` times.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, AuthError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, AuthError>>,
    {
        let mut attempt = 0;

        loop {
            self.update_stats(|stats| stats.total_attempts += 1);

            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        self.update_stats(|stats| stats.successful_retries += 1);
                    }
                    return Ok(result);
                }
                Err(error) if error.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.calculate_delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying token request after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    self.update_stats(|stats| stats.failed_operations += 1);
                    return Err(error);
                }
            }
        }
    }

    /// Get retry statistics.
    pub fn get_stats(&self) -> RetryStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_stats(&self, update: impl FnOnce(&mut RetryStats)) {
        update(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.base_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_calculate_delay_doubles_and_caps() {
        let executor = RetryExecutor::default();
        assert_eq!(executor.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(executor.calculate_delay(1), Duration::from_secs(2));
        assert_eq!(executor.calculate_delay(3), Duration::from_secs(8));
        assert_eq!(executor.calculate_delay(10), Duration::from_secs(30));
        assert_eq!(executor.calculate_delay(64), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let executor = RetryExecutor::new(fast_config(2));
        let calls = &AtomicU32::new(0);

        let result = executor
            .execute(|| async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AuthError::ServerError {
                        status: 503,
                        detail: String::new(),
                    })
                } else {
                    Ok("token")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "token");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let stats = executor.get_stats();
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.successful_retries, 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let executor = RetryExecutor::new(fast_config(1));
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = executor
            .execute(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AuthError::Network(NetworkError::ConnectionFailed {
                    message: "refused".to_string(),
                }))
            })
            .await;

        assert!(matches!(result, Err(AuthError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(executor.get_stats().failed_operations, 1);
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent_errors() {
        let executor = RetryExecutor::new(fast_config(3));
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = executor
            .execute(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AuthError::RateLimited { retry_after: None })
            })
            .await;

        assert!(matches!(result, Err(AuthError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
