// Retry with classified-error gating and optional exponential backoff

use crate::error::{ErrorCategory, Result};
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy for one wrapped operation
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub exponential: bool,
    pub retryable: Vec<ErrorCategory>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            exponential: true,
            retryable: vec![ErrorCategory::Network, ErrorCategory::Timeout],
        }
    }
}

impl RetryConfig {
    /// Delay before retry attempt `attempt` (1-based): constant, or
    /// `base * 2^(attempt-1)` when exponential.
    pub fn delay(&self, attempt: u32) -> Duration {
        if self.exponential {
            self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
        } else {
            self.base_delay
        }
    }

    fn is_retryable(&self, error: &anyhow::Error) -> bool {
        self.retryable.contains(&ErrorCategory::classify(error))
    }
}

/// Execute an operation with automatic retry.
///
/// Non-retryable categories propagate on first failure; after exhausting
/// attempts the last error propagates.
pub async fn with_retry<F, T, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 1..=config.max_attempts.max(1) {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(
                        "operation '{}' succeeded on attempt {}",
                        operation_name,
                        attempt
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                tracing::warn!(
                    "operation '{}' failed on attempt {}: {}",
                    operation_name,
                    attempt,
                    error
                );

                let retryable = config.is_retryable(&error);
                last_error = Some(error);

                if !retryable {
                    break;
                }

                if attempt < config.max_attempts {
                    let delay = config.delay(attempt);
                    tracing::debug!("retrying '{}' in {:?}", operation_name, delay);
                    sleep(delay).await;
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| anyhow::anyhow!("no error recorded during retry of {}", operation_name)))
}
