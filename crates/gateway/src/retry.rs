//! Bounded exponential-backoff retry around one gateway attempt.

use std::time::Duration;
use switchyard_config::RetryConfig;
use switchyard_core::{ChatError, FailureKind};
use tracing::warn;

/// Retry settings. Only errors whose [`FailureKind`] is in `retriable` are
/// retried; everything else is returned after the first attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub retriable: Vec<FailureKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_secs(config.base_delay_secs),
            max_delay: Duration::from_secs(config.max_delay_secs),
            retriable: config.retriable.clone(),
        }
    }
}

/// What a retried operation produced, and how many retries it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, ChatError>,
    pub retry_count: u32,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based):
    /// `min(base * 2^(retry - 1), max)`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn is_retriable(&self, error: &ChatError) -> bool {
        self.retriable.contains(&error.kind())
    }

    /// Run `operation` until it succeeds, fails with a non-retriable error,
    /// or the retry budget is spent. The operation receives the 1-based
    /// attempt number. On exhaustion the last error is returned.
    pub async fn run<T, F>(&self, mut operation: F) -> RetryOutcome<T>
    where
        F: AsyncFnMut(u32) -> Result<T, ChatError>,
    {
        let mut retry_count = 0;
        loop {
            match operation(retry_count + 1).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        retry_count,
                    };
                }
                Err(err) if self.is_retriable(&err) && retry_count < self.max_retries => {
                    retry_count += 1;
                    let delay = self.delay_for_retry(retry_count);
                    warn!(
                        attempt = retry_count,
                        max = self.max_retries,
                        delay_secs = delay.as_secs_f64(),
                        kind = %err.kind(),
                        error = %err,
                        "Retrying after error"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if retry_count > 0 {
                        warn!(retries = retry_count, error = %err, "Giving up after retries");
                    }
                    return RetryOutcome {
                        result: Err(err),
                        retry_count,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::ProviderError;

    fn server_error() -> ChatError {
        ProviderError::ApiError {
            status_code: 503,
            message: "unavailable".into(),
        }
        .into()
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..=6).map(|n| policy.delay_for_retry(n).as_secs()).collect();
        assert_eq!(delays, vec![3, 6, 12, 24, 30, 30]);
        assert_eq!(policy.delay_for_retry(200), Duration::from_secs(30));
    }

    #[test]
    fn default_retriable_kinds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert!(policy.is_retriable(&server_error()));
        assert!(policy.is_retriable(&ProviderError::Timeout("slow".into()).into()));
        assert!(policy.is_retriable(&ProviderError::Network("reset".into()).into()));
        assert!(!policy.is_retriable(&ProviderError::RateLimited { retry_after_secs: 1 }.into()));
        assert!(!policy.is_retriable(&ProviderError::StreamProtocol("bad".into()).into()));
        assert!(!policy.is_retriable(&ChatError::Validation("bad".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::default();
        let started = tokio::time::Instant::now();
        let mut attempts = Vec::new();

        let outcome = policy
            .run(async |attempt| {
                attempts.push(attempt);
                if attempt < 3 { Err(server_error()) } else { Ok("done") }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), "done");
        assert_eq!(outcome.retry_count, 2);
        assert_eq!(attempts, vec![1, 2, 3]);
        assert_eq!(started.elapsed(), Duration::from_secs(3 + 6));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_error() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let outcome: RetryOutcome<()> = policy
            .run(async |_| {
                calls += 1;
                Err(server_error())
            })
            .await;

        assert_eq!(calls, 3);
        assert_eq!(outcome.retry_count, 2);
        assert_eq!(outcome.result.unwrap_err().kind(), FailureKind::ServerError);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retriable_error_is_not_retried() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let outcome: RetryOutcome<()> = policy
            .run(async |_| {
                calls += 1;
                Err(ProviderError::AuthenticationFailed("bad key".into()).into())
            })
            .await;

        assert_eq!(calls, 1);
        assert_eq!(outcome.retry_count, 0);
        assert!(outcome.result.is_err());
    }

    #[tokio::test]
    async fn zero_budget_policy() {
        let mut calls = 0;
        let outcome: RetryOutcome<()> = RetryPolicy::none()
            .run(async |_| {
                calls += 1;
                Err(server_error())
            })
            .await;
        assert_eq!(calls, 1);
        assert_eq!(outcome.retry_count, 0);
    }
}
