//! Retry and timeout policy for generation attempts
//!
//! One retry loop covers every connector, scripted or HTTP-backed:
//! - per-attempt timeout (an elapsed timeout counts as transient)
//! - linear backoff with jitter by default, exponential as an option
//! - maximum waiting time of 30 seconds between retries
//! - server-requested retry-after delays are honored
//! - authentication and unavailability errors are never retried

use crate::constants::{
    DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_REQUEST_TIMEOUT_SECS, MAX_RETRY_DELAY_MS,
};
use crate::llm::{Completion, Connector, ConnectorError, ModelParams};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Configuration for the per-turn retry loop.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of generation attempts (first try included).
    pub max_attempts: u32,

    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,

    /// Per-attempt timeout.
    pub request_timeout: Duration,

    /// Whether to use exponential (true) or linear (false) backoff.
    pub use_exponential: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: MAX_RETRY_DELAY_MS,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            use_exponential: false,
        }
    }
}

/// Calculate the backoff delay before the given retry attempt.
///
/// `attempt` is 1-based; attempt 1 is the first try and has no delay.
/// Adds ±10% jitter to prevent thundering herd.
pub fn backoff_delay_ms(attempt: u32, config: &RetryConfig) -> u64 {
    if attempt <= 1 {
        return 0;
    }

    let retries = attempt - 1;
    let raw = if config.use_exponential {
        let exponent = retries.saturating_sub(1);
        config.base_delay_ms * 2_u64.saturating_pow(exponent)
    } else {
        config.base_delay_ms * retries as u64
    };

    let jitter_range = raw / 10;
    let with_jitter = if jitter_range > 0 {
        let jitter = rand::random::<u64>() % (jitter_range * 2);
        raw.saturating_add(jitter).saturating_sub(jitter_range)
    } else {
        raw
    };

    with_jitter.min(config.max_delay_ms)
}

/// A successful generation plus how many attempts it took.
#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub completion: Completion,
    pub attempts: u32,
}

/// Call a connector with timeout and retry handling.
///
/// Returns the first successful completion, or the last error once the
/// attempt budget is exhausted or a non-retryable error occurs. An empty
/// completion is treated as an invalid response and retried.
pub async fn generate_with_retry(
    connector: &dyn Connector,
    prompt: &str,
    params: &ModelParams,
    config: &RetryConfig,
) -> Result<GenerateOutcome, ConnectorError> {
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = tokio::time::timeout(config.request_timeout, connector.generate(prompt, params))
            .await
            .unwrap_or_else(|_| {
                Err(ConnectorError::Transient {
                    provider: connector.provider().to_string(),
                    message: format!(
                        "request timed out after {} seconds",
                        config.request_timeout.as_secs()
                    ),
                    retry_after: None,
                })
            });

        let error = match result {
            Ok(completion) if completion.text.trim().is_empty() => ConnectorError::InvalidResponse {
                provider: connector.provider().to_string(),
                message: "empty completion".to_string(),
            },
            Ok(completion) => return Ok(GenerateOutcome { completion, attempts: attempt }),
            Err(err) => err,
        };

        if !error.is_retryable() || attempt >= config.max_attempts {
            return Err(error);
        }

        let delay_ms = error
            .retry_after_ms()
            .unwrap_or_else(|| backoff_delay_ms(attempt + 1, config))
            .min(config.max_delay_ms);
        warn!(
            provider = connector.provider(),
            model = connector.model(),
            attempt,
            max_attempts = config.max_attempts,
            delay_ms,
            error = %error,
            "generation attempt failed, retrying"
        );
        sleep(Duration::from_millis(delay_ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Usage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Connector that fails a configured number of times, then succeeds.
    #[derive(Debug)]
    struct FlakyConnector {
        failures: u32,
        calls: AtomicU32,
        error_kind: fn(u32) -> ConnectorError,
    }

    impl FlakyConnector {
        fn transient(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                error_kind: |n| ConnectorError::Transient {
                    provider: "scripted".into(),
                    message: format!("induced failure {n}"),
                    retry_after: None,
                },
            }
        }

        fn auth(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                error_kind: |_| ConnectorError::Auth {
                    provider: "scripted".into(),
                    message: "bad key".into(),
                },
            }
        }
    }

    #[async_trait]
    impl Connector for FlakyConnector {
        async fn generate(
            &self,
            _prompt: &str,
            _params: &ModelParams,
        ) -> Result<Completion, ConnectorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err((self.error_kind)(call))
            } else {
                Ok(Completion {
                    text: "a reply".into(),
                    usage: Usage {
                        prompt_tokens: 3,
                        completion_tokens: 2,
                        total_tokens: 5,
                        latency_ms: 1,
                    },
                })
            }
        }

        fn provider(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-model"
        }
    }

    /// Connector that never returns within the attempt timeout.
    #[derive(Debug)]
    struct StalledConnector;

    #[async_trait]
    impl Connector for StalledConnector {
        async fn generate(
            &self,
            _prompt: &str,
            _params: &ModelParams,
        ) -> Result<Completion, ConnectorError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("sleep outlives the test timeout")
        }

        fn provider(&self) -> &str {
            "stalled"
        }

        fn model(&self) -> &str {
            "stalled-model"
        }
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
            request_timeout: Duration::from_millis(50),
            use_exponential: false,
        }
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt_after_two_transient_failures() {
        let connector = FlakyConnector::transient(2);
        let outcome = generate_with_retry(&connector, "p", &ModelParams::default(), &fast_config(3))
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.completion.text, "a reply");
        assert_eq!(connector.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausting_attempts_surfaces_last_error() {
        let connector = FlakyConnector::transient(5);
        let err = generate_with_retry(&connector, "p", &ModelParams::default(), &fast_config(3))
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectorError::Transient { .. }));
        assert_eq!(connector.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let connector = FlakyConnector::auth(5);
        let err = generate_with_retry(&connector, "p", &ModelParams::default(), &fast_config(3))
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectorError::Auth { .. }));
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_is_treated_as_transient() {
        let connector = StalledConnector;
        let err = generate_with_retry(&connector, "p", &ModelParams::default(), &fast_config(2))
            .await
            .unwrap_err();

        match err {
            ConnectorError::Transient { message, .. } => {
                assert!(message.contains("timed out"), "message was: {message}");
            }
            other => panic!("expected transient timeout, got: {other}"),
        }
    }

    #[test]
    fn linear_backoff_grows_with_attempts() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            request_timeout: Duration::from_secs(1),
            use_exponential: false,
        };

        assert_eq!(backoff_delay_ms(1, &config), 0);
        let second = backoff_delay_ms(2, &config);
        let fourth = backoff_delay_ms(4, &config);
        // ±10% jitter around 1000 and 3000
        assert!((900..=1100).contains(&second), "second = {second}");
        assert!((2700..=3300).contains(&fourth), "fourth = {fourth}");
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let config = RetryConfig {
            max_attempts: 16,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            request_timeout: Duration::from_secs(1),
            use_exponential: true,
        };

        assert!(backoff_delay_ms(16, &config) <= 30_000);
    }
}
