//! Retry policy for transient model failures.
//!
//! Retrying is a decorator around any [`LanguageModel`], not a loop at the
//! call sites: a handle acquired from the cache already carries its retry
//! behavior, so stages simply invoke and let exhausted policies surface as
//! errors.

use crate::llm::{LanguageModel, TokenStream};
use crate::types::ModelError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Bounded exponential backoff for transient model failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total invocation attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling on any single backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A policy with the given attempt budget and default delays. Zero is
    /// treated as a single attempt.
    pub fn for_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Backoff before retry number `retry` (1-based): doubles each time,
    /// capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }
}

/// Decorator applying a [`RetryPolicy`] to every call of an inner model.
///
/// Only transient failures are retried; fatal failures surface
/// immediately. For streaming, establishing the stream is retried but a
/// mid-stream error is handed to the consumer untouched.
pub struct RetryingModel {
    inner: Arc<dyn LanguageModel>,
    policy: RetryPolicy,
}

impl RetryingModel {
    /// Wrap a model with the given policy.
    pub fn new(inner: Arc<dyn LanguageModel>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn with_retries<T, F, Fut>(&self, mut call: F) -> Result<T, ModelError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ModelError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        model = self.inner.model_name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient model failure; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl LanguageModel for RetryingModel {
    async fn invoke(&self, prompt: &str) -> Result<String, ModelError> {
        self.with_retries(|| self.inner.invoke(prompt)).await
    }

    async fn invoke_structured(
        &self,
        prompt: &str,
        schema: &Value,
    ) -> Result<Value, ModelError> {
        self.with_retries(|| self.inner.invoke_structured(prompt, schema))
            .await
    }

    async fn stream(&self, prompt: &str) -> Result<TokenStream, ModelError> {
        self.with_retries(|| self.inner.stream(prompt)).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails with the given error until `failures` calls have happened.
    struct Flaky {
        failures: usize,
        error: ModelError,
        calls: AtomicUsize,
    }

    impl Flaky {
        fn transient(failures: usize) -> Self {
            Self {
                failures,
                error: ModelError::Transient("rate limited".into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn fatal() -> Self {
            Self {
                failures: usize::MAX,
                error: ModelError::Fatal("bad key".into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for Flaky {
        async fn invoke(&self, _prompt: &str) -> Result<String, ModelError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok("ok".into())
            }
        }

        async fn invoke_structured(
            &self,
            _prompt: &str,
            _schema: &Value,
        ) -> Result<Value, ModelError> {
            Ok(Value::Null)
        }

        async fn stream(&self, _prompt: &str) -> Result<TokenStream, ModelError> {
            Ok(Box::new(futures::stream::empty()))
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let inner = Arc::new(Flaky::transient(2));
        let model = RetryingModel::new(inner.clone(), RetryPolicy::for_attempts(3));
        assert_eq!(model.invoke("hi").await.unwrap(), "ok");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_budget_is_exhausted() {
        let inner = Arc::new(Flaky::transient(usize::MAX));
        let model = RetryingModel::new(inner.clone(), RetryPolicy::for_attempts(3));
        let err = model.invoke("hi").await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_failures_are_not_retried() {
        let inner = Arc::new(Flaky::fatal());
        let model = RetryingModel::new(inner.clone(), RetryPolicy::for_attempts(5));
        let err = model.invoke("hi").await.unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(450),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(450));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::for_attempts(0).max_attempts, 1);
    }
}
