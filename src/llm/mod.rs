//! Language-model abstractions.
//!
//! The engine never talks to a provider directly; every model interaction
//! goes through the [`LanguageModel`] trait. Concrete clients live in
//! submodules ([`openai`]), construction and memoization in [`cache`], and
//! transient-failure handling in [`retry`].

pub mod cache;
pub mod openai;
pub mod retry;

use crate::types::{ModelError, ResearchError, Result};
use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

/// Ordered stream of report tokens from a streaming generation.
pub type TokenStream = Box<dyn Stream<Item = std::result::Result<String, ModelError>> + Send + Unpin>;

/// Generic language-model trait for provider abstraction.
///
/// All model providers implement this trait, allowing the orchestration
/// stages to swap providers without changing engine code.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a free-form completion for a prompt.
    async fn invoke(&self, prompt: &str) -> std::result::Result<String, ModelError>;

    /// Generate a completion constrained to the given JSON Schema and
    /// return the decoded JSON value.
    async fn invoke_structured(
        &self,
        prompt: &str,
        schema: &Value,
    ) -> std::result::Result<Value, ModelError>;

    /// Stream a completion token by token.
    async fn stream(&self, prompt: &str) -> std::result::Result<TokenStream, ModelError>;

    /// The model identifier this handle was built for.
    fn model_name(&self) -> &str;
}

/// Invoke a model with the schema derived from `T` and deserialize the
/// result, re-asking on parse failures.
///
/// Model errors propagate as-is (the handle's retry policy has already run
/// by the time they surface here). Parse failures are retried up to
/// `max_attempts` total attempts, then surface as
/// [`ResearchError::StructuredOutput`]; whether that degrades or aborts is
/// the caller's decision.
pub async fn invoke_structured_as<T>(
    model: &dyn LanguageModel,
    prompt: &str,
    max_attempts: u32,
) -> Result<T>
where
    T: serde::de::DeserializeOwned + schemars::JsonSchema,
{
    let schema = serde_json::to_value(
        schemars::SchemaGenerator::default().into_root_schema_for::<T>(),
    )
    .map_err(|e| ResearchError::StructuredOutput(format!("schema generation failed: {}", e)))?;

    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let value = model
            .invoke_structured(prompt, &schema)
            .await
            .map_err(ResearchError::Model)?;

        match serde_json::from_value::<T>(value) {
            Ok(parsed) => return Ok(parsed),
            Err(err) if attempt < max_attempts => {
                tracing::warn!(
                    model = model.model_name(),
                    attempt,
                    error = %err,
                    "structured output did not match schema; re-asking"
                );
                attempt += 1;
            }
            Err(err) => return Err(ResearchError::StructuredOutput(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Deserialize, schemars::JsonSchema)]
    struct Verdict {
        decided: bool,
    }

    /// Returns garbage for the first `bad_replies` structured calls, then
    /// a well-formed verdict.
    struct EventuallyWellFormed {
        bad_replies: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for EventuallyWellFormed {
        async fn invoke(&self, _prompt: &str) -> std::result::Result<String, ModelError> {
            Ok(String::new())
        }

        async fn invoke_structured(
            &self,
            _prompt: &str,
            _schema: &Value,
        ) -> std::result::Result<Value, ModelError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.bad_replies {
                Ok(serde_json::json!({ "unexpected": "shape" }))
            } else {
                Ok(serde_json::json!({ "decided": true }))
            }
        }

        async fn stream(&self, _prompt: &str) -> std::result::Result<TokenStream, ModelError> {
            Ok(Box::new(futures::stream::empty()))
        }

        fn model_name(&self) -> &str {
            "test-model"
        }
    }

    #[tokio::test]
    async fn test_parse_failure_is_retried_then_succeeds() {
        let model = EventuallyWellFormed {
            bad_replies: 2,
            calls: AtomicUsize::new(0),
        };
        let verdict: Verdict = invoke_structured_as(&model, "decide", 3).await.unwrap();
        assert!(verdict.decided);
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_parse_failure_exhausts_attempts() {
        let model = EventuallyWellFormed {
            bad_replies: usize::MAX,
            calls: AtomicUsize::new(0),
        };
        let err = invoke_structured_as::<Verdict>(&model, "decide", 2)
            .await
            .unwrap_err();
        assert!(matches!(err, ResearchError::StructuredOutput(_)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_invokes_once() {
        let model = EventuallyWellFormed {
            bad_replies: 0,
            calls: AtomicUsize::new(0),
        };
        let verdict: Verdict = invoke_structured_as(&model, "decide", 0).await.unwrap();
        assert!(verdict.decided);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }
}
