//! OpenAI-compatible model client.
//!
//! Wraps `async-openai` behind the [`LanguageModel`] trait. Anything that
//! speaks the chat-completions protocol (OpenAI itself, Azure-style
//! gateways, local inference servers) works through the same client by
//! pointing `api_base` at it.

use crate::llm::cache::{ModelFactory, ModelFingerprint};
use crate::llm::{LanguageModel, TokenStream};
use crate::types::{ModelError, ResearchError, Result};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;

/// Chat-completions client for one model identifier.
pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
}

impl OpenAiModel {
    /// Create a client. `api_key`/`api_base` fall back to the
    /// `async-openai` defaults when absent.
    pub fn new(
        api_key: Option<String>,
        api_base: Option<String>,
        model: String,
        max_tokens: u32,
    ) -> Self {
        let mut config = OpenAIConfig::new();
        if let Some(key) = api_key {
            config = config.with_api_key(key);
        }
        if let Some(base) = api_base {
            config = config.with_api_base(base);
        }

        Self {
            client: Client::with_config(config),
            model,
            max_tokens,
        }
    }

    fn user_message(prompt: &str) -> Vec<ChatCompletionRequestMessage> {
        vec![ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage::from(prompt.to_string()),
        )]
    }
}

/// Classify a provider failure as transient or fatal for the retry
/// policy.
fn map_openai_error(err: OpenAIError) -> ModelError {
    let transient = match &err {
        // Transport problems are worth another attempt.
        OpenAIError::Reqwest(_) => true,
        OpenAIError::ApiError(api) => {
            let lowered = api.message.to_lowercase();
            lowered.contains("rate limit")
                || lowered.contains("overloaded")
                || lowered.contains("timeout")
                || lowered.contains("temporarily")
                || lowered.contains("server error")
        }
        _ => false,
    };

    if transient {
        ModelError::Transient(err.to_string())
    } else {
        ModelError::Fatal(err.to_string())
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn invoke(&self, prompt: &str) -> std::result::Result<String, ModelError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_completion_tokens(self.max_tokens)
            .messages(Self::user_message(prompt))
            .build()
            .map_err(|e| ModelError::Fatal(format!("failed to build request: {}", e)))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ModelError::Fatal("model returned no content".to_string()))
    }

    async fn invoke_structured(
        &self,
        prompt: &str,
        schema: &Value,
    ) -> std::result::Result<Value, ModelError> {
        let format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: None,
                name: "structured_output".to_string(),
                schema: Some(schema.clone()),
                strict: Some(true),
            },
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_completion_tokens(self.max_tokens)
            .messages(Self::user_message(prompt))
            .response_format(format)
            .build()
            .map_err(|e| ModelError::Fatal(format!("failed to build request: {}", e)))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ModelError::Fatal("model returned no content".to_string()))?;

        // A malformed payload is a provider hiccup, not a caller mistake.
        serde_json::from_str(&content)
            .map_err(|e| ModelError::Transient(format!("structured payload was not JSON: {}", e)))
    }

    async fn stream(&self, prompt: &str) -> std::result::Result<TokenStream, ModelError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_completion_tokens(self.max_tokens)
            .messages(Self::user_message(prompt))
            .build()
            .map_err(|e| ModelError::Fatal(format!("failed to build request: {}", e)))?;

        let mut stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(map_openai_error)?;

        let token_stream = async_stream::stream! {
            while let Some(result) = stream.next().await {
                match result {
                    Ok(response) => {
                        for choice in response.choices {
                            if let Some(content) = choice.delta.content {
                                yield Ok(content);
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(map_openai_error(e));
                    }
                }
            }
        };

        Ok(Box::new(Box::pin(token_stream)))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Builds [`OpenAiModel`] handles from cache fingerprints.
///
/// Model identifiers use `provider:model` form; a bare identifier is
/// treated as an OpenAI model. Unknown providers are configuration
/// errors surfaced before any run starts.
pub struct OpenAiModelFactory {
    api_key: Option<String>,
    api_base: Option<String>,
}

impl OpenAiModelFactory {
    /// Create a factory with an explicit credential.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            api_base: None,
        }
    }

    /// Create a factory from `OPENAI_API_KEY` / `OPENAI_API_BASE`.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            api_base: std::env::var("OPENAI_API_BASE").ok(),
        }
    }

    /// Point the factory at a different chat-completions endpoint.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = Some(base.into());
        self
    }
}

impl ModelFactory for OpenAiModelFactory {
    fn build(&self, fingerprint: &ModelFingerprint) -> Result<Arc<dyn LanguageModel>> {
        let (provider, model) = match fingerprint.model.split_once(':') {
            Some((provider, model)) => (provider, model),
            None => ("openai", fingerprint.model.as_str()),
        };

        if provider != "openai" {
            return Err(ResearchError::Configuration(format!(
                "unsupported model provider '{}' in identifier '{}'",
                provider, fingerprint.model
            )));
        }

        Ok(Arc::new(OpenAiModel::new(
            self.api_key.clone(),
            self.api_base.clone(),
            model.to_string(),
            fingerprint.max_tokens,
        )))
    }
}
