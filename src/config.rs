//! Engine configuration.
//!
//! Plain serde-friendly structs with builder-style setters. Values are
//! validated once, up front, before any run starts; a bad value is a
//! [`ResearchError::Configuration`] and never a mid-run surprise.

use crate::types::{ResearchError, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// How the source aggregator resolves two results sharing a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeduplicationStrategy {
    /// Keep the earliest-seen result per URL and discard later ones.
    KeepFirst,
    /// Keep the latest-seen result per URL, at the URL's first-seen
    /// position in the output ordering.
    KeepLast,
}

/// Model identifier plus per-stage generation limits. The exact tuple
/// (together with the credential fingerprint) keys the model cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Model identifier in `provider:model` form, e.g. `openai:gpt-4.1`.
    pub model: String,
    /// Maximum output tokens for this stage.
    pub max_tokens: u32,
    /// Maximum invocation attempts for transient failures.
    pub max_retries: u32,
}

impl ModelSettings {
    /// Build settings for a model identifier with stage limits.
    pub fn new(model: impl Into<String>, max_tokens: u32, max_retries: u32) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            max_retries,
        }
    }
}

/// Configuration consumed by the research engine.
///
/// # Example
///
/// ```rust
/// use delve::config::{DeduplicationStrategy, ResearchConfig};
///
/// let config = ResearchConfig::default()
///     .with_max_concurrent_research_units(5)
///     .with_deduplication_strategy(DeduplicationStrategy::KeepLast);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Supervision rounds ceiling. Reaching it is a normal stop.
    pub max_researcher_iterations: u32,

    /// Parallelism ceiling for concurrently executing research units.
    pub max_concurrent_research_units: usize,

    /// Search-call budget handed to each dispatched research unit.
    pub max_unit_tool_calls: u32,

    /// Whether the engine may suspend to ask a clarifying question.
    pub allow_clarification: bool,

    /// Parse attempts for structured model output before degrading or
    /// failing, depending on the call site.
    pub max_structured_output_retries: u32,

    /// URL deduplication strategy for the source aggregator.
    pub deduplication_strategy: DeduplicationStrategy,

    /// Approximate token budget per source when rendering raw content.
    pub max_tokens_per_source: usize,

    /// Whether formatted sources include raw page content.
    pub include_raw_content: bool,

    /// Capacity of the bounded event channel handed to callers.
    pub event_buffer: usize,

    /// Model driving clarification, brief writing, supervision, and
    /// unit-level note taking.
    pub research_model: ModelSettings,

    /// Model condensing long raw page content.
    pub summarization_model: ModelSettings,

    /// Model condensing accumulated notes.
    pub compression_model: ModelSettings,

    /// Model writing and streaming the final report.
    pub final_report_model: ModelSettings,

    /// Credential forwarded to the model factory. Its fingerprint (not
    /// the raw value) participates in cache keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_researcher_iterations: 3,
            max_concurrent_research_units: 3,
            max_unit_tool_calls: 5,
            allow_clarification: true,
            max_structured_output_retries: 3,
            deduplication_strategy: DeduplicationStrategy::KeepFirst,
            max_tokens_per_source: 4000,
            include_raw_content: true,
            event_buffer: 64,
            research_model: ModelSettings::new("openai:gpt-4.1", 10_000, 3),
            summarization_model: ModelSettings::new("openai:gpt-4.1-mini", 8_192, 3),
            compression_model: ModelSettings::new("openai:gpt-4.1", 8_192, 3),
            final_report_model: ModelSettings::new("openai:gpt-4.1", 10_000, 3),
            api_key: None,
        }
    }
}

impl ResearchConfig {
    /// Default configuration with environment overrides applied.
    ///
    /// Recognized variables: `OPENAI_API_KEY` (credential), per-stage model
    /// overrides (`RESEARCH_MODEL`, `SUMMARIZATION_MODEL`,
    /// `COMPRESSION_MODEL`, `FINAL_REPORT_MODEL`) and their
    /// `*_MAX_TOKENS` companions.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(key) = env::var("OPENAI_API_KEY") {
            config.api_key = Some(key);
        }

        for (settings, model_var, tokens_var) in [
            (
                &mut config.research_model,
                "RESEARCH_MODEL",
                "RESEARCH_MODEL_MAX_TOKENS",
            ),
            (
                &mut config.summarization_model,
                "SUMMARIZATION_MODEL",
                "SUMMARIZATION_MODEL_MAX_TOKENS",
            ),
            (
                &mut config.compression_model,
                "COMPRESSION_MODEL",
                "COMPRESSION_MODEL_MAX_TOKENS",
            ),
            (
                &mut config.final_report_model,
                "FINAL_REPORT_MODEL",
                "FINAL_REPORT_MODEL_MAX_TOKENS",
            ),
        ] {
            if let Ok(model) = env::var(model_var) {
                settings.model = model;
            }
            if let Ok(raw) = env::var(tokens_var) {
                settings.max_tokens = raw.parse().map_err(|_| {
                    ResearchError::Configuration(format!(
                        "{} must be a positive integer, got '{}'",
                        tokens_var, raw
                    ))
                })?;
            }
        }

        Ok(config)
    }

    /// Set the supervision rounds ceiling.
    pub fn with_max_researcher_iterations(mut self, rounds: u32) -> Self {
        self.max_researcher_iterations = rounds;
        self
    }

    /// Set the unit parallelism ceiling.
    pub fn with_max_concurrent_research_units(mut self, units: usize) -> Self {
        self.max_concurrent_research_units = units;
        self
    }

    /// Set the per-unit search-call budget.
    pub fn with_max_unit_tool_calls(mut self, calls: u32) -> Self {
        self.max_unit_tool_calls = calls;
        self
    }

    /// Enable or disable the clarification stage.
    pub fn with_clarification(mut self, allow: bool) -> Self {
        self.allow_clarification = allow;
        self
    }

    /// Set the URL deduplication strategy.
    pub fn with_deduplication_strategy(mut self, strategy: DeduplicationStrategy) -> Self {
        self.deduplication_strategy = strategy;
        self
    }

    /// Set the per-source raw-content token budget.
    pub fn with_max_tokens_per_source(mut self, tokens: usize) -> Self {
        self.max_tokens_per_source = tokens;
        self
    }

    /// Include or exclude raw page content in formatted sources.
    pub fn with_raw_content(mut self, include: bool) -> Self {
        self.include_raw_content = include;
        self
    }

    /// Set the credential forwarded to the model factory.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Reject configurations that cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.max_researcher_iterations == 0 {
            return Err(ResearchError::Configuration(
                "max_researcher_iterations must be at least 1".into(),
            ));
        }
        if self.max_concurrent_research_units == 0 {
            return Err(ResearchError::Configuration(
                "max_concurrent_research_units must be at least 1".into(),
            ));
        }
        if self.max_unit_tool_calls == 0 {
            return Err(ResearchError::Configuration(
                "max_unit_tool_calls must be at least 1".into(),
            ));
        }
        if self.max_tokens_per_source == 0 {
            return Err(ResearchError::Configuration(
                "max_tokens_per_source must be at least 1".into(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(ResearchError::Configuration(
                "event_buffer must be at least 1".into(),
            ));
        }
        for (label, settings) in [
            ("research_model", &self.research_model),
            ("summarization_model", &self.summarization_model),
            ("compression_model", &self.compression_model),
            ("final_report_model", &self.final_report_model),
        ] {
            if settings.model.trim().is_empty() {
                return Err(ResearchError::Configuration(format!(
                    "{} identifier must not be empty",
                    label
                )));
            }
            if settings.max_tokens == 0 {
                return Err(ResearchError::Configuration(format!(
                    "{} max_tokens must be at least 1",
                    label
                )));
            }
            if settings.max_retries == 0 {
                return Err(ResearchError::Configuration(format!(
                    "{} max_retries must be at least 1",
                    label
                )));
            }
        }
        Ok(())
    }
}
