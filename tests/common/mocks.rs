//! Mock implementations for testing.
//!
//! This module provides scripted model, search, and factory mocks that can
//! be used across different test files without duplication. The scripted
//! model keys its replies off distinctive phrases in the engine's stage
//! prompts, so one mock can drive a whole run.

use async_trait::async_trait;
use delve::llm::{LanguageModel, TokenStream};
use delve::search::SearchProvider;
use delve::types::{ModelError, Result, SearchError, SearchResponse, SearchResult};
use delve::{ModelFactory, ModelFingerprint};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type TextHandler = Arc<dyn Fn(&str) -> std::result::Result<String, ModelError> + Send + Sync>;
type JsonHandler = Arc<dyn Fn(&str) -> std::result::Result<Value, ModelError> + Send + Sync>;

/// Pull the sub-task instructions line out of a unit prompt.
pub fn instructions_line(prompt: &str) -> String {
    prompt
        .lines()
        .skip_while(|line| !line.starts_with("Sub-task:"))
        .nth(1)
        .unwrap_or("")
        .to_string()
}

/// Scripted LLM for testing with configurable, prompt-keyed responses.
///
/// The defaults walk a run straight through: no clarification, a fixed
/// brief, one supervision round with one sub-task, one search query per
/// unit, notes echoing the sub-task, and a three-chunk report stream.
/// Override individual behaviors with the `with_*` methods.
pub struct ScriptedModel {
    name: String,
    on_invoke: TextHandler,
    on_structured: JsonHandler,
    stream_chunks: Vec<String>,
    fail_stream: bool,
    /// Free-form completions issued.
    pub invoke_calls: AtomicUsize,
    /// Structured completions issued.
    pub structured_calls: AtomicUsize,
    /// Streams established.
    pub stream_calls: AtomicUsize,
    /// Prompts handed to `stream`, in order.
    pub stream_prompts: Mutex<Vec<String>>,
    /// Prompts handed to `invoke_structured`, in order.
    pub structured_prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    /// A model that drives a run end to end with benign defaults.
    pub fn new(name: &str) -> Self {
        let directive_rounds = AtomicUsize::new(0);
        let default_structured: JsonHandler = Arc::new(move |prompt: &str| {
            if prompt.contains("clarifying question") {
                Ok(json!({
                    "need_clarification": false,
                    "question": "",
                    "verification": "Scope confirmed."
                }))
            } else if prompt.contains("into a research brief") {
                Ok(json!({ "research_brief": "Answer the question thoroughly." }))
            } else if prompt.contains("supervising a team") {
                let round = directive_rounds.fetch_add(1, Ordering::SeqCst);
                if round == 0 {
                    Ok(json!({
                        "research_complete": false,
                        "research_tasks": ["investigate the topic"]
                    }))
                } else {
                    Ok(json!({ "research_complete": true, "research_tasks": [] }))
                }
            } else if prompt.contains("planning web searches") {
                Ok(json!({ "queries": [instructions_line(prompt)] }))
            } else if prompt.contains("ordered list of sections") {
                Ok(json!({ "sections": [] }))
            } else {
                Ok(json!({}))
            }
        });

        let default_invoke: TextHandler = Arc::new(|prompt: &str| {
            if prompt.contains("You are recording") {
                Ok(format!("note[{}]", instructions_line(prompt)))
            } else if prompt.contains("Condense the research notes") {
                Ok("compressed findings".to_string())
            } else {
                Ok("ok".to_string())
            }
        });

        Self {
            name: name.to_string(),
            on_invoke: default_invoke,
            on_structured: default_structured,
            stream_chunks: vec!["Final ".into(), "report ".into(), "text.".into()],
            fail_stream: false,
            invoke_calls: AtomicUsize::new(0),
            structured_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            stream_prompts: Mutex::new(Vec::new()),
            structured_prompts: Mutex::new(Vec::new()),
        }
    }

    /// Override free-form completions.
    pub fn with_invoke<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<String, ModelError> + Send + Sync + 'static,
    {
        self.on_invoke = Arc::new(handler);
        self
    }

    /// Override structured completions.
    pub fn with_structured<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<Value, ModelError> + Send + Sync + 'static,
    {
        self.on_structured = Arc::new(handler);
        self
    }

    /// Override the report stream chunks.
    pub fn with_stream_chunks(mut self, chunks: &[&str]) -> Self {
        self.stream_chunks = chunks.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Make stream establishment fail fatally.
    pub fn with_failing_stream(mut self) -> Self {
        self.fail_stream = true;
        self
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn invoke(&self, prompt: &str) -> std::result::Result<String, ModelError> {
        self.invoke_calls.fetch_add(1, Ordering::SeqCst);
        (self.on_invoke)(prompt)
    }

    async fn invoke_structured(
        &self,
        prompt: &str,
        _schema: &Value,
    ) -> std::result::Result<Value, ModelError> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        self.structured_prompts.lock().push(prompt.to_string());
        (self.on_structured)(prompt)
    }

    async fn stream(&self, prompt: &str) -> std::result::Result<TokenStream, ModelError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.stream_prompts.lock().push(prompt.to_string());
        if self.fail_stream {
            return Err(ModelError::Fatal("stream refused".into()));
        }
        let chunks: Vec<std::result::Result<String, ModelError>> =
            self.stream_chunks.iter().cloned().map(Ok).collect();
        Ok(Box::new(futures::stream::iter(chunks)))
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Mock search provider with a concurrency gauge and fault injection.
pub struct MockSearch {
    base_delay: Duration,
    slow: Option<(String, Duration)>,
    fail_marker: Option<String>,
    with_raw_content: bool,
    /// Total searches issued.
    pub calls: AtomicUsize,
    /// Searches currently executing.
    pub in_flight: AtomicUsize,
    /// High-water mark of concurrent searches.
    pub max_in_flight: AtomicUsize,
}

impl MockSearch {
    /// A provider answering instantly with one result per query.
    pub fn new() -> Self {
        Self {
            base_delay: Duration::ZERO,
            slow: None,
            fail_marker: None,
            with_raw_content: false,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Delay every search, making overlap observable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Extra delay for queries containing the marker.
    pub fn with_slow_marker(mut self, marker: &str, delay: Duration) -> Self {
        self.slow = Some((marker.to_string(), delay));
        self
    }

    /// Fail queries containing the marker.
    pub fn with_failure_marker(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    /// Attach raw content to every result.
    pub fn with_raw_content(mut self) -> Self {
        self.with_raw_content = true;
        self
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(&self, query: &str) -> std::result::Result<SearchResponse, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = match &self.slow {
            Some((marker, slow_delay)) if query.contains(marker.as_str()) => *slow_delay,
            _ => self.base_delay,
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let outcome = match &self.fail_marker {
            Some(marker) if query.contains(marker.as_str()) => {
                Err(SearchError::Provider("injected failure".into()))
            }
            _ => Ok(SearchResponse {
                query: query.to_string(),
                results: vec![SearchResult {
                    title: format!("Result for {}", query),
                    url: format!("https://example.com/{}", query.replace(' ', "-")),
                    content: format!("Snippet about {}", query),
                    score: 0.9,
                    raw_content: self
                        .with_raw_content
                        .then(|| format!("Raw page content about {}", query)),
                }],
            }),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    fn name(&self) -> &str {
        "mock-search"
    }
}

/// Factory that hands the same scripted model to every fingerprint and
/// counts constructions.
pub struct StaticFactory {
    model: Arc<ScriptedModel>,
    /// Constructions performed.
    pub builds: AtomicUsize,
}

impl StaticFactory {
    /// Wrap a scripted model.
    pub fn new(model: Arc<ScriptedModel>) -> Self {
        Self {
            model,
            builds: AtomicUsize::new(0),
        }
    }
}

impl ModelFactory for StaticFactory {
    fn build(&self, _fingerprint: &ModelFingerprint) -> Result<Arc<dyn LanguageModel>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(self.model.clone())
    }
}
