//! Core types shared across the research engine.
//!
//! Everything the orchestration stages exchange lives here: the session and
//! its append-only message log, raw and deduplicated search data, report
//! sections, and the crate error taxonomy.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============= Session Types =============

/// A single research run: the topic, the conversation so far, and every
/// artifact the stages produce on the way to a final report.
///
/// The session is owned exclusively by the orchestrator while a run is in
/// flight; callers get it back inside the run outcome and may only append a
/// human answer before re-invoking (the clarification resumption path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for this session, used in tracing spans.
    pub id: Uuid,
    /// The research topic as originally submitted.
    pub topic: String,
    /// Append-only conversation history. Ordering is significant.
    pub messages: Vec<Message>,
    /// The research brief produced by the brief-writing stage.
    pub research_brief: Option<String>,
    /// Notes aggregated by the supervisor, in unit-completion order.
    pub notes: Vec<String>,
    /// The final report, present once the run reaches `Done`.
    pub final_report: Option<String>,
}

impl Session {
    /// Create a session for a topic. The topic is recorded as the first
    /// human message.
    pub fn new(topic: impl Into<String>) -> Self {
        let topic = topic.into();
        Self {
            id: Uuid::new_v4(),
            topic: topic.clone(),
            messages: vec![Message::human(topic)],
            research_brief: None,
            notes: Vec::new(),
            final_report: None,
        }
    }

    /// Append a human message (e.g. a clarification answer).
    pub fn push_human(&mut self, content: impl Into<String>) {
        self.messages.push(Message::human(content));
    }

    /// Append an assistant message.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// The most recently appended message, if any.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Render the conversation as `role: content` lines for prompts.
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One conversation turn. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this message.
    pub role: MessageRole,
    /// The message text.
    pub content: String,
}

impl Message {
    /// Build a human message.
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Human,
            content: content.into(),
        }
    }

    /// Build an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The user driving the research.
    Human,
    /// The engine.
    Assistant,
}

impl MessageRole {
    /// Lowercase label used in prompt transcripts.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::Human => "human",
            MessageRole::Assistant => "assistant",
        }
    }
}

// ============= Search Types =============

/// One raw result from a search provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result title as reported by the provider.
    pub title: String,
    /// Origin URL. Deduplication keys on this field.
    pub url: String,
    /// The provider's relevance snippet.
    pub content: String,
    /// Provider relevance score.
    pub score: f32,
    /// Full page content, when the provider returned it.
    pub raw_content: Option<String>,
}

/// All results returned for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// The query that produced these results.
    pub query: String,
    /// Results in provider order.
    pub results: Vec<SearchResult>,
}

/// A deduplicated source: at most one per distinct URL within a
/// formatting pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Source title.
    pub title: String,
    /// Origin URL.
    pub url: String,
    /// Relevance snippet, verbatim from the surviving result.
    pub content: String,
    /// Full page content, if available.
    pub raw_content: Option<String>,
}

impl From<SearchResult> for Source {
    fn from(result: SearchResult) -> Self {
        Self {
            title: result.title,
            url: result.url,
            content: result.content,
            raw_content: result.raw_content,
        }
    }
}

// ============= Document Types =============

/// A piece of content tied to an origin URL, before stitching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFragment {
    /// Origin URL. Stitching groups on exact matches of this field.
    pub url: String,
    /// Fragment title. Only the first fragment's title survives stitching.
    pub title: String,
    /// The content fragment itself.
    pub content: String,
}

impl DocumentFragment {
    /// Build a fragment.
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: content.into(),
        }
    }
}

/// One logical document per origin URL, produced by the stitcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StitchedDocument {
    /// Origin URL shared by every stitched fragment.
    pub url: String,
    /// Title of the first fragment seen for this URL.
    pub title: String,
    /// Distinct fragments concatenated in first-seen order.
    pub content: String,
}

// ============= Report Types =============

/// One planned section of the final report. Ordering is table-of-contents
/// order.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Section {
    /// Section heading.
    pub name: String,
    /// What this section should cover.
    pub description: String,
    /// Whether the section draws on gathered research (as opposed to
    /// framing material like an introduction).
    pub requires_research: bool,
    /// Section body. Empty in an outline; populated by report synthesis.
    #[serde(default)]
    pub content: String,
}

// ============= Run Stages =============

/// The orchestrator's position in the research state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Waiting for a topic or a clarification answer.
    AwaitingInput,
    /// Deciding whether to clarify, then writing the research brief.
    ClarifyingOrBrief,
    /// Suspended: a clarifying question has been returned to the caller.
    AwaitingClarification,
    /// Research units are being dispatched and supervised.
    Supervising,
    /// Accumulated notes are being condensed.
    Compressing,
    /// The final report is being generated and streamed.
    ReportGenerating,
    /// Terminal. The session is immutable from here on.
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Stage::AwaitingInput => "awaiting_input",
            Stage::ClarifyingOrBrief => "clarifying_or_brief",
            Stage::AwaitingClarification => "awaiting_clarification",
            Stage::Supervising => "supervising",
            Stage::Compressing => "compressing",
            Stage::ReportGenerating => "report_generating",
            Stage::Done => "done",
        };
        f.write_str(label)
    }
}

// ============= Error Types =============

/// A failed language-model invocation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    /// Worth retrying: rate limits, timeouts, connection resets.
    #[error("transient model failure: {0}")]
    Transient(String),
    /// Not worth retrying: bad credentials, unknown model, rejected input.
    #[error("fatal model failure: {0}")]
    Fatal(String),
}

impl ModelError {
    /// Whether a retry policy should attempt this call again.
    pub fn is_transient(&self) -> bool {
        matches!(self, ModelError::Transient(_))
    }
}

/// A failed search-provider call. Always unit-local: a search failure
/// never aborts sibling research units.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    /// The request never produced a usable HTTP response.
    #[error("search transport error: {0}")]
    Http(String),
    /// The provider answered with an error status or payload.
    #[error("search provider error: {0}")]
    Provider(String),
    /// The response body could not be decoded.
    #[error("search decode error: {0}")]
    Decode(String),
}

/// Crate-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    /// A model call failed after its retry policy was exhausted.
    #[error("model request failed: {0}")]
    Model(#[from] ModelError),

    /// A search call failed.
    #[error("search request failed: {0}")]
    Search(#[from] SearchError),

    /// A structured model response could not be parsed after the
    /// configured number of attempts.
    #[error("structured output could not be parsed: {0}")]
    StructuredOutput(String),

    /// Summarization of raw content failed; treated as a unit-level
    /// failure by the supervisor.
    #[error("summarization failed: {0}")]
    Summarization(String),

    /// Invalid configuration, rejected before any run starts.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

/// A fatal run failure: the error kind plus the last stage that completed
/// successfully, so callers never see a silently empty report.
#[derive(Debug, thiserror::Error)]
#[error("run failed after stage '{last_completed}': {source}")]
pub struct RunError {
    /// The last stage that completed before the failure.
    pub last_completed: Stage,
    /// What went wrong.
    #[source]
    pub source: ResearchError,
}

impl RunError {
    /// Wrap an error with the stage context the orchestrator tracked.
    pub fn at(last_completed: Stage, source: ResearchError) -> Self {
        Self {
            last_completed,
            source,
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ResearchError>;
