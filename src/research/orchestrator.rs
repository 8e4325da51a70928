//! The research state machine.
//!
//! Sequences a run through `AwaitingInput → ClarifyingOrBrief →
//! Supervising → Compressing → ReportGenerating → Done`, with
//! `AwaitingClarification` as the one suspension point a caller can
//! resume from (append a human answer, re-invoke). The orchestrator owns
//! the session exclusively while a run is in flight and mutates it only
//! at stage boundaries.

use crate::config::{ModelSettings, ResearchConfig};
use crate::events::{EventSink, ResearchEvent};
use crate::llm::cache::{ModelCache, ModelFactory, ModelFingerprint};
use crate::llm::{invoke_structured_as, LanguageModel};
use crate::research::sources::SourceFormatOptions;
use crate::research::supervisor::{Supervisor, SupervisorOptions};
use crate::research::unit::{ResearchUnit, UnitOptions};
use crate::search::SearchProvider;
use crate::types::{
    MessageRole, ModelError, ResearchError, Result, RunError, Section, Session, Stage,
};
use futures::StreamExt;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// ============= Structured Stage Outputs =============

/// The clarification stage's decision.
#[derive(Debug, Deserialize, JsonSchema)]
struct ClarificationDecision {
    /// Whether a clarifying question must be asked before research.
    need_clarification: bool,
    /// The question to put to the user, when clarification is needed.
    question: String,
    /// A short confirmation of understood scope, when it is not.
    verification: String,
}

/// The brief-writing stage's output.
#[derive(Debug, Deserialize, JsonSchema)]
struct BriefOutput {
    /// The research brief guiding supervision and reporting.
    research_brief: String,
}

/// The report outline produced before streaming the report.
#[derive(Debug, Deserialize, JsonSchema)]
struct ReportOutline {
    /// Sections in table-of-contents order.
    sections: Vec<Section>,
}

// ============= Prompts =============

fn clarify_prompt(session: &Session) -> String {
    format!(
        r#"Decide whether this research request needs a clarifying question
before any work begins.

Conversation so far:
{}

If the request is ambiguous in a way that would change what gets
researched (unclear scope, timeframe, audience, or subject), set
need_clarification and write one specific question. Otherwise confirm the
scope you understood in the verification field."#,
        session.transcript()
    )
}

fn brief_prompt(session: &Session) -> String {
    format!(
        r#"Turn this conversation into a research brief.

Conversation so far:
{}

The brief must state the question to answer, the scope and constraints
the user gave, and what a complete answer looks like. Preserve every
detail the user supplied; do not invent constraints they did not give."#,
        session.transcript()
    )
}

fn compression_prompt(brief: &str, notes: &[String]) -> String {
    format!(
        r#"Condense the research notes below into one coherent body of findings
for this brief:

{}

Notes:
{}

Merge overlapping notes, keep every distinct fact and figure, and keep
source URLs attached to the claims they support. Do not add conclusions
the notes do not contain."#,
        brief,
        notes.join("\n\n")
    )
}

fn outline_prompt(brief: &str, findings: &str) -> String {
    format!(
        r#"Plan the final report for this brief as an ordered list of sections.

Brief:
{}

Findings:
{}

Each section needs a name, a one-sentence description, and whether it
draws on the research findings. Leave section content empty."#,
        brief, findings
    )
}

fn report_prompt(brief: &str, findings: &str, outline: Option<&[Section]>) -> String {
    let outline_block = match outline {
        Some(sections) => {
            let rendered = sections
                .iter()
                .map(|s| format!("- {}: {}", s.name, s.description))
                .collect::<Vec<_>>()
                .join("\n");
            format!("\n\nFollow this section outline:\n{}", rendered)
        }
        None => String::new(),
    };

    format!(
        r#"Write the final research report in Markdown for this brief:

{}

Use only these findings:

{}{}

Cite source URLs inline. Be thorough but do not pad; omit sections the
findings cannot support."#,
        brief, findings, outline_block
    )
}

// ============= Run Outcome =============

/// How a single `run` invocation ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The run reached `Done`; the session holds the final report.
    Completed(Session),
    /// The run suspended with a clarifying question as the session's
    /// last message. Append a human answer and re-invoke to resume.
    AwaitingClarification(Session),
}

impl RunOutcome {
    /// The session carried by either outcome.
    pub fn session(&self) -> &Session {
        match self {
            RunOutcome::Completed(session) => session,
            RunOutcome::AwaitingClarification(session) => session,
        }
    }

    /// Consume the outcome, returning the session.
    pub fn into_session(self) -> Session {
        match self {
            RunOutcome::Completed(session) => session,
            RunOutcome::AwaitingClarification(session) => session,
        }
    }

    /// Whether the run produced a final report.
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

/// A started run: the event stream to consume and the outcome to await.
pub struct RunHandle {
    /// Ordered orchestration events, ending with `RunCompleted`.
    pub events: mpsc::Receiver<ResearchEvent>,
    /// Resolves once the run terminates or suspends.
    pub outcome: JoinHandle<std::result::Result<RunOutcome, RunError>>,
}

// ============= Engine =============

struct EngineInner {
    config: ResearchConfig,
    models: ModelCache,
    search: Arc<dyn SearchProvider>,
    credential: String,
}

/// The research engine: owns the model cache and search provider, runs
/// sessions through the state machine.
///
/// Cloning is cheap and clones share the cache.
#[derive(Clone)]
pub struct ResearchEngine {
    inner: Arc<EngineInner>,
}

impl ResearchEngine {
    /// Validate the configuration and assemble an engine.
    pub fn new(
        config: ResearchConfig,
        search: Arc<dyn SearchProvider>,
        factory: Arc<dyn ModelFactory>,
    ) -> Result<Self> {
        config.validate()?;
        let credential = ModelFingerprint::credential_fingerprint(config.api_key.as_deref());
        Ok(Self {
            inner: Arc::new(EngineInner {
                models: ModelCache::new(factory),
                search,
                credential,
                config,
            }),
        })
    }

    /// The engine's configuration.
    pub fn config(&self) -> &ResearchConfig {
        &self.inner.config
    }

    /// The engine's model cache (mainly for stats).
    pub fn model_cache(&self) -> &ModelCache {
        &self.inner.models
    }

    fn model(&self, settings: &ModelSettings) -> Result<Arc<dyn LanguageModel>> {
        let fingerprint = ModelFingerprint::new(
            settings.model.clone(),
            settings.max_tokens,
            self.inner.credential.clone(),
            settings.max_retries,
        );
        self.inner.models.get_or_create(&fingerprint)
    }

    /// Spawn a run and hand back its event stream and outcome.
    pub fn start(&self, session: Session) -> RunHandle {
        let (sink, events) = EventSink::channel(self.inner.config.event_buffer);
        let engine = self.clone();
        let outcome = tokio::spawn(async move { engine.run_with_events(session, sink).await });
        RunHandle { events, outcome }
    }

    /// Run a session headless, without event narration.
    pub async fn run(&self, session: Session) -> std::result::Result<RunOutcome, RunError> {
        self.run_with_events(session, EventSink::disabled()).await
    }

    /// Run a session to completion or suspension, emitting events.
    pub async fn run_with_events(
        &self,
        mut session: Session,
        events: EventSink,
    ) -> std::result::Result<RunOutcome, RunError> {
        let config = &self.inner.config;
        let mut stage = Stage::AwaitingInput;
        let mut last_completed = Stage::AwaitingInput;

        tracing::info!(session = %session.id, topic = %session.topic, "starting research run");

        // The only valid entry states: a fresh topic, or a clarification
        // answer appended by the caller.
        match session.last_message() {
            Some(message) if message.role == MessageRole::Human => {}
            _ => {
                return Err(RunError::at(
                    last_completed,
                    ResearchError::Configuration(
                        "a run must start or resume with a human message".into(),
                    ),
                ));
            }
        }

        let research_model = self
            .model(&config.research_model)
            .map_err(|e| RunError::at(last_completed, e))?;
        let summarization_model = self
            .model(&config.summarization_model)
            .map_err(|e| RunError::at(last_completed, e))?;
        let compression_model = self
            .model(&config.compression_model)
            .map_err(|e| RunError::at(last_completed, e))?;
        let final_report_model = self
            .model(&config.final_report_model)
            .map_err(|e| RunError::at(last_completed, e))?;

        transition(&events, &mut stage, Stage::ClarifyingOrBrief).await;

        // ----- Clarification (advisory; parse failures degrade) -----
        if config.allow_clarification {
            match invoke_structured_as::<ClarificationDecision>(
                &*research_model,
                &clarify_prompt(&session),
                config.max_structured_output_retries,
            )
            .await
            {
                Ok(decision) if decision.need_clarification => {
                    tracing::info!(session = %session.id, "suspending for clarification");
                    session.push_assistant(decision.question.clone());
                    events
                        .emit(ResearchEvent::ClarificationRequested {
                            question: decision.question,
                        })
                        .await;
                    transition(&events, &mut stage, Stage::AwaitingClarification).await;
                    events.emit(ResearchEvent::RunCompleted { stage }).await;
                    return Ok(RunOutcome::AwaitingClarification(session));
                }
                Ok(decision) => {
                    if !decision.verification.trim().is_empty() {
                        session.push_assistant(decision.verification);
                    }
                }
                Err(ResearchError::StructuredOutput(err)) => {
                    tracing::warn!(error = %err, "clarification undecidable; proceeding to brief");
                }
                Err(other) => return Err(RunError::at(last_completed, other)),
            }
        }

        // ----- Brief (no fallback: exhausted retries are fatal) -----
        let brief = invoke_structured_as::<BriefOutput>(
            &*research_model,
            &brief_prompt(&session),
            config.max_structured_output_retries,
        )
        .await
        .map_err(|e| RunError::at(last_completed, e))?
        .research_brief;
        session.research_brief = Some(brief.clone());
        last_completed = Stage::ClarifyingOrBrief;

        // ----- Supervised research -----
        transition(&events, &mut stage, Stage::Supervising).await;

        let unit = Arc::new(ResearchUnit::new(
            research_model.clone(),
            summarization_model,
            self.inner.search.clone(),
            UnitOptions {
                format: SourceFormatOptions {
                    strategy: config.deduplication_strategy,
                    max_tokens_per_source: config.max_tokens_per_source,
                    include_raw_content: config.include_raw_content,
                },
                max_structured_output_retries: config.max_structured_output_retries,
            },
        ));
        let supervisor = Supervisor::new(
            research_model.clone(),
            unit,
            SupervisorOptions {
                max_researcher_iterations: config.max_researcher_iterations,
                max_concurrent_research_units: config.max_concurrent_research_units,
                max_unit_tool_calls: config.max_unit_tool_calls,
                max_structured_output_retries: config.max_structured_output_retries,
            },
        );
        supervisor
            .run(&brief, &mut session.notes, &events)
            .await
            .map_err(|e| RunError::at(last_completed, e))?;
        last_completed = Stage::Supervising;

        // ----- Compression (degraded fallback: raw notes) -----
        transition(&events, &mut stage, Stage::Compressing).await;

        let findings = match compress_notes(&*compression_model, &brief, &session.notes).await {
            Ok(findings) => findings,
            Err(err) => {
                tracing::warn!(error = %err, "compression exhausted retries; surfacing raw notes");
                dedup_notes(&session.notes).join("\n\n")
            }
        };
        last_completed = Stage::Compressing;

        // ----- Report generation (streamed) -----
        transition(&events, &mut stage, Stage::ReportGenerating).await;

        let outline = match invoke_structured_as::<ReportOutline>(
            &*final_report_model,
            &outline_prompt(&brief, &findings),
            config.max_structured_output_retries,
        )
        .await
        {
            Ok(outline) if !outline.sections.is_empty() => Some(outline.sections),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(error = %err, "report outline unavailable; writing without one");
                None
            }
        };

        let prompt = report_prompt(&brief, &findings, outline.as_deref());
        let mut stream = final_report_model
            .stream(&prompt)
            .await
            .map_err(|e| RunError::at(last_completed, e.into()))?;

        let mut report = String::new();
        while let Some(token) = stream.next().await {
            match token {
                Ok(text) => {
                    events
                        .emit(ResearchEvent::ReportToken { text: text.clone() })
                        .await;
                    report.push_str(&text);
                }
                Err(err) => return Err(RunError::at(last_completed, err.into())),
            }
        }

        if report.trim().is_empty() {
            return Err(RunError::at(
                last_completed,
                ResearchError::Model(ModelError::Fatal("model produced an empty report".into())),
            ));
        }

        session.final_report = Some(report);
        last_completed = Stage::ReportGenerating;

        transition(&events, &mut stage, Stage::Done).await;
        events.emit(ResearchEvent::RunCompleted { stage }).await;
        tracing::info!(session = %session.id, stage = %last_completed, "research run completed");

        Ok(RunOutcome::Completed(session))
    }
}

async fn transition(events: &EventSink, stage: &mut Stage, to: Stage) {
    events
        .emit(ResearchEvent::StageTransitioned { from: *stage, to })
        .await;
    *stage = to;
}

/// One model call over the deduplicated, concatenated notes. Retries and
/// backoff come from the handle's policy; an exhausted policy surfaces
/// here and the caller falls back to the raw notes.
async fn compress_notes(
    model: &dyn LanguageModel,
    brief: &str,
    notes: &[String],
) -> Result<String> {
    let deduped = dedup_notes(notes);
    if deduped.is_empty() {
        return Ok("No research notes were gathered.".to_string());
    }
    model
        .invoke(&compression_prompt(brief, &deduped))
        .await
        .map_err(Into::into)
}

/// Remove exact-duplicate notes, preserving first-seen order.
fn dedup_notes(notes: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    notes
        .iter()
        .filter(|n| seen.insert(n.as_str()))
        .cloned()
        .collect()
}
