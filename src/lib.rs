//! # Delve - Agentic Deep-Research Engine
//!
//! An automated research workflow in Rust: given a topic, Delve clarifies
//! ambiguity, drafts a research brief, dispatches and supervises
//! concurrent research units that gather and condense information,
//! deduplicates and stitches their findings, and synthesizes a final
//! report streamed token by token.
//!
//! ## Overview
//!
//! Delve can be used in two ways:
//!
//! 1. **As a CLI** - Run the `delve-cli` binary
//! 2. **As a library** - Drive [`ResearchEngine`] from your own code
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use delve::config::ResearchConfig;
//! use delve::llm::openai::OpenAiModelFactory;
//! use delve::research::{ResearchEngine, RunOutcome};
//! use delve::search::tavily::TavilyProvider;
//! use delve::types::Session;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = ResearchEngine::new(
//!         ResearchConfig::from_env()?,
//!         Arc::new(TavilyProvider::from_env()?),
//!         Arc::new(OpenAiModelFactory::from_env()),
//!     )?;
//!
//!     let mut handle = engine.start(Session::new("history of the transistor"));
//!     while let Some(event) = handle.events.recv().await {
//!         println!("{:?}", event);
//!     }
//!
//!     match handle.outcome.await?? {
//!         RunOutcome::Completed(session) => {
//!             println!("{}", session.final_report.unwrap_or_default());
//!         }
//!         RunOutcome::AwaitingClarification(session) => {
//!             println!("{}", session.last_message().unwrap().content);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The run is a state machine: `AwaitingInput → ClarifyingOrBrief →
//! Supervising → Compressing → ReportGenerating → Done`, with
//! `AwaitingClarification` as the single resumable suspension point. The
//! supervisor bounds concurrency with two independent ceilings (units in
//! flight, rounds overall); each round is a synchronization barrier.
//! Model handles are memoized process-wide by configuration fingerprint,
//! and progress is narrated over a bounded event channel.
//!
//! ## Modules
//!
//! - [`research`] - Orchestrator, supervisor, units, dedup/stitch/summarize
//! - [`llm`] - Model trait, retry decorator, handle cache, OpenAI client
//! - [`search`] - Search provider trait and the Tavily client
//! - [`events`] - Orchestration event union and bounded channel
//! - [`config`] - Engine configuration and validation
//! - [`types`] - Session, messages, search data, errors

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// Command-line interface for the delve-cli binary.
pub mod cli;
/// Engine configuration and validation.
pub mod config;
/// Orchestration events and the bounded event channel.
pub mod events;
/// Language-model trait, retry policy, cache, and clients.
pub mod llm;
/// The research pipeline: orchestrator, supervisor, units, formatting.
pub mod research;
/// Search provider trait and clients.
pub mod search;
/// Core types and error handling.
pub mod types;

// Re-export commonly used types
pub use config::{DeduplicationStrategy, ModelSettings, ResearchConfig};
pub use events::{EventSink, ResearchEvent};
pub use llm::cache::{ModelCache, ModelFactory, ModelFingerprint};
pub use llm::retry::RetryPolicy;
pub use llm::LanguageModel;
pub use research::{ResearchEngine, ResearchUnit, ResearchUnitTask, RunHandle, RunOutcome, Supervisor};
pub use search::SearchProvider;
pub use types::{
    Message, MessageRole, ModelError, ResearchError, Result, RunError, SearchError,
    SearchResponse, SearchResult, Session, Stage,
};
