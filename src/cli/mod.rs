//! CLI module for Delve.
//!
//! Provides command-line parsing and the interactive research loop for the
//! delve-cli binary. Uses clap for argument parsing and owo-colors for
//! colored terminal output.

pub mod output;

use crate::cli::output::Output;
use crate::config::{DeduplicationStrategy, ResearchConfig};
use crate::llm::openai::OpenAiModelFactory;
use crate::research::{ResearchEngine, RunOutcome};
use crate::search::tavily::TavilyProvider;
use crate::types::Session;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

/// Delve - Agentic Deep-Research Engine
#[derive(Parser, Debug)]
#[command(
    name = "delve-cli",
    author = "Dirmacs <build@dirmacs.com>",
    version,
    about = "Delve - Agentic Deep-Research Engine",
    long_about = "An agentic deep-research engine: clarifies a topic, writes a research\n\
                  brief, supervises concurrent research units, and streams a final report.",
    after_help = "EXAMPLES:\n    \
                  delve-cli research \"history of the transistor\"\n    \
                  delve-cli research \"rust async runtimes\" --max-concurrent 5 --no-clarify\n    \
                  delve-cli research \"quantum error correction\" --research-model openai:gpt-4.1"
)]
pub struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run deep research on a topic
    Research {
        /// The research topic
        topic: String,

        /// Max supervision rounds
        #[arg(long, default_value_t = 3)]
        max_iterations: u32,

        /// Max concurrent research units
        #[arg(long, default_value_t = 3)]
        max_concurrent: usize,

        /// Model for research (provider:model form)
        #[arg(long)]
        research_model: Option<String>,

        /// Skip the clarification stage
        #[arg(long)]
        no_clarify: bool,

        /// Keep only the latest result per URL instead of the earliest
        #[arg(long)]
        keep_last: bool,
    },
}

/// Parse arguments, assemble the engine, and run the requested command.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let out = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    match cli.command {
        Commands::Research {
            topic,
            max_iterations,
            max_concurrent,
            research_model,
            no_clarify,
            keep_last,
        } => {
            let mut config = ResearchConfig::from_env()?
                .with_max_researcher_iterations(max_iterations)
                .with_max_concurrent_research_units(max_concurrent)
                .with_clarification(!no_clarify);
            if keep_last {
                config = config.with_deduplication_strategy(DeduplicationStrategy::KeepLast);
            }
            if let Some(model) = research_model {
                config.research_model.model = model;
            }

            let search = TavilyProvider::from_env().context("search provider setup failed")?;
            let factory = OpenAiModelFactory::from_env();
            let engine = ResearchEngine::new(config, Arc::new(search), Arc::new(factory))
                .context("engine setup failed")?;

            research_loop(&engine, &out, topic).await
        }
    }
}

/// Drive a session to a final report, looping through clarification
/// suspensions by prompting on stdin.
async fn research_loop(engine: &ResearchEngine, out: &Output, topic: String) -> anyhow::Result<()> {
    out.banner();
    let mut session = Session::new(topic);

    loop {
        let mut handle = engine.start(session);
        let mut streaming_report = false;

        while let Some(event) = handle.events.recv().await {
            if matches!(event, crate::events::ResearchEvent::ReportToken { .. }) && !streaming_report
            {
                out.report_header();
                streaming_report = true;
            }
            out.event(&event);
        }

        let outcome = handle
            .outcome
            .await
            .context("run task aborted")?
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        match outcome {
            RunOutcome::Completed(done) => {
                // The report already streamed token by token; just close
                // the line.
                println!();
                tracing::debug!(notes = done.notes.len(), "session finished");
                return Ok(());
            }
            RunOutcome::AwaitingClarification(mut suspended) => {
                print!("your answer: ");
                io::stdout().flush().ok();
                let mut answer = String::new();
                io::stdin()
                    .lock()
                    .read_line(&mut answer)
                    .context("failed to read clarification answer")?;
                suspended.push_human(answer.trim().to_string());
                session = suspended;
            }
        }
    }
}
