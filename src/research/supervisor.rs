//! Bounded-concurrency research supervision.
//!
//! The supervisor runs rounds: ask the model what to investigate next,
//! dispatch one research unit per sub-task with true overlap up to the
//! concurrency cap, wait for every dispatched unit to finish (the round
//! barrier), and fold their notes into the session in completion order.
//! Two independent ceilings bound the work: units running at once, and
//! rounds overall.

use crate::events::{EventSink, ResearchEvent};
use crate::llm::{invoke_structured_as, LanguageModel};
use crate::research::unit::{ResearchUnit, ResearchUnitTask};
use crate::types::{ResearchError, Result};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Ceilings and budgets for one supervision run.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Rounds ceiling. Reaching it is a normal stop.
    pub max_researcher_iterations: u32,
    /// Parallelism ceiling for in-flight units.
    pub max_concurrent_research_units: usize,
    /// Search-call budget handed to each unit.
    pub max_unit_tool_calls: u32,
    /// Parse attempts for the round directive.
    pub max_structured_output_retries: u32,
}

/// The model's plan for one round.
#[derive(Debug, Deserialize, JsonSchema)]
struct SupervisorDirective {
    /// True when no further research is needed.
    research_complete: bool,
    /// Sub-tasks to dispatch this round. May be empty.
    research_tasks: Vec<String>,
}

fn directive_prompt(brief: &str, notes: &[String], round: u32, rounds_left: u32) -> String {
    let notes_block = if notes.is_empty() {
        "(no notes gathered yet)".to_string()
    } else {
        notes.join("\n\n")
    };

    format!(
        r#"You are supervising a team of research units working on this brief:

{}

Notes gathered so far:
{}

This is round {} and {} round(s) remain after it. Decide what to do next:
either declare the research complete, or list the independent sub-tasks
that should be investigated concurrently this round. Each sub-task must be
self-contained instructions a researcher can execute without further
context. Do not repeat work the notes already cover."#,
        brief, notes_block, round, rounds_left
    )
}

/// Drives concurrent research units until the model is satisfied or the
/// round ceiling is reached.
pub struct Supervisor {
    model: Arc<dyn LanguageModel>,
    unit: Arc<ResearchUnit>,
    options: SupervisorOptions,
}

impl Supervisor {
    /// Create a supervisor over a directive model and a unit template.
    pub fn new(
        model: Arc<dyn LanguageModel>,
        unit: Arc<ResearchUnit>,
        options: SupervisorOptions,
    ) -> Self {
        Self {
            model,
            unit,
            options,
        }
    }

    /// Run supervision, appending unit notes to `notes` in
    /// unit-completion order.
    ///
    /// Unit failures are recorded as empty-notes results and never abort
    /// the round. An unparseable directive stops supervision with
    /// whatever has accumulated, as does the round ceiling; both are
    /// normal terminations.
    pub async fn run(&self, brief: &str, notes: &mut Vec<String>, events: &EventSink) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_research_units));

        for round in 1..=self.options.max_researcher_iterations {
            let rounds_left = self.options.max_researcher_iterations - round;
            let prompt = directive_prompt(brief, notes, round, rounds_left);

            let directive = match invoke_structured_as::<SupervisorDirective>(
                &*self.model,
                &prompt,
                self.options.max_structured_output_retries,
            )
            .await
            {
                Ok(directive) => directive,
                Err(ResearchError::StructuredOutput(err)) => {
                    tracing::warn!(round, error = %err, "directive unparseable; ending supervision");
                    return Ok(());
                }
                Err(other) => return Err(other),
            };

            if directive.research_complete {
                tracing::info!(round, "supervisor declared research complete");
                return Ok(());
            }

            let tasks: Vec<String> = directive
                .research_tasks
                .into_iter()
                .filter(|t| !t.trim().is_empty())
                .collect();
            if tasks.is_empty() {
                tracing::info!(round, "supervisor proposed no sub-tasks; ending supervision");
                return Ok(());
            }

            tracing::info!(round, units = tasks.len(), "dispatching research units");
            self.run_round(round, tasks, &semaphore, notes, events).await;
        }

        tracing::info!(
            rounds = self.options.max_researcher_iterations,
            "iteration ceiling reached; ending supervision"
        );
        Ok(())
    }

    /// Dispatch one round of units and wait for all of them: the round is
    /// a synchronization barrier.
    async fn run_round(
        &self,
        round: u32,
        tasks: Vec<String>,
        semaphore: &Arc<Semaphore>,
        notes: &mut Vec<String>,
        events: &EventSink,
    ) {
        let mut set = JoinSet::new();

        for (index, instructions) in tasks.into_iter().enumerate() {
            let index = index as u32;
            let task = ResearchUnitTask {
                instructions: instructions.clone(),
                iteration_budget: self.options.max_unit_tool_calls,
            };
            let unit = self.unit.clone();
            let semaphore = semaphore.clone();
            let events = events.clone();

            set.spawn(async move {
                // Queue here until a running slot frees up.
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            index,
                            Err(ResearchError::Configuration(
                                "supervisor semaphore closed".into(),
                            )),
                            0u64,
                        );
                    }
                };

                events
                    .emit(ResearchEvent::UnitStarted {
                        round,
                        unit: index,
                        instructions,
                    })
                    .await;

                let started = Instant::now();
                let result = unit.execute(&task).await;
                (index, result, started.elapsed().as_millis() as u64)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, Ok(unit_notes), duration_ms)) => {
                    events
                        .emit(ResearchEvent::UnitFinished {
                            round,
                            unit: index,
                            note_count: unit_notes.len(),
                            duration_ms,
                            failed: false,
                        })
                        .await;
                    notes.extend(unit_notes);
                }
                Ok((index, Err(err), duration_ms)) => {
                    // Partial-failure tolerance: the unit contributes
                    // nothing, siblings keep running.
                    tracing::warn!(round, unit = index, error = %err, "research unit failed");
                    events
                        .emit(ResearchEvent::UnitFinished {
                            round,
                            unit: index,
                            note_count: 0,
                            duration_ms,
                            failed: true,
                        })
                        .await;
                }
                Err(join_err) => {
                    tracing::warn!(round, error = %join_err, "research unit task aborted");
                }
            }
        }
    }
}
