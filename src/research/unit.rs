//! A single bounded research unit.
//!
//! One unit executes one sub-task handed down by the supervisor: plan a
//! handful of search queries, run them, consolidate and condense what
//! came back, and record notes. Everything inside a unit is strictly
//! sequential; parallelism lives one level up.

use crate::llm::{invoke_structured_as, LanguageModel};
use crate::research::sources::{deduplicate_and_format, SourceFormatOptions};
use crate::research::stitch::stitch_documents_by_url;
use crate::research::summarize::summarize_content;
use crate::search::SearchProvider;
use crate::types::{DocumentFragment, ResearchError, Result, SearchResponse, SearchResult};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

/// One sub-task dispatched by the supervisor.
#[derive(Debug, Clone)]
pub struct ResearchUnitTask {
    /// What this unit should find out.
    pub instructions: String,
    /// Search-call budget for the unit.
    pub iteration_budget: u32,
}

/// Knobs shared by every unit of a run.
#[derive(Debug, Clone)]
pub struct UnitOptions {
    /// Source deduplication and rendering options.
    pub format: SourceFormatOptions,
    /// Parse attempts for structured output.
    pub max_structured_output_retries: u32,
}

/// Search queries planned for a sub-task.
#[derive(Debug, Deserialize, JsonSchema)]
struct SearchQueryPlan {
    /// Queries in the order they should run.
    queries: Vec<String>,
}

fn query_plan_prompt(task: &ResearchUnitTask) -> String {
    format!(
        r#"You are planning web searches for a research sub-task.

Sub-task:
{}

Propose up to {} distinct search queries that together cover the sub-task.
Prefer fewer, sharper queries over many overlapping ones."#,
        task.instructions, task.iteration_budget
    )
}

fn record_notes_prompt(task: &ResearchUnitTask, bundle: &str) -> String {
    format!(
        r#"You are recording research notes for a sub-task.

Sub-task:
{}

{}

Write dense factual notes answering the sub-task from these sources only.
Cite the source URL inline after each claim. State explicitly when the
sources do not answer part of the sub-task."#,
        task.instructions, bundle
    )
}

/// Executes one [`ResearchUnitTask`] end to end.
///
/// Units are cheap, stateless values; the supervisor shares one behind an
/// `Arc` across every dispatch.
pub struct ResearchUnit {
    research_model: Arc<dyn LanguageModel>,
    summarization_model: Arc<dyn LanguageModel>,
    search: Arc<dyn SearchProvider>,
    options: UnitOptions,
}

impl ResearchUnit {
    /// Assemble a unit from its collaborators.
    pub fn new(
        research_model: Arc<dyn LanguageModel>,
        summarization_model: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
        options: UnitOptions,
    ) -> Self {
        Self {
            research_model,
            summarization_model,
            search,
            options,
        }
    }

    /// Run the sub-task and return its notes.
    ///
    /// Any failure (model, search, summarization) propagates; the
    /// supervisor records the unit as an empty-notes result and keeps
    /// sibling units running.
    pub async fn execute(&self, task: &ResearchUnitTask) -> Result<Vec<String>> {
        let queries = self.plan_queries(task).await?;
        tracing::debug!(count = queries.len(), "research unit planned queries");

        let mut responses = Vec::with_capacity(queries.len());
        for query in &queries {
            let response = self.search.search(query).await?;
            responses.push(consolidate_response(response));
        }

        if responses.iter().all(|r| r.results.is_empty()) {
            tracing::debug!("research unit found no results; recording no notes");
            return Ok(Vec::new());
        }

        for response in &mut responses {
            for result in &mut response.results {
                if let Some(raw) = result.raw_content.take() {
                    let condensed = summarize_content(
                        &*self.summarization_model,
                        &raw,
                        self.options.max_structured_output_retries,
                    )
                    .await?;
                    result.raw_content = Some(condensed);
                }
            }
        }

        let bundle = deduplicate_and_format(&responses, &self.options.format);
        let note = self
            .research_model
            .invoke(&record_notes_prompt(task, &bundle))
            .await?;

        Ok(vec![note])
    }

    /// Ask the model for search queries, degrading to the raw
    /// instructions when the plan cannot be parsed.
    async fn plan_queries(&self, task: &ResearchUnitTask) -> Result<Vec<String>> {
        let plan = invoke_structured_as::<SearchQueryPlan>(
            &*self.research_model,
            &query_plan_prompt(task),
            self.options.max_structured_output_retries,
        )
        .await;

        let queries = match plan {
            Ok(plan) => plan
                .queries
                .into_iter()
                .filter(|q| !q.trim().is_empty())
                .take(task.iteration_budget as usize)
                .collect::<Vec<_>>(),
            Err(ResearchError::StructuredOutput(err)) => {
                tracing::warn!(error = %err, "query plan unparseable; searching instructions verbatim");
                Vec::new()
            }
            Err(other) => return Err(other),
        };

        if queries.is_empty() {
            return Ok(vec![task.instructions.clone()]);
        }
        Ok(queries)
    }
}

/// Merge chunked results within one response: providers may emit several
/// entries for the same URL, and stitching folds them into one logical
/// result before cross-response deduplication happens.
fn consolidate_response(response: SearchResponse) -> SearchResponse {
    let fragments: Vec<DocumentFragment> = response
        .results
        .iter()
        .map(|r| DocumentFragment::new(&r.url, &r.title, &r.content))
        .collect();
    let stitched = stitch_documents_by_url(&fragments);

    if stitched.len() == response.results.len() {
        // Nothing shared a URL; keep the results untouched.
        return response;
    }

    let results = stitched
        .into_iter()
        .map(|doc| {
            let first = response
                .results
                .iter()
                .find(|r| r.url == doc.url)
                .expect("stitched document has an originating result");
            SearchResult {
                title: doc.title,
                url: doc.url,
                content: doc.content,
                score: first.score,
                raw_content: first.raw_content.clone(),
            }
        })
        .collect();

    SearchResponse {
        query: response.query,
        results,
    }
}
