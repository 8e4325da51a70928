//! Conditional content summarization.
//!
//! Raw page content can run to hundreds of kilobytes; condensing it is a
//! model call, and model calls are the expensive part of a run. Short
//! content therefore bypasses the model entirely. The short-circuit is
//! part of the contract, not an incidental optimization: callers and
//! tests rely on short content coming back unchanged with zero
//! invocations.

use crate::llm::{invoke_structured_as, LanguageModel};
use crate::types::{ResearchError, Result};
use schemars::JsonSchema;
use serde::Deserialize;

/// Content at or below this many bytes is returned unmodified.
pub const SUMMARIZATION_CHAR_THRESHOLD: usize = 3000;

/// Opening tag of the rendered summary segment.
pub const SUMMARY_OPEN_TAG: &str = "<summary>";

/// Structured result of a summarization call.
#[derive(Debug, Deserialize, JsonSchema)]
struct WebpageSummary {
    /// Condensed prose covering the page's substance.
    summary: String,
    /// Verbatim passages worth quoting in notes.
    key_excerpts: String,
}

fn summarization_prompt(content: &str) -> String {
    format!(
        r#"Condense the following webpage content for a research assistant.

Produce a faithful summary of the substantive information and collect the
most important verbatim excerpts. Do not editorialize and do not add
information that is not on the page.

<webpage_content>
{}
</webpage_content>"#,
        content
    )
}

/// Summarize `content`, skipping the model entirely when it is short.
///
/// Long content costs exactly one structured model call (plus whatever
/// the handle's retry policy adds) and renders into a fixed template with
/// tagged summary and excerpt segments. Failures after retries surface as
/// [`ResearchError::Summarization`], which the supervisor treats as a
/// unit-level failure.
pub async fn summarize_content(
    model: &dyn LanguageModel,
    content: &str,
    max_structured_output_retries: u32,
) -> Result<String> {
    if content.len() <= SUMMARIZATION_CHAR_THRESHOLD {
        return Ok(content.to_string());
    }

    let summary: WebpageSummary = invoke_structured_as(
        model,
        &summarization_prompt(content),
        max_structured_output_retries,
    )
    .await
    .map_err(|e| ResearchError::Summarization(e.to_string()))?;

    Ok(format!(
        "<summary>\n{}\n</summary>\n\n<key_excerpts>\n{}\n</key_excerpts>",
        summary.summary, summary.key_excerpts
    ))
}
