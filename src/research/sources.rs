//! Source deduplication and formatting.
//!
//! Flattens search responses into one ordered list, collapses duplicate
//! URLs under the configured strategy, and renders the survivors as a
//! single text bundle for note-taking prompts.

use crate::config::DeduplicationStrategy;
use crate::types::{SearchResponse, Source};
use std::collections::HashMap;

/// Banner prefixing every formatted bundle, present even for zero sources.
pub const SOURCES_BANNER: &str = "Sources:\n\n";

/// Fixed-width rule separating source blocks.
const BLOCK_RULE: &str =
    "================================================================================";

/// Marker appended when raw content exceeds its character budget.
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// Placeholder rendered when raw content was requested but absent.
const MISSING_RAW_CONTENT: &str = "[no raw content available]";

/// Formatting knobs for [`deduplicate_and_format`].
#[derive(Debug, Clone)]
pub struct SourceFormatOptions {
    /// Which result survives when two share a URL.
    pub strategy: DeduplicationStrategy,
    /// Approximate token budget per source; the character budget is four
    /// times this value.
    pub max_tokens_per_source: usize,
    /// Whether to render raw page content at all.
    pub include_raw_content: bool,
}

impl Default for SourceFormatOptions {
    fn default() -> Self {
        Self {
            strategy: DeduplicationStrategy::KeepFirst,
            max_tokens_per_source: 4000,
            include_raw_content: true,
        }
    }
}

/// Collapse all results across all responses to at most one [`Source`]
/// per distinct URL.
///
/// Output ordering is always first-occurrence order of each URL.
/// `KeepFirst` keeps the earliest-seen result for a URL; `KeepLast` keeps
/// the latest-seen result's fields while leaving the URL in its
/// first-seen slot. The positional rule is deliberate: position is fixed
/// at first occurrence, content at last occurrence.
pub fn deduplicate_sources(
    responses: &[SearchResponse],
    strategy: DeduplicationStrategy,
) -> Vec<Source> {
    let mut order: Vec<&str> = Vec::new();
    let mut by_url: HashMap<&str, &crate::types::SearchResult> = HashMap::new();

    for result in responses.iter().flat_map(|r| r.results.iter()) {
        match strategy {
            DeduplicationStrategy::KeepFirst => {
                if !by_url.contains_key(result.url.as_str()) {
                    order.push(&result.url);
                    by_url.insert(&result.url, result);
                }
            }
            DeduplicationStrategy::KeepLast => {
                if !by_url.contains_key(result.url.as_str()) {
                    order.push(&result.url);
                }
                by_url.insert(&result.url, result);
            }
        }
    }

    order
        .iter()
        .map(|url| Source::from(by_url[url].clone()))
        .collect()
}

/// Render deduplicated sources as one prompt-ready text bundle.
pub fn format_sources(sources: &[Source], options: &SourceFormatOptions) -> String {
    let mut blocks = Vec::with_capacity(sources.len());

    for source in sources {
        let mut block = String::new();
        block.push_str(&format!("Source: {}\n", source.title));
        block.push_str(&format!("URL: {}\n", source.url));
        block.push_str(&format!(
            "Most relevant content from source: {}\n",
            source.content
        ));

        if options.include_raw_content {
            let segment = match &source.raw_content {
                Some(raw) => {
                    let char_limit = options.max_tokens_per_source * 4;
                    if raw.chars().count() > char_limit {
                        let truncated: String = raw.chars().take(char_limit).collect();
                        format!("{}{}", truncated, TRUNCATION_MARKER)
                    } else {
                        raw.clone()
                    }
                }
                None => MISSING_RAW_CONTENT.to_string(),
            };
            block.push_str(&format!(
                "Full source content limited to {} tokens: {}\n",
                options.max_tokens_per_source, segment
            ));
        }

        blocks.push(block);
    }

    let mut output = String::from(SOURCES_BANNER);
    output.push_str(&blocks.join(&format!("{}\n", BLOCK_RULE)));
    output.trim_end().to_string()
}

/// Deduplicate and format in one pass.
pub fn deduplicate_and_format(
    responses: &[SearchResponse],
    options: &SourceFormatOptions,
) -> String {
    let sources = deduplicate_sources(responses, options.strategy);
    format_sources(&sources, options)
}
