//! Document stitching.
//!
//! Some providers return a page as several chunks, and repeated queries
//! often hit the same origin. Stitching merges every fragment sharing a
//! URL into one logical document so downstream summarization sees whole
//! pages instead of shards.

use crate::types::{DocumentFragment, StitchedDocument};
use std::collections::{HashMap, HashSet};

/// Separator between wrapped fragments inside one stitched document.
const FRAGMENT_JOIN: &str = "\n\n";

fn wrap_fragment(content: &str) -> String {
    format!("...{}...", content)
}

/// Merge fragments by exact URL into one document per origin.
///
/// Within a group, fragments concatenate in first-seen order, each
/// wrapped in `...` delimiters; a fragment whose text already appears in
/// the group byte-for-byte is skipped, so stitching is idempotent. The
/// document's title comes from the first fragment seen for its URL,
/// regardless of later fragments' metadata. Output follows first-seen
/// URL order; empty input yields an empty output.
pub fn stitch_documents_by_url(fragments: &[DocumentFragment]) -> Vec<StitchedDocument> {
    let mut order: Vec<&str> = Vec::new();
    let mut titles: HashMap<&str, &str> = HashMap::new();
    let mut contents: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut seen: HashMap<&str, HashSet<&str>> = HashMap::new();

    for fragment in fragments {
        let url = fragment.url.as_str();
        if !titles.contains_key(url) {
            order.push(url);
            titles.insert(url, fragment.title.as_str());
        }

        let group_seen = seen.entry(url).or_default();
        if group_seen.insert(fragment.content.as_str()) {
            contents.entry(url).or_default().push(&fragment.content);
        }
    }

    order
        .into_iter()
        .map(|url| StitchedDocument {
            url: url.to_string(),
            title: titles[url].to_string(),
            content: contents[url]
                .iter()
                .map(|c| wrap_fragment(c))
                .collect::<Vec<_>>()
                .join(FRAGMENT_JOIN),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(url: &str, title: &str, content: &str) -> DocumentFragment {
        DocumentFragment::new(url, title, content)
    }

    #[test]
    fn test_fragments_group_by_url() {
        let fragments = vec![
            fragment("http://example.com/1", "Title 1", "Content 1"),
            fragment("http://example.com/1", "Title 1", "Content 2"),
            fragment("http://example.com/2", "Title 2", "Content 3"),
        ];

        let stitched = stitch_documents_by_url(&fragments);
        assert_eq!(stitched.len(), 2);

        let doc1 = &stitched[0];
        assert_eq!(doc1.url, "http://example.com/1");
        assert!(doc1.content.contains("...Content 1..."));
        assert!(doc1.content.contains("...Content 2..."));

        let doc2 = &stitched[1];
        assert_eq!(doc2.url, "http://example.com/2");
        assert_eq!(doc2.content, "...Content 3...");
    }

    #[test]
    fn test_identical_fragments_are_stitched_once() {
        let fragments = vec![
            fragment("http://example.com/1", "T", "Content 1"),
            fragment("http://example.com/1", "T", "Content 1"),
            fragment("http://example.com/1", "T", "Content 2"),
        ];

        let stitched = stitch_documents_by_url(&fragments);
        assert_eq!(stitched.len(), 1);
        assert_eq!(stitched[0].content.matches("Content 1").count(), 1);
        assert!(stitched[0].content.contains("Content 2"));
    }

    #[test]
    fn test_first_fragment_metadata_wins() {
        let fragments = vec![
            fragment("http://example.com/1", "Title A", "Content 1"),
            fragment("http://example.com/1", "Title B", "Content 2"),
        ];

        let stitched = stitch_documents_by_url(&fragments);
        assert_eq!(stitched.len(), 1);
        assert_eq!(stitched[0].title, "Title A");
    }

    #[test]
    fn test_output_follows_first_seen_url_order() {
        let fragments = vec![
            fragment("http://b.example", "B", "b1"),
            fragment("http://a.example", "A", "a1"),
            fragment("http://b.example", "B", "b2"),
        ];

        let urls: Vec<_> = stitch_documents_by_url(&fragments)
            .into_iter()
            .map(|d| d.url)
            .collect();
        assert_eq!(urls, vec!["http://b.example", "http://a.example"]);
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        assert!(stitch_documents_by_url(&[]).is_empty());
    }
}
