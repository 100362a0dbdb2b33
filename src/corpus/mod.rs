//! Suggestion corpus loading and flattening.
//!
//! The input artifact is a JSON object with two top-level collections
//! (`reviewThreadSuggestions` and `commentSuggestions`), each holding
//! groups of extracted [`Opinion`] records. The flattener walks both
//! collections in order and produces one [`FlattenedItem`] per usable
//! opinion, assigning sequential 0-based indices. That index is the join
//! key that threads item metadata through every later pipeline stage.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

use crate::error::Result;

/// One design suggestion extracted from a PR review thread or comment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opinion {
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub contexts: Vec<String>,
    /// Free-form category label assigned during extraction.
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Opaque identifier from the external knowledge-base system.
    #[serde(default)]
    pub card_id: String,
}

/// A review thread and the opinions extracted from it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadGroup {
    #[serde(default)]
    pub review_thread_id: String,
    #[serde(default)]
    pub opinions: Vec<Opinion>,
}

/// A PR comment and the opinions extracted from it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentGroup {
    #[serde(default)]
    pub comment_id: String,
    #[serde(default)]
    pub opinions: Vec<Opinion>,
}

/// The raw nested corpus as produced by the extraction stage.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionCorpus {
    #[serde(default)]
    pub review_thread_suggestions: Vec<ThreadGroup>,
    #[serde(default)]
    pub comment_suggestions: Vec<CommentGroup>,
}

impl SuggestionCorpus {
    /// Load a corpus from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        info!("loading corpus from {}", path.display());
        let file = File::open(path)?;
        let corpus: SuggestionCorpus = serde_json::from_reader(BufReader::new(file))?;
        Ok(corpus)
    }
}

/// Where an opinion originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpinionSource {
    ReviewThread,
    Comment,
}

/// Descriptive fields of an opinion, carried verbatim into the export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<String>,
    pub problem: String,
    pub suggestion: String,
    pub reasons: Vec<String>,
    pub contexts: Vec<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub card_id: String,
    pub source: OpinionSource,
}

/// The unit the pipeline operates on: one opinion, flattened.
///
/// `index` is 0-based, unique, and stable for the lifetime of a run.
/// `text` is what gets embedded; `metadata` is threaded through to the
/// exported artifact unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenedItem {
    pub index: usize,
    pub text: String,
    pub metadata: ItemMetadata,
}

/// Result of flattening a corpus: the items plus a count of records
/// skipped because both text fields were missing.
#[derive(Debug, Default)]
pub struct FlattenOutcome {
    pub items: Vec<FlattenedItem>,
    pub skipped: usize,
}

/// Combine the two semantic facets of an opinion into the embedded text.
///
/// Both facets are always present, prefixed and in a fixed order, so the
/// embedding sees the same structure for every item. Whitespace runs are
/// collapsed to keep the text model-friendly.
fn combined_text(problem: &str, suggestion: &str) -> String {
    let raw = format!("Problem: {} Suggestion: {}", problem.trim(), suggestion.trim());
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_opinion(
    out: &mut FlattenOutcome,
    opinion: &Opinion,
    thread_id: Option<&str>,
    comment_id: Option<&str>,
    source: OpinionSource,
) {
    let problem = opinion.problem.trim();
    let suggestion = opinion.suggestion.trim();

    // Records with neither facet carry nothing to embed; counted, not fatal.
    if problem.is_empty() && suggestion.is_empty() {
        out.skipped += 1;
        debug!("skipping opinion with empty problem and suggestion");
        return;
    }

    let metadata = ItemMetadata {
        thread_id: thread_id.map(str::to_owned),
        comment_id: comment_id.map(str::to_owned),
        problem: problem.to_owned(),
        suggestion: suggestion.to_owned(),
        reasons: opinion.reasons.clone(),
        contexts: opinion.contexts.clone(),
        kind: opinion.kind.clone(),
        card_id: opinion.card_id.clone(),
        source,
    };

    out.items.push(FlattenedItem {
        index: out.items.len(),
        text: combined_text(problem, suggestion),
        metadata,
    });
}

/// Flatten the nested corpus into an ordered, indexed item sequence.
///
/// Ordering is deterministic for a given input: review-thread groups
/// first, then comment groups, each in encounter order.
pub fn flatten(corpus: &SuggestionCorpus) -> FlattenOutcome {
    let mut out = FlattenOutcome::default();

    for group in &corpus.review_thread_suggestions {
        for opinion in &group.opinions {
            push_opinion(
                &mut out,
                opinion,
                Some(&group.review_thread_id),
                None,
                OpinionSource::ReviewThread,
            );
        }
    }

    for group in &corpus.comment_suggestions {
        for opinion in &group.opinions {
            push_opinion(
                &mut out,
                opinion,
                None,
                Some(&group.comment_id),
                OpinionSource::Comment,
            );
        }
    }

    info!(
        "flattened corpus: {} items, {} skipped",
        out.items.len(),
        out.skipped
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opinion(problem: &str, suggestion: &str) -> Opinion {
        Opinion {
            problem: problem.to_string(),
            suggestion: suggestion.to_string(),
            reasons: vec!["because".to_string()],
            contexts: Vec::new(),
            kind: "design".to_string(),
            card_id: "card-1".to_string(),
        }
    }

    fn corpus_with(thread_ops: Vec<Opinion>, comment_ops: Vec<Opinion>) -> SuggestionCorpus {
        SuggestionCorpus {
            review_thread_suggestions: vec![ThreadGroup {
                review_thread_id: "RT_1".to_string(),
                opinions: thread_ops,
            }],
            comment_suggestions: vec![CommentGroup {
                comment_id: "IC_1".to_string(),
                opinions: comment_ops,
            }],
        }
    }

    #[test]
    fn flatten_assigns_sequential_indices_in_encounter_order() {
        let corpus = corpus_with(
            vec![opinion("p0", "s0"), opinion("p1", "s1")],
            vec![opinion("p2", "s2")],
        );

        let out = flatten(&corpus);
        assert_eq!(out.items.len(), 3);
        assert_eq!(out.skipped, 0);
        for (i, item) in out.items.iter().enumerate() {
            assert_eq!(item.index, i);
        }
        assert_eq!(out.items[0].metadata.source, OpinionSource::ReviewThread);
        assert_eq!(out.items[0].metadata.thread_id.as_deref(), Some("RT_1"));
        assert_eq!(out.items[2].metadata.source, OpinionSource::Comment);
        assert_eq!(out.items[2].metadata.comment_id.as_deref(), Some("IC_1"));
    }

    #[test]
    fn flatten_skips_opinions_missing_both_facets() {
        let corpus = corpus_with(
            vec![opinion("p0", "s0"), opinion("", ""), opinion("p1", "s1")],
            vec![opinion("p2", "s2")],
        );

        let out = flatten(&corpus);
        assert_eq!(out.items.len(), 3);
        assert_eq!(out.skipped, 1);
        // Indices stay contiguous despite the skip.
        assert_eq!(out.items[1].index, 1);
        assert_eq!(out.items[1].metadata.problem, "p1");
    }

    #[test]
    fn flatten_keeps_opinions_with_one_facet() {
        let corpus = corpus_with(vec![opinion("only problem", "")], vec![]);
        let out = flatten(&corpus);
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].text, "Problem: only problem Suggestion:");
    }

    #[test]
    fn combined_text_normalizes_whitespace() {
        let text = combined_text("  too   many\n spaces ", "tab\there");
        assert_eq!(text, "Problem: too many spaces Suggestion: tab here");
    }

    #[test]
    fn corpus_parses_camel_case_json() {
        let json = r#"{
            "reviewThreadSuggestions": [{
                "reviewThreadId": "RT_9",
                "opinions": [{
                    "problem": "tight coupling",
                    "suggestion": "introduce a trait",
                    "reasons": ["testability"],
                    "contexts": [],
                    "type": "architecture",
                    "cardId": "c42"
                }]
            }],
            "commentSuggestions": []
        }"#;

        let corpus: SuggestionCorpus = serde_json::from_str(json).unwrap();
        assert_eq!(corpus.review_thread_suggestions.len(), 1);
        let op = &corpus.review_thread_suggestions[0].opinions[0];
        assert_eq!(op.kind, "architecture");
        assert_eq!(op.card_id, "c42");
    }
}
