use crate::output::round_score;
use kb_corpus::Record;
use kb_search::{rank_unique, SourceFilter};
use serde::Serialize;

pub const DEFAULT_RETRIEVAL_TOP_K: usize = 20;
pub const DEFAULT_CANDIDATES: usize = 10;
pub const CANDIDATE_SNIPPET_CHARS: usize = 220;

/// One distinct source offered to an agent for selection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub path: String,
    pub title: String,
    #[serde(rename = "type")]
    pub source_type: String,
    pub score: f64,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Serialize)]
pub struct CandidateReport<'a> {
    pub question: &'a str,
    pub top_k: usize,
    pub candidates: Vec<Candidate>,
}

/// Whitespace-collapsed prefix of `text`, at most `max_chars` characters.
#[must_use]
pub fn shrink(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_chars).collect()
}

/// Deduplicated ranking over `top_k`, keeping the first `limit` records that
/// carry a path.
#[must_use]
pub fn collect_candidates<'a, I>(
    records: I,
    question: &str,
    top_k: usize,
    limit: usize,
    filter: Option<&SourceFilter>,
) -> Vec<Candidate>
where
    I: IntoIterator<Item = &'a Record>,
{
    rank_unique(records, question, top_k, filter)
        .into_iter()
        .filter(|hit| !hit.record.path_str().is_empty())
        .take(limit)
        .map(|hit| Candidate {
            path: hit.record.path_str().to_string(),
            title: hit.record.title.clone(),
            source_type: hit.record.source_type.as_str().to_string(),
            score: round_score(hit.score),
            url: hit.record.url_str().to_string(),
            snippet: shrink(&hit.record.content, CANDIDATE_SNIPPET_CHARS),
        })
        .collect()
}
