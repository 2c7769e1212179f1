use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9_]+").expect("token regex must compile"));

const STOPWORD_LIST: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "for", "from", "how", "i", "in", "is",
    "it", "of", "on", "or", "our", "should", "that", "the", "this", "to", "use", "we", "what",
    "where", "which", "with",
];

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| STOPWORD_LIST.iter().copied().collect());

/// Split text into lower-cased runs of ASCII letters, digits and underscores.
///
/// Order and duplicates are preserved.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str().to_ascii_lowercase())
        .collect()
}

#[must_use]
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

/// Tokenize a query and drop stopwords and single-character tokens.
///
/// Degenerate queries never come back empty while they still have tokens:
/// if filtering removes everything, single-character filtering alone is
/// tried, then the raw tokenization is returned.
#[must_use]
pub fn normalize_query(query: &str) -> Vec<String> {
    let raw = tokenize(query);
    if raw.is_empty() {
        return raw;
    }

    let filtered: Vec<String> = raw
        .iter()
        .filter(|tok| tok.len() > 1 && !is_stopword(tok))
        .cloned()
        .collect();
    if !filtered.is_empty() {
        return filtered;
    }

    let fallback: Vec<String> = raw.iter().filter(|tok| tok.len() > 1).cloned().collect();
    if fallback.is_empty() {
        raw
    } else {
        fallback
    }
}
