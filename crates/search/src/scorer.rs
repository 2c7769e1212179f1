use crate::intent::{classify_intent, IntentSet};
use crate::rules;
use crate::tokenize::{normalize_query, tokenize};
use kb_corpus::Record;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

const CONTENT_CAP: usize = 5;
const TITLE_CAP: usize = 3;
const TAG_CAP: usize = 2;
const PATH_CAP: usize = 3;

const CONTENT_WEIGHT: f32 = 1.0;
const TITLE_WEIGHT: f32 = 3.1;
const TAG_WEIGHT: f32 = 2.4;
const PATH_WEIGHT: f32 = 2.8;
const COVERAGE_WEIGHT: f32 = 7.0;
const PATH_COVERAGE_WEIGHT: f32 = 4.0;

const PHRASE_TOKENS: usize = 3;
const CONTENT_PHRASE_BONUS: f32 = 1.5;
const PATH_PHRASE_BONUS: f32 = 2.0;

const UNVERIFIED_TAGS: &[&str] = &["support_unverified", "unverified"];
const UNVERIFIED_FACTOR: f32 = 0.35;
const NOISE_FACTOR: f32 = 0.25;
const BROAD_QUERY_MIN_TOKENS: usize = 4;
const BROAD_QUERY_MIN_COVERAGE: f32 = 0.20;
const BROAD_QUERY_FACTOR: f32 = 0.55;

/// A query normalized once and reused for every record of a scan
#[derive(Debug, Clone, Default)]
pub struct PreparedQuery {
    tokens: Vec<String>,
    distinct: Vec<String>,
    token_set: HashSet<String>,
    intents: IntentSet,
    phrase: String,
}

impl PreparedQuery {
    #[must_use]
    pub fn new(query: &str) -> Self {
        Self::from_tokens(normalize_query(query))
    }

    #[must_use]
    pub fn from_tokens(tokens: Vec<String>) -> Self {
        let intents = classify_intent(&tokens);
        Self::with_intents(tokens, intents)
    }

    #[must_use]
    pub fn with_intents(tokens: Vec<String>, intents: IntentSet) -> Self {
        let mut token_set = HashSet::with_capacity(tokens.len());
        let mut distinct = Vec::with_capacity(tokens.len());
        for token in &tokens {
            if token_set.insert(token.clone()) {
                distinct.push(token.clone());
            }
        }
        let phrase = tokens
            .iter()
            .take(PHRASE_TOKENS)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            tokens,
            distinct,
            token_set,
            intents,
            phrase,
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    #[must_use]
    pub const fn intents(&self) -> &IntentSet {
        &self.intents
    }

    /// Number of distinct tokens
    #[must_use]
    pub fn distinct_len(&self) -> usize {
        self.distinct.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.distinct.is_empty()
    }
}

/// Every factor that goes into a record's final score
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub content_hits: usize,
    pub title_hits: usize,
    pub tag_hits: usize,
    pub path_hits: usize,
    pub coverage: f32,
    pub path_coverage: f32,
    pub phrase_bonus: f32,
    pub raw: f32,
    pub source_boost: f32,
    pub path_boost: f32,
    pub intent_boost: f32,
    pub noise_penalty: f32,
}

impl Default for ScoreBreakdown {
    fn default() -> Self {
        Self {
            content_hits: 0,
            title_hits: 0,
            tag_hits: 0,
            path_hits: 0,
            coverage: 0.0,
            path_coverage: 0.0,
            phrase_bonus: 0.0,
            raw: 0.0,
            source_boost: 1.0,
            path_boost: 1.0,
            intent_boost: 1.0,
            noise_penalty: 1.0,
        }
    }
}

impl ScoreBreakdown {
    #[must_use]
    pub fn total(&self) -> f32 {
        let score =
            self.raw * self.source_boost * self.path_boost * self.intent_boost * self.noise_penalty;
        if score.is_finite() {
            score.max(0.0)
        } else {
            0.0
        }
    }
}

struct FieldCounts<'a> {
    counts: HashMap<&'a str, usize>,
}

impl<'a> FieldCounts<'a> {
    fn new(tokens: &'a [String]) -> Self {
        let mut counts = HashMap::with_capacity(tokens.len());
        for token in tokens {
            *counts.entry(token.as_str()).or_insert(0) += 1;
        }
        Self { counts }
    }

    fn contains(&self, token: &str) -> bool {
        self.counts.contains_key(token)
    }

    fn capped_hits(&self, query: &[String], cap: usize) -> usize {
        query
            .iter()
            .map(|tok| self.counts.get(tok.as_str()).copied().unwrap_or(0).min(cap))
            .sum()
    }
}

/// Score one record against normalized query tokens and their intents.
#[must_use]
pub fn score_record(tokens: &[String], intents: &IntentSet, record: &Record) -> f32 {
    let query = PreparedQuery::with_intents(tokens.to_vec(), intents.clone());
    explain(&query, record).total()
}

/// Full factor breakdown of [`score_record`]. Records that share no token with
/// the query come back as the default breakdown, whose total is zero.
#[must_use]
pub fn explain(query: &PreparedQuery, record: &Record) -> ScoreBreakdown {
    let zero = ScoreBreakdown::default();
    if query.is_empty() {
        return zero;
    }

    let path_raw = record.path_str();
    if record.content.is_empty() && record.title.is_empty() && path_raw.is_empty() {
        return zero;
    }

    let content_tokens = tokenize(&record.content);
    let title_tokens = tokenize(&record.title);
    let tag_tokens = tokenize(&record.tags.join(" "));
    let path_tokens = tokenize(path_raw);
    if content_tokens.is_empty() && title_tokens.is_empty() && path_tokens.is_empty() {
        return zero;
    }

    let content = FieldCounts::new(&content_tokens);
    let title = FieldCounts::new(&title_tokens);
    let tags = FieldCounts::new(&tag_tokens);
    let path = FieldCounts::new(&path_tokens);

    let overlap = query
        .distinct
        .iter()
        .filter(|tok| {
            content.contains(tok) || title.contains(tok) || tags.contains(tok) || path.contains(tok)
        })
        .count();
    if overlap == 0 {
        return zero;
    }

    let query_len = query.distinct.len() as f32;
    let coverage = overlap as f32 / query_len;
    let path_overlap = query.distinct.iter().filter(|tok| path.contains(tok)).count();
    let path_coverage = path_overlap as f32 / query_len;

    let content_hits = content.capped_hits(&query.distinct, CONTENT_CAP);
    let title_hits = title.capped_hits(&query.distinct, TITLE_CAP);
    let tag_hits = tags.capped_hits(&query.distinct, TAG_CAP);
    let path_hits = path.capped_hits(&query.distinct, PATH_CAP);

    let content_lower = record.content.to_lowercase();
    let title_lower = record.title.to_lowercase();
    let path_lower = path_raw.to_lowercase();

    let mut phrase_bonus = 0.0;
    if !query.phrase.is_empty() {
        if content_lower.contains(&query.phrase) {
            phrase_bonus += CONTENT_PHRASE_BONUS;
        }
        if path_lower.contains(&query.phrase) {
            phrase_bonus += PATH_PHRASE_BONUS;
        }
    }

    let raw = content_hits as f32 * CONTENT_WEIGHT
        + title_hits as f32 * TITLE_WEIGHT
        + tag_hits as f32 * TAG_WEIGHT
        + path_hits as f32 * PATH_WEIGHT
        + coverage * COVERAGE_WEIGHT
        + path_coverage * PATH_COVERAGE_WEIGHT
        + phrase_bonus;

    let mut source_boost = rules::source_prior(record.source_type);
    if UNVERIFIED_TAGS.iter().any(|tag| record.has_tag(tag)) {
        source_boost *= UNVERIFIED_FACTOR;
    }

    let path_boost = rules::path_prior(&path_lower, record.source_type);
    let intent_boost = rules::intent_boost(
        &query.intents,
        &query.token_set,
        &path_lower,
        record.source_type,
    );

    let mut noise_penalty = 1.0;
    if rules::is_noise(&path_lower, &title_lower) {
        noise_penalty *= NOISE_FACTOR;
    }
    if query.distinct.len() >= BROAD_QUERY_MIN_TOKENS && coverage < BROAD_QUERY_MIN_COVERAGE {
        noise_penalty *= BROAD_QUERY_FACTOR;
    }

    ScoreBreakdown {
        content_hits,
        title_hits,
        tag_hits,
        path_hits,
        coverage,
        path_coverage,
        phrase_bonus,
        raw,
        source_boost,
        path_boost,
        intent_boost,
        noise_penalty,
    }
}
