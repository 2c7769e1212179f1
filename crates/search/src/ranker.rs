use crate::scorer::{explain, PreparedQuery};
use kb_corpus::{Record, SourceType};
use std::collections::HashSet;

/// A scored record. Lives only for the duration of one query.
#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
    pub score: f32,
    pub record: &'a Record,
}

/// Allow-set of source types. An empty filter admits everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFilter {
    allowed: HashSet<SourceType>,
}

impl SourceFilter {
    #[must_use]
    pub fn new(types: impl IntoIterator<Item = SourceType>) -> Self {
        Self {
            allowed: types.into_iter().collect(),
        }
    }

    /// Blank labels are ignored; unrecognized labels select `unknown`.
    #[must_use]
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        Self::new(
            labels
                .iter()
                .map(AsRef::as_ref)
                .filter(|label| !label.trim().is_empty())
                .map(SourceType::from_label),
        )
    }

    #[must_use]
    pub fn admits(&self, source_type: SourceType) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&source_type)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

/// Options for a single ranking pass
#[derive(Debug, Clone, Copy, Default)]
pub struct RankOptions<'f> {
    pub top_k: usize,
    pub filter: Option<&'f SourceFilter>,
    /// Keep only the best match per identity key (path, else url, else id)
    pub unique: bool,
}

/// Top-K records for `query`, best first. Ties keep input order.
#[must_use]
pub fn rank<'a, I>(
    records: I,
    query: &str,
    top_k: usize,
    filter: Option<&SourceFilter>,
) -> Vec<Match<'a>>
where
    I: IntoIterator<Item = &'a Record>,
{
    let prepared = PreparedQuery::new(query);
    rank_prepared(
        records,
        &prepared,
        RankOptions {
            top_k,
            filter,
            unique: false,
        },
    )
}

/// Like [`rank`], but at most one match per source so that several chunks of
/// one file cannot crowd distinct sources out of the top-K.
#[must_use]
pub fn rank_unique<'a, I>(
    records: I,
    query: &str,
    top_k: usize,
    filter: Option<&SourceFilter>,
) -> Vec<Match<'a>>
where
    I: IntoIterator<Item = &'a Record>,
{
    let prepared = PreparedQuery::new(query);
    rank_prepared(
        records,
        &prepared,
        RankOptions {
            top_k,
            filter,
            unique: true,
        },
    )
}

#[must_use]
pub fn rank_prepared<'a, I>(
    records: I,
    query: &PreparedQuery,
    options: RankOptions<'_>,
) -> Vec<Match<'a>>
where
    I: IntoIterator<Item = &'a Record>,
{
    if options.top_k == 0 {
        return Vec::new();
    }

    let mut scanned = 0usize;
    let mut ranked: Vec<Match<'a>> = records
        .into_iter()
        .filter(|record| options.filter.map_or(true, |f| f.admits(record.source_type)))
        .filter_map(|record| {
            scanned += 1;
            let score = explain(query, record).total();
            (score > 0.0).then_some(Match { score, record })
        })
        .collect();

    // Stable: equal scores keep input order.
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    if options.unique {
        let mut seen = HashSet::new();
        ranked.retain(|m| seen.insert(m.record.identity_key()));
    }

    log::debug!(
        "rank: tokens={:?} intents={:?} scanned={} positive={} top_k={}",
        query.tokens(),
        query.intents(),
        scanned,
        ranked.len(),
        options.top_k
    );

    ranked.truncate(options.top_k);
    ranked
}
