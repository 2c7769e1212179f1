//! # KB Search
//!
//! Lexical relevance ranking over an in-memory record collection.
//!
//! ```text
//! query ──> normalize_query ──> tokens ──> classify_intent ──> intents
//!                                  │                              │
//!                                  └──────────┬───────────────────┘
//!                                             ▼
//! records ──(filter)──> explain / score_record per record
//!                          ├─ capped term hits per field (content, title, tags, path)
//!                          ├─ coverage, path coverage, leading-phrase bonus
//!                          ├─ source prior, path prior, intent rules
//!                          └─ noise penalties
//!                                             ▼
//!                   drop zero scores ─> stable sort ─> (dedup) ─> top-K
//! ```
//!
//! Everything here is pure and synchronous. The only shared state is the fixed
//! keyword and rule tables, so one record collection can serve concurrent
//! queries without coordination.

mod intent;
mod ranker;
pub mod rules;
mod scorer;
mod tokenize;

pub use intent::{classify_intent, Intent, IntentSet};
pub use ranker::{rank, rank_prepared, rank_unique, Match, RankOptions, SourceFilter};
pub use scorer::{explain, score_record, PreparedQuery, ScoreBreakdown};
pub use tokenize::{is_stopword, normalize_query, tokenize};
