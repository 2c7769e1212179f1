use clap::ValueEnum;
use kb_corpus::{Record, RecordSet, SourceType};
use kb_search::{explain, Match, PreparedQuery, ScoreBreakdown};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

pub const SNIPPET_CHARS: usize = 320;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Markdown,
}

/// Excerpt of `content` around the earliest query-token hit.
///
/// Newlines are flattened and the result is trimmed. Content that fits is
/// returned whole; otherwise a `max_chars` window opens a third of the budget
/// before the first hit, or at the start when no token occurs.
#[must_use]
pub fn build_snippet<S: AsRef<str>>(content: &str, tokens: &[S], max_chars: usize) -> String {
    let plain = content.replace('\n', " ");
    let plain = plain.trim();
    if plain.chars().count() <= max_chars {
        return plain.to_string();
    }

    // Query tokens are ASCII, so ASCII folding keeps byte offsets aligned.
    let lower = plain.to_ascii_lowercase();
    let first_hit = tokens
        .iter()
        .map(AsRef::as_ref)
        .filter(|tok| !tok.is_empty())
        .filter_map(|tok| lower.find(tok))
        .min();

    let start = first_hit.map_or(0, |byte| {
        plain[..byte].chars().count().saturating_sub(max_chars / 3)
    });
    plain
        .chars()
        .skip(start)
        .take(max_chars)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Four-decimal score as emitted in JSON payloads
#[must_use]
pub fn round_score(score: f32) -> f64 {
    (f64::from(score) * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Serialize)]
pub struct QueryReport<'a> {
    pub question: &'a str,
    pub top_k: usize,
    pub matches: Vec<MatchView<'a>>,
}

#[derive(Debug, Serialize)]
pub struct MatchView<'a> {
    pub score: f64,
    pub id: &'a str,
    #[serde(rename = "type")]
    pub source_type: &'static str,
    pub title: &'a str,
    pub path: Option<&'a str>,
    pub url: Option<&'a str>,
    pub tags: &'a [String],
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreBreakdown>,
}

impl<'a> MatchView<'a> {
    fn new(
        hit: &Match<'a>,
        query: &PreparedQuery,
        with_explain: bool,
    ) -> Self {
        let record: &'a Record = hit.record;
        Self {
            score: round_score(hit.score),
            id: &record.id,
            source_type: record.source_type.as_str(),
            title: &record.title,
            path: record.path.as_deref(),
            url: record.url.as_deref(),
            tags: &record.tags,
            snippet: build_snippet(&record.content, query.tokens(), SNIPPET_CHARS),
            explain: with_explain.then(|| explain(query, record)),
        }
    }
}

impl<'a> QueryReport<'a> {
    #[must_use]
    pub fn new(
        question: &'a str,
        top_k: usize,
        query: &PreparedQuery,
        matches: &[Match<'a>],
        with_explain: bool,
    ) -> Self {
        Self {
            question,
            top_k,
            matches: matches
                .iter()
                .map(|hit| MatchView::new(hit, query, with_explain))
                .collect(),
        }
    }

    pub fn render(&self, format: OutputFormat) -> serde_json::Result<String> {
        match format {
            OutputFormat::Json => serde_json::to_string_pretty(self),
            OutputFormat::Markdown => Ok(self.render_markdown()),
            OutputFormat::Text => Ok(self.render_text()),
        }
    }

    fn render_text(&self) -> String {
        if self.matches.is_empty() {
            return "No relevant matches found.\n".to_string();
        }

        let mut out = String::new();
        let _ = writeln!(out, "Question: {}", self.question);
        let _ = writeln!(out, "Top {} matches:\n", self.matches.len());
        for (idx, m) in self.matches.iter().enumerate() {
            let _ = writeln!(
                out,
                "{}. score={:.2} id={} type={}",
                idx + 1,
                m.score,
                m.id,
                m.source_type
            );
            let _ = writeln!(out, "   title: {}", m.title);
            if let Some(path) = m.path.filter(|p| !p.is_empty()) {
                let _ = writeln!(out, "   path: {path}");
            }
            if let Some(url) = m.url.filter(|u| !u.is_empty()) {
                let _ = writeln!(out, "   url: {url}");
            }
            let _ = writeln!(out, "   preview: {}", m.snippet);
            if let Some(breakdown) = &m.explain {
                let _ = writeln!(out, "   explain: {}", describe(breakdown));
            }
        }
        out
    }

    fn render_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Query\n\n{}\n", self.question);
        for (idx, m) in self.matches.iter().enumerate() {
            let _ = writeln!(out, "## {}. {} (`{}`)\n", idx + 1, m.title, m.source_type);
            let _ = writeln!(out, "- score: `{:.2}`", m.score);
            if let Some(path) = m.path.filter(|p| !p.is_empty()) {
                let _ = writeln!(out, "- path: `{path}`");
            }
            if let Some(url) = m.url.filter(|u| !u.is_empty()) {
                let _ = writeln!(out, "- url: {url}");
            }
            if let Some(breakdown) = &m.explain {
                let _ = writeln!(out, "- explain: `{}`", describe(breakdown));
            }
            let _ = writeln!(out, "- snippet: {}\n", m.snippet);
        }
        out
    }
}

/// Record counts per source type
#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub index: String,
    pub total: usize,
    pub by_source_type: BTreeMap<SourceType, usize>,
}

impl StatsReport {
    #[must_use]
    pub fn new(index: String, records: &RecordSet) -> Self {
        Self {
            index,
            total: records.len(),
            by_source_type: records.by_source_type(),
        }
    }

    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Index: {}", self.index);
        let _ = writeln!(out, "Records: {}", self.total);
        for (ty, count) in &self.by_source_type {
            let _ = writeln!(out, "  {ty}: {count}");
        }
        out
    }
}

fn describe(b: &ScoreBreakdown) -> String {
    format!(
        "raw={:.2} source={:.2} path={:.2} intent={:.2} noise={:.2} coverage={:.2} path_coverage={:.2}",
        b.raw,
        b.source_boost,
        b.path_boost,
        b.intent_boost,
        b.noise_penalty,
        b.coverage,
        b.path_coverage
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_search::rank;
    use pretty_assertions::assert_eq;

    #[test]
    fn short_content_is_returned_whole() {
        assert_eq!(build_snippet("  one\ntwo  ", &["two"], 320), "one two");
    }

    #[test]
    fn window_opens_a_third_before_first_hit() {
        let content = format!("{}needle{}", "a".repeat(200), "b".repeat(200));
        let snippet = build_snippet(&content, &["needle"], 30);
        assert_eq!(snippet.chars().count(), 30);
        assert!(snippet.starts_with(&"a".repeat(10)));
        assert!(snippet.contains("needle"));
    }

    #[test]
    fn earliest_hit_across_tokens_wins() {
        let content = format!("{}alpha{}beta{}", "x".repeat(50), "y".repeat(50), "z".repeat(50));
        let snippet = build_snippet(&content, &["beta", "alpha"], 20);
        assert!(snippet.contains("alpha"));
    }

    #[test]
    fn no_hit_returns_leading_window() {
        let content = "c".repeat(400);
        assert_eq!(build_snippet(&content, &["zzz"], 320), "c".repeat(320));
    }

    #[test]
    fn window_counts_characters_not_bytes() {
        let content = format!("{}target{}", "é".repeat(100), "ü".repeat(100));
        let snippet = build_snippet(&content, &["target"], 12);
        assert_eq!(snippet.chars().count(), 12);
        assert!(snippet.starts_with("éééé"));
        assert!(snippet.contains("target"));
    }

    #[test]
    fn scores_round_to_four_places() {
        assert_eq!(round_score(1.234_56), 1.2346);
        assert_eq!(round_score(0.0), 0.0);
    }

    fn records() -> Vec<Record> {
        vec![
            Record::new("dds", SourceType::SupportDoc)
                .title("DDS setup")
                .path("docs/support/dds.md")
                .url("https://support.example.com/dds")
                .tag("network")
                .content("Set the DDS domain id before launching."),
            Record::new("noise", SourceType::CuratedDoc)
                .title("Unrelated")
                .content("Nothing to see."),
        ]
    }

    #[test]
    fn json_payload_carries_match_fields() {
        let records = records();
        let query = PreparedQuery::new("dds domain");
        let matches = rank(&records, "dds domain", 5, None);
        let report = QueryReport::new("dds domain", 5, &query, &matches, false);
        let json: serde_json::Value =
            serde_json::from_str(&report.render(OutputFormat::Json).unwrap()).unwrap();

        assert_eq!(json["question"], "dds domain");
        assert_eq!(json["top_k"], 5);
        let first = &json["matches"][0];
        assert_eq!(first["id"], "dds");
        assert_eq!(first["type"], "support_doc");
        assert_eq!(first["path"], "docs/support/dds.md");
        assert_eq!(first["tags"][0], "network");
        assert!(first.get("explain").is_none());
        assert_eq!(json["matches"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn explain_adds_breakdown() {
        let records = records();
        let query = PreparedQuery::new("dds domain");
        let matches = rank(&records, "dds domain", 5, None);
        let report = QueryReport::new("dds domain", 5, &query, &matches, true);
        let json: serde_json::Value =
            serde_json::from_str(&report.render(OutputFormat::Json).unwrap()).unwrap();
        let breakdown = &json["matches"][0]["explain"];
        assert!(breakdown["raw"].as_f64().unwrap() > 0.0);
        assert!((breakdown["source_boost"].as_f64().unwrap() - 1.4).abs() < 1e-6);

        let text = report.render(OutputFormat::Text).unwrap();
        assert!(text.contains("   explain: raw="));
    }

    #[test]
    fn text_rendering() {
        let records = records();
        let query = PreparedQuery::new("dds domain");
        let matches = rank(&records, "dds domain", 5, None);
        let text = QueryReport::new("dds domain", 5, &query, &matches, false)
            .render(OutputFormat::Text)
            .unwrap();
        assert!(text.starts_with("Question: dds domain\nTop 1 matches:\n\n1. score="));
        assert!(text.contains(" id=dds type=support_doc\n"));
        assert!(text.contains("   path: docs/support/dds.md\n"));
        assert!(text.contains("   url: https://support.example.com/dds\n"));
        assert!(text.contains("   preview: Set the DDS domain id before launching.\n"));

        let empty = QueryReport::new("wifi", 5, &PreparedQuery::new("wifi"), &[], false);
        assert_eq!(
            empty.render(OutputFormat::Text).unwrap(),
            "No relevant matches found.\n"
        );
    }

    #[test]
    fn markdown_rendering() {
        let records = records();
        let query = PreparedQuery::new("dds domain");
        let matches = rank(&records, "dds domain", 5, None);
        let md = QueryReport::new("dds domain", 5, &query, &matches, false)
            .render(OutputFormat::Markdown)
            .unwrap();
        assert!(md.starts_with("# Query\n\ndds domain\n\n"));
        assert!(md.contains("## 1. DDS setup (`support_doc`)\n"));
        assert!(md.contains("- path: `docs/support/dds.md`\n"));
        assert!(md.contains("- snippet: Set the DDS domain id before launching.\n"));
    }

    #[test]
    fn stats_count_records_per_type() {
        let set = RecordSet::new(records());
        let stats = StatsReport::new("idx.jsonl".to_string(), &set);
        let text = stats.render_text();
        assert!(text.contains("Records: 2\n"));
        assert!(text.contains("  support_doc: 1\n"));
        assert!(text.contains("  curated_doc: 1\n"));

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["total"], 2);
        assert_eq!(json["by_source_type"]["support_doc"], 1);
    }
}
