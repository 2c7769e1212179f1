use crate::output::round_score;
use anyhow::{anyhow, Context, Result};
use kb_corpus::{Record, RecordSet};
use kb_search::{rank, rank_unique, Match};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct BenchmarkFile {
    #[serde(default)]
    name: Option<String>,
    cases: Vec<BenchmarkFileCase>,
}

#[derive(Debug, Deserialize)]
struct BenchmarkFileCase {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    query: String,
    #[serde(default)]
    expected_path_patterns: Vec<String>,
    #[serde(default)]
    forbidden_path_patterns: Vec<String>,
}

/// A validated retrieval benchmark
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Benchmark {
    pub name: Option<String>,
    pub cases: Vec<BenchmarkCase>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkCase {
    pub id: String,
    pub query: String,
    pub expected_path_patterns: Vec<String>,
    pub forbidden_path_patterns: Vec<String>,
}

impl BenchmarkCase {
    #[must_use]
    pub fn new(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            expected_path_patterns: Vec::new(),
            forbidden_path_patterns: Vec::new(),
        }
    }

    #[must_use]
    pub fn expected_path(mut self, pattern: impl Into<String>) -> Self {
        self.expected_path_patterns.push(pattern.into());
        self
    }

    #[must_use]
    pub fn forbidden_path(mut self, pattern: impl Into<String>) -> Self {
        self.forbidden_path_patterns.push(pattern.into());
        self
    }
}

impl Benchmark {
    /// Parse JSON first, then YAML.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let file: BenchmarkFile = match serde_json::from_slice(bytes) {
            Ok(file) => file,
            Err(json_err) => serde_yaml::from_slice(bytes).map_err(|yaml_err| {
                anyhow!("Benchmark is not valid JSON ({json_err}) or YAML ({yaml_err})")
            })?,
        };
        Self::from_file(file)
    }

    fn from_file(file: BenchmarkFile) -> Result<Self> {
        if file.cases.is_empty() {
            anyhow::bail!("Benchmark must contain at least one case");
        }
        let mut cases = Vec::with_capacity(file.cases.len());
        for (idx, raw) in file.cases.into_iter().enumerate() {
            let id = raw
                .id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("case_{}", idx + 1));
            let query = raw.query.trim().to_string();
            if query.is_empty() {
                anyhow::bail!("Benchmark case '{id}' query must not be empty");
            }
            cases.push(BenchmarkCase {
                id,
                query,
                expected_path_patterns: clean_patterns(raw.expected_path_patterns),
                forbidden_path_patterns: clean_patterns(raw.forbidden_path_patterns),
            });
        }
        Ok(Self {
            name: file.name,
            cases,
        })
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read benchmark {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("Invalid benchmark {}", path.display()))
    }
}

fn clean_patterns(patterns: Vec<String>) -> Vec<String> {
    patterns
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

#[derive(Debug, Clone)]
pub struct EvalOptions {
    pub top_k: usize,
    pub dedupe: bool,
    pub allow_leakage: bool,
    /// Benchmark location as given on the command line, used for leakage checks
    pub benchmark_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopResult {
    pub score: f64,
    pub id: String,
    #[serde(rename = "type")]
    pub source_type: String,
    pub path: Option<String>,
    pub url: Option<String>,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseResult {
    pub id: String,
    pub query: String,
    pub pass: bool,
    pub reason: String,
    pub precision: f64,
    pub recall: f64,
    pub reciprocal_rank: f64,
    pub first_rank: Option<usize>,
    pub matched_expected: usize,
    pub expected_total: usize,
    pub forbidden_hits: Vec<String>,
    pub expected_path_patterns: Vec<String>,
    pub forbidden_path_patterns: Vec<String>,
    pub top_results: Vec<TopResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvalSummary {
    pub total: usize,
    pub passed: usize,
    pub pass_rate: f64,
    pub avg_precision: f64,
    pub avg_recall: f64,
    pub mean_mrr: f64,
}

impl EvalSummary {
    #[must_use]
    pub fn from_results(results: &[CaseResult]) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.pass).count();
        let mean = |f: fn(&CaseResult) -> f64| {
            if total == 0 {
                0.0
            } else {
                results.iter().map(f).sum::<f64>() / total as f64
            }
        };
        Self {
            total,
            passed,
            pass_rate: if total == 0 {
                0.0
            } else {
                passed as f64 / total as f64
            },
            avg_precision: mean(|r| r.precision),
            avg_recall: mean(|r| r.recall),
            mean_mrr: mean(|r| r.reciprocal_rank),
        }
    }

    #[must_use]
    pub fn meets(&self, fail_below: f64) -> bool {
        self.pass_rate >= fail_below
    }

    /// One-line stdout summary
    #[must_use]
    pub fn line(&self) -> String {
        format!(
            "[SUMMARY] passed={}/{} pass_rate={:.2}% avg_precision={:.2}% avg_recall={:.2}% mean_mrr={:.3}",
            self.passed,
            self.total,
            self.pass_rate * 100.0,
            self.avg_precision * 100.0,
            self.avg_recall * 100.0,
            self.mean_mrr
        )
    }
}

/// Machine-readable evaluation artifact
#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub timestamp_unix: u64,
    pub benchmark: String,
    pub name: Option<String>,
    pub index: String,
    pub top_k: usize,
    pub dedupe: bool,
    pub allow_leakage: bool,
    pub fail_below: f64,
    #[serde(flatten)]
    pub summary: EvalSummary,
    pub results: Vec<CaseResult>,
}

/// Lower-cased `"{path}\n{url}"`, the string expected and forbidden patterns
/// are matched against.
#[must_use]
pub fn match_target(record: &Record) -> String {
    format!("{}\n{}", record.path_str(), record.url_str()).to_lowercase()
}

fn pattern_hits(target: &str, pattern: &str) -> bool {
    target.contains(&pattern.to_lowercase())
}

fn normalize_location(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    unified
        .strip_prefix("./")
        .map_or_else(|| unified.clone(), str::to_string)
}

/// True when `record` is the benchmark file itself and none of the case's
/// expected patterns names it.
#[must_use]
pub fn is_leaked(record: &Record, benchmark_path: &str, expected: &[String]) -> bool {
    let path = normalize_location(record.path_str());
    if path.is_empty() {
        return false;
    }
    let bench = normalize_location(benchmark_path);
    let same_file = bench == path || bench.ends_with(&format!("/{path}"));
    if !same_file {
        return false;
    }
    let target = match_target(record);
    !expected.iter().any(|pattern| pattern_hits(&target, pattern))
}

fn top_result(hit: &Match<'_>) -> TopResult {
    let record = hit.record;
    TopResult {
        score: round_score(hit.score),
        id: record.id.clone(),
        source_type: record.source_type.as_str().to_string(),
        path: record.path.clone(),
        url: record.url.clone(),
        title: record.title.clone(),
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[must_use]
pub fn evaluate_case(records: &RecordSet, case: &BenchmarkCase, options: &EvalOptions) -> CaseResult {
    let pool = records.iter().filter(|record| {
        options.allow_leakage
            || !is_leaked(record, &options.benchmark_path, &case.expected_path_patterns)
    });
    let ranked = if options.dedupe {
        rank_unique(pool, &case.query, options.top_k, None)
    } else {
        rank(pool, &case.query, options.top_k, None)
    };

    let targets: Vec<String> = ranked.iter().map(|hit| match_target(hit.record)).collect();
    let expected = &case.expected_path_patterns;
    let forbidden = &case.forbidden_path_patterns;

    let first_match = targets.iter().enumerate().find_map(|(idx, target)| {
        expected
            .iter()
            .find(|pattern| pattern_hits(target, pattern))
            .map(|pattern| (idx + 1, pattern))
    });
    let first_rank = first_match.map(|(rank, _)| rank);

    let matched_expected = expected
        .iter()
        .filter(|pattern| targets.iter().any(|t| pattern_hits(t, pattern)))
        .count();
    let relevant_results = targets
        .iter()
        .filter(|t| expected.iter().any(|pattern| pattern_hits(t, pattern)))
        .count();
    let forbidden_hits: Vec<String> = forbidden
        .iter()
        .filter(|pattern| targets.iter().any(|t| pattern_hits(t, pattern)))
        .cloned()
        .collect();

    let precision = if targets.is_empty() {
        0.0
    } else {
        relevant_results as f64 / targets.len() as f64
    };
    let recall = if expected.is_empty() {
        1.0
    } else {
        matched_expected as f64 / expected.len() as f64
    };
    let reciprocal_rank = first_rank.map_or(0.0, |rank| 1.0 / rank as f64);

    let expected_ok = expected.is_empty() || first_rank.is_some();
    let pass = expected_ok && forbidden_hits.is_empty();
    let reason = if let Some(pattern) = forbidden_hits.first() {
        format!("forbidden pattern `{pattern}` found in top-k")
    } else if let Some((rank, pattern)) = first_match {
        format!("matched pattern `{pattern}` at rank {rank}")
    } else if expected.is_empty() {
        "no expected patterns".to_string()
    } else {
        "no expected path pattern found in top-k".to_string()
    };

    log::debug!(
        "case {}: pass={} first_rank={:?} results={}",
        case.id,
        pass,
        first_rank,
        targets.len()
    );

    CaseResult {
        id: case.id.clone(),
        query: case.query.clone(),
        pass,
        reason,
        precision: round4(precision),
        recall: round4(recall),
        reciprocal_rank: round4(reciprocal_rank),
        first_rank,
        matched_expected,
        expected_total: expected.len(),
        forbidden_hits,
        expected_path_patterns: expected.clone(),
        forbidden_path_patterns: forbidden.clone(),
        top_results: ranked.iter().map(top_result).collect(),
    }
}

#[must_use]
pub fn run_benchmark(
    records: &RecordSet,
    benchmark: &Benchmark,
    options: &EvalOptions,
) -> Vec<CaseResult> {
    benchmark
        .cases
        .iter()
        .map(|case| evaluate_case(records, case, options))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_corpus::SourceType;
    use pretty_assertions::assert_eq;

    fn records() -> RecordSet {
        RecordSet::new(vec![
            Record::new("ll-1", SourceType::RepoFile)
                .title("low_level.cpp")
                .path("data/repos/unitree_ros2/example/low_level.cpp")
                .content("ros2 low level motor command, chunk one"),
            Record::new("ll-2", SourceType::RepoFile)
                .title("low_level.cpp")
                .path("data/repos/unitree_ros2/example/low_level.cpp")
                .content("ros2 low level motor state, chunk two"),
            Record::new("readme", SourceType::RepoFile)
                .title("README")
                .path("README.md")
                .content("motor overview"),
            Record::new("bench", SourceType::BenchmarkSpec)
                .title("retrieval benchmark")
                .path("benchmarks/retrieval_benchmark.yaml")
                .content("query: ros2 low level motor; expected: unitree_ros2"),
            Record::new("faq", SourceType::SupportDoc)
                .title("Support FAQ")
                .url("https://support.example.com/motor-faq")
                .content("motor temperature warnings"),
        ])
    }

    fn options() -> EvalOptions {
        EvalOptions {
            top_k: 8,
            dedupe: true,
            allow_leakage: false,
            benchmark_path: "benchmarks/retrieval_benchmark.yaml".to_string(),
        }
    }

    #[test]
    fn parses_yaml_benchmark_and_fills_missing_ids() {
        let bench = Benchmark::from_bytes(
            br#"
version: 1
name: smoke
cases:
  - query: "  ros2 low level  "
    expected_path_patterns: [unitree_ros2, " "]
  - id: faq
    query: motor faq
    forbidden_path_patterns: [README]
"#,
        )
        .unwrap();
        assert_eq!(bench.name.as_deref(), Some("smoke"));
        assert_eq!(bench.cases[0].id, "case_1");
        assert_eq!(bench.cases[0].query, "ros2 low level");
        assert_eq!(bench.cases[0].expected_path_patterns, vec!["unitree_ros2"]);
        assert_eq!(bench.cases[1].id, "faq");
        assert_eq!(bench.cases[1].forbidden_path_patterns, vec!["README"]);
    }

    #[test]
    fn parses_json_benchmark() {
        let bench =
            Benchmark::from_bytes(br#"{"cases": [{"id": "a", "query": "motor"}]}"#).unwrap();
        assert_eq!(bench.cases, vec![BenchmarkCase::new("a", "motor")]);
    }

    #[test]
    fn rejects_empty_or_malformed_benchmarks() {
        let err = Benchmark::from_bytes(br#"{"cases": []}"#).unwrap_err();
        assert!(err.to_string().contains("at least one case"));

        let err = Benchmark::from_bytes(b"cases:\n  - id: blank\n    query: '   '\n").unwrap_err();
        assert!(err.to_string().contains("'blank' query must not be empty"));

        assert!(Benchmark::from_bytes(b"cases: 3\n").is_err());
        assert!(Benchmark::from_bytes(b"name: no cases\n").is_err());
    }

    #[test]
    fn leakage_detection_uses_path_suffix_and_expected_patterns() {
        let bench = Record::new("b", SourceType::BenchmarkSpec)
            .path("benchmarks/retrieval_benchmark.yaml");
        let none: Vec<String> = Vec::new();
        assert!(is_leaked(&bench, "benchmarks/retrieval_benchmark.yaml", &none));
        assert!(is_leaked(&bench, "./benchmarks/retrieval_benchmark.yaml", &none));
        assert!(is_leaked(&bench, "/repo/benchmarks/retrieval_benchmark.yaml", &none));
        assert!(!is_leaked(&bench, "other/benchmark.yaml", &none));
        assert!(!is_leaked(
            &bench,
            "benchmarks/retrieval_benchmark.yaml",
            &["retrieval_benchmark".to_string()]
        ));

        let pathless = Record::new("p", SourceType::SupportDoc);
        assert!(!is_leaked(&pathless, "benchmarks/retrieval_benchmark.yaml", &none));
    }

    #[test]
    fn passing_case_reports_rank_precision_and_recall() {
        let case = BenchmarkCase::new("ros2", "ros2 low level motor")
            .expected_path("unitree_ros2")
            .expected_path("missing/file");
        let result = evaluate_case(&records(), &case, &options());

        assert!(result.pass);
        assert_eq!(result.first_rank, Some(1));
        assert_eq!(result.reciprocal_rank, 1.0);
        assert_eq!(result.matched_expected, 1);
        assert_eq!(result.recall, 0.5);
        assert_eq!(result.reason, "matched pattern `unitree_ros2` at rank 1");
        assert!(result.precision > 0.0 && result.precision < 1.0);
        assert!(result.top_results.iter().all(|r| r.id != "bench"));
        let chunk_count = result
            .top_results
            .iter()
            .filter(|r| r.title == "low_level.cpp")
            .count();
        assert_eq!(chunk_count, 1);
    }

    #[test]
    fn leakage_and_dedupe_can_be_disabled() {
        let case =
            BenchmarkCase::new("ros2", "ros2 low level motor").expected_path("unitree_ros2");
        let opts = EvalOptions {
            dedupe: false,
            allow_leakage: true,
            ..options()
        };
        let result = evaluate_case(&records(), &case, &opts);
        assert!(result.top_results.iter().any(|r| r.id == "bench"));
        let chunk_count = result
            .top_results
            .iter()
            .filter(|r| r.title == "low_level.cpp")
            .count();
        assert_eq!(chunk_count, 2);
    }

    #[test]
    fn forbidden_pattern_fails_the_case() {
        let case = BenchmarkCase::new("motor", "motor")
            .expected_path("unitree_ros2")
            .forbidden_path("readme");
        let result = evaluate_case(&records(), &case, &options());
        assert!(result.first_rank.is_some());
        assert!(!result.pass);
        assert_eq!(result.forbidden_hits, vec!["readme"]);
        assert_eq!(result.reason, "forbidden pattern `readme` found in top-k");
    }

    #[test]
    fn url_targets_match_patterns() {
        let case =
            BenchmarkCase::new("faq", "motor temperature").expected_path("support.example.com");
        let result = evaluate_case(&records(), &case, &options());
        assert!(result.pass);
        assert_eq!(result.first_rank, Some(1));
    }

    #[test]
    fn miss_and_empty_expectations() {
        let miss = BenchmarkCase::new("miss", "motor").expected_path("nowhere/to/be/found");
        let result = evaluate_case(&records(), &miss, &options());
        assert!(!result.pass);
        assert_eq!(result.precision, 0.0);
        assert_eq!(result.recall, 0.0);
        assert_eq!(result.reciprocal_rank, 0.0);
        assert_eq!(result.reason, "no expected path pattern found in top-k");

        let open = BenchmarkCase::new("open", "motor");
        let result = evaluate_case(&records(), &open, &options());
        assert!(result.pass);
        assert_eq!(result.recall, 1.0);
        assert_eq!(result.reason, "no expected patterns");

        let nothing = BenchmarkCase::new("nothing", "zebra").expected_path("x");
        let result = evaluate_case(&records(), &nothing, &options());
        assert!(result.top_results.is_empty());
        assert_eq!(result.precision, 0.0);
    }

    #[test]
    fn summary_averages_and_threshold() {
        let bench = Benchmark {
            name: None,
            cases: vec![
                BenchmarkCase::new("hit", "ros2 low level motor").expected_path("unitree_ros2"),
                BenchmarkCase::new("miss", "motor").expected_path("nowhere"),
            ],
        };
        let results = run_benchmark(&records(), &bench, &options());
        let summary = EvalSummary::from_results(&results);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.pass_rate, 0.5);
        assert_eq!(summary.avg_recall, 0.5);
        assert_eq!(summary.mean_mrr, 0.5);
        assert!(summary.meets(0.5));
        assert!(!summary.meets(0.8));
        assert!(summary.line().starts_with("[SUMMARY] passed=1/2 pass_rate=50.00%"));

        let empty = EvalSummary::from_results(&[]);
        assert_eq!(empty.pass_rate, 0.0);
        assert_eq!(empty.mean_mrr, 0.0);
    }
}
