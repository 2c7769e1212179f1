use crate::eval::EvalReport;

const WORST_CASES: usize = 10;

#[must_use]
pub fn render_eval_report(report: &EvalReport) -> String {
    let summary = &report.summary;

    let mut md = String::new();
    md.push_str("# Retrieval Evaluation\n\n");
    md.push_str(&format!("- Benchmark: `{}`\n", report.benchmark));
    if let Some(name) = &report.name {
        md.push_str(&format!("- Name: `{name}`\n"));
    }
    md.push_str(&format!("- Index: `{}`\n", report.index));
    md.push_str(&format!("- Total cases: {}\n", summary.total));
    md.push_str(&format!("- Passed: {}\n", summary.passed));
    md.push_str(&format!("- Pass rate: {:.2}%\n", summary.pass_rate * 100.0));
    md.push_str(&format!(
        "- Avg precision: {:.2}%\n",
        summary.avg_precision * 100.0
    ));
    md.push_str(&format!("- Avg recall: {:.2}%\n", summary.avg_recall * 100.0));
    md.push_str(&format!("- Mean MRR: {:.3}\n", summary.mean_mrr));
    md.push_str(&format!("- Top-K: {}\n", report.top_k));
    md.push_str(&format!("- Dedupe: {}\n", report.dedupe));
    md.push_str(&format!("- Threshold: {:.0}%\n\n", report.fail_below * 100.0));

    md.push_str("| Case | Pass | Precision | Recall | Reason |\n");
    md.push_str("| --- | --- | --- | --- | --- |\n");
    for case in &report.results {
        md.push_str(&format!(
            "| {} | {} | {:.2} | {:.2} | {} |\n",
            escape_cell(&case.id),
            case.pass,
            case.precision,
            case.recall,
            escape_cell(&case.reason),
        ));
    }
    md.push('\n');

    let mut worst: Vec<_> = report.results.iter().collect();
    worst.sort_by(|a, b| {
        a.pass
            .cmp(&b.pass)
            .then_with(|| a.reciprocal_rank.total_cmp(&b.reciprocal_rank))
            .then_with(|| a.recall.total_cmp(&b.recall))
            .then_with(|| a.id.cmp(&b.id))
    });
    md.push_str("## Worst cases\n\n");
    md.push_str("| Case | RR | Recall | First rank | Query |\n");
    md.push_str("|---|---:|---:|---:|---|\n");
    for case in worst.into_iter().take(WORST_CASES) {
        md.push_str(&format!(
            "| {} | {:.3} | {:.3} | {} | {} |\n",
            escape_cell(&case.id),
            case.reciprocal_rank,
            case.recall,
            case.first_rank.map_or("n/a".to_string(), |v| v.to_string()),
            escape_cell(&truncate_one_line(&case.query, 120)),
        ));
    }

    md
}

fn truncate_one_line(text: &str, max_chars: usize) -> String {
    let s = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if s.chars().count() <= max_chars {
        return s;
    }
    let truncated: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{truncated}…")
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{CaseResult, EvalSummary};

    fn case(id: &str, pass: bool, rr: f64) -> CaseResult {
        CaseResult {
            id: id.to_string(),
            query: "ros2 | low level".to_string(),
            pass,
            reason: if pass {
                "matched pattern `unitree_ros2` at rank 1".to_string()
            } else {
                "no expected path pattern found in top-k".to_string()
            },
            precision: 0.5,
            recall: if pass { 1.0 } else { 0.0 },
            reciprocal_rank: rr,
            first_rank: pass.then_some(1),
            matched_expected: usize::from(pass),
            expected_total: 1,
            forbidden_hits: Vec::new(),
            expected_path_patterns: vec!["unitree_ros2".to_string()],
            forbidden_path_patterns: Vec::new(),
            top_results: Vec::new(),
        }
    }

    #[test]
    fn eval_report_renders_summary_table_and_worst_cases() {
        let results = vec![case("good", true, 1.0), case("bad", false, 0.0)];
        let report = EvalReport {
            timestamp_unix: 0,
            benchmark: "benchmarks/retrieval_benchmark.yaml".to_string(),
            name: Some("smoke".to_string()),
            index: "data/index/knowledge_index.jsonl".to_string(),
            top_k: 8,
            dedupe: true,
            allow_leakage: false,
            fail_below: 0.8,
            summary: EvalSummary::from_results(&results),
            results,
        };

        let md = render_eval_report(&report);
        assert!(md.starts_with("# Retrieval Evaluation\n\n"));
        assert!(md.contains("- Pass rate: 50.00%\n"));
        assert!(md.contains("- Threshold: 80%\n"));
        assert!(md.contains("| Case | Pass | Precision | Recall | Reason |\n"));
        assert!(md.contains("| good | true | 0.50 | 1.00 | matched pattern `unitree_ros2` at rank 1 |\n"));
        assert!(md.contains("## Worst cases"));

        let worst = md.split("## Worst cases").nth(1).unwrap();
        let bad_at = worst.find("| bad |").unwrap();
        let good_at = worst.find("| good |").unwrap();
        assert!(bad_at < good_at);
        assert!(worst.contains("ros2 \\| low level"));
    }

    #[test]
    fn long_queries_are_truncated_to_one_line() {
        let text = format!("first\nline {}", "x".repeat(200));
        let out = truncate_one_line(&text, 20);
        assert_eq!(out.chars().count(), 20);
        assert!(out.starts_with("first line"));
        assert!(out.ends_with('…'));
    }
}
