//! Markdown run report.

use std::fmt::Write as _;

use crate::result::{CaseStatus, RunResult};

fn format_duration_ms(ms: Option<u64>) -> String {
    match ms {
        Some(ms) if ms >= 1000 => format!("{:.1}s", ms as f64 / 1000.0),
        Some(ms) => format!("{}ms", ms),
        None => "-".to_string(),
    }
}

/// Renders the `bench-<runId>.md` summary for a run.
pub fn render_markdown(run: &RunResult) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# Benchmark run {}", run.run_id);
    let _ = writeln!(out);
    let _ = writeln!(out, "- Model: `{}`", run.model_id);
    let _ = writeln!(out, "- Suite: `{}` v{}", run.suite_id, run.suite_version);
    let _ = writeln!(
        out,
        "- Started: {}",
        run.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(completed) = run.completed_at {
        let _ = writeln!(out, "- Completed: {}", completed.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    let _ = writeln!(
        out,
        "- Score: **{:.1}/{:.1} ({:.1}%)** — {} passed, {} failed, {} cases",
        run.total_points_earned,
        run.total_max_points,
        run.score_percent,
        run.passed_count(),
        run.failed_count(),
        run.cases.len()
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "| Case | Status | Points | Score | Duration | Mismatched paths |");
    let _ = writeln!(out, "|------|--------|--------|-------|----------|------------------|");
    for case in &run.cases {
        let mismatched = if case.diffs.is_empty() {
            "-".to_string()
        } else {
            case.mismatched_paths().join("<br>")
        };
        let _ = writeln!(
            out,
            "| {} | {} | {:.1}/{:.1} | {:.1}% | {} | {} |",
            case.case_id,
            case.status,
            case.points_earned,
            case.max_points,
            case.score_percent,
            format_duration_ms(case.duration_ms()),
            mismatched
        );
    }

    let errored: Vec<_> = run
        .cases
        .iter()
        .filter(|c| c.status == CaseStatus::Error && !c.errors.is_empty())
        .collect();
    if !errored.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Errors");
        let _ = writeln!(out);
        for case in errored {
            let _ = writeln!(out, "- `{}`: {}", case.case_id, case.errors.join("; "));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{CaseResult, RunResult};
    use crate::suite::BenchmarkSuite;
    use chrono::Utc;

    fn run_with_cases() -> RunResult {
        let suite = BenchmarkSuite::from_yaml_str(
            r#"
id: notes
title: t
version: "2.1"
cases:
  - id: c1
    title: a
    prompts: ["x"]
"#,
        )
        .unwrap();
        let mut run = RunResult::new("20260825-153000", "model-x", &suite);
        let mut passed = CaseResult::skipped("c1", 10.0);
        passed.status = crate::result::CaseStatus::Pass;
        passed.points_earned = 10.0;
        passed.score_percent = 100.0;
        run.push_case(passed);
        run.push_case(CaseResult::errored(
            "c2",
            10.0,
            Utc::now(),
            "driver exploded",
        ));
        run.completed_at = Some(Utc::now());
        run
    }

    #[test]
    fn test_report_contains_summary_and_rows() {
        let report = render_markdown(&run_with_cases());

        assert!(report.contains("# Benchmark run 20260825-153000"));
        assert!(report.contains("`notes` v2.1"));
        assert!(report.contains("1 passed"));
        assert!(report.contains("| c1 | pass | 10.0/10.0 | 100.0% |"));
        assert!(report.contains("| c2 | error |"));
        assert!(report.contains("driver exploded"));
    }

    #[test]
    fn test_duration_formatting() {
        assert_eq!(format_duration_ms(None), "-");
        assert_eq!(format_duration_ms(Some(250)), "250ms");
        assert_eq!(format_duration_ms(Some(2500)), "2.5s");
    }
}
