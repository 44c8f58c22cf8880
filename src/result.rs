//! Per-case and per-run results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::CaseMetrics;
use crate::scoring::ScoreBreakdown;
use crate::snapshot::FileDiff;
use crate::suite::BenchmarkSuite;

/// Lifecycle state of a case within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pending,
    Running,
    /// Zero diffs against the expected snapshot.
    Pass,
    /// At least one diff; partial credit may still apply.
    Fail,
    /// The case raised an exception; see `errors`.
    Error,
    /// Never started (cancellation).
    Skipped,
}

impl CaseStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CaseStatus::Pending | CaseStatus::Running)
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaseStatus::Pending => write!(f, "pending"),
            CaseStatus::Running => write!(f, "running"),
            CaseStatus::Pass => write!(f, "pass"),
            CaseStatus::Fail => write!(f, "fail"),
            CaseStatus::Error => write!(f, "error"),
            CaseStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Immutable record of one case execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_id: String,
    pub status: CaseStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub points_earned: f64,
    pub max_points: f64,
    pub score_percent: f64,
    pub breakdown: ScoreBreakdown,
    pub metrics: CaseMetrics,
    pub diffs: Vec<FileDiff>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl CaseResult {
    /// A case that never started (cancellation before its turn).
    pub fn skipped(case_id: impl Into<String>, max_points: f64) -> Self {
        Self {
            case_id: case_id.into(),
            status: CaseStatus::Skipped,
            started_at: None,
            completed_at: None,
            points_earned: 0.0,
            max_points,
            score_percent: 0.0,
            breakdown: ScoreBreakdown::default(),
            metrics: CaseMetrics::default(),
            diffs: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// A case that raised an exception after starting.
    pub fn errored(
        case_id: impl Into<String>,
        max_points: f64,
        started_at: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            case_id: case_id.into(),
            status: CaseStatus::Error,
            started_at: Some(started_at),
            completed_at: Some(Utc::now()),
            points_earned: 0.0,
            max_points,
            score_percent: 0.0,
            breakdown: ScoreBreakdown::default(),
            metrics: CaseMetrics::default(),
            diffs: Vec::new(),
            errors: vec![message.into()],
        }
    }

    /// Case duration in milliseconds, when both timestamps are present.
    pub fn duration_ms(&self) -> Option<u64> {
        let (start, end) = (self.started_at?, self.completed_at?);
        u64::try_from((end - start).num_milliseconds()).ok()
    }

    /// Paths that did not match the expected snapshot.
    pub fn mismatched_paths(&self) -> Vec<&str> {
        self.diffs.iter().map(|d| d.path.as_str()).collect()
    }
}

/// Aggregate result of one suite execution against one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// `YYYYMMDD-HHMMSS`; lexicographic order equals chronological order.
    pub run_id: String,
    pub model_id: String,
    pub suite_id: String,
    pub suite_version: String,
    pub total_points_earned: f64,
    pub total_max_points: f64,
    pub score_percent: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cases: Vec<CaseResult>,
}

impl RunResult {
    pub fn new(run_id: impl Into<String>, model_id: impl Into<String>, suite: &BenchmarkSuite) -> Self {
        Self {
            run_id: run_id.into(),
            model_id: model_id.into(),
            suite_id: suite.id.clone(),
            suite_version: suite.version.clone(),
            total_points_earned: 0.0,
            total_max_points: 0.0,
            score_percent: 0.0,
            started_at: Utc::now(),
            completed_at: None,
            cases: Vec::new(),
        }
    }

    /// Appends a case result and keeps the totals invariant.
    pub fn push_case(&mut self, case: CaseResult) {
        self.cases.push(case);
        self.recompute_totals();
    }

    /// Recomputes aggregates so that totals equal the case sums.
    pub fn recompute_totals(&mut self) {
        self.total_points_earned = self.cases.iter().map(|c| c.points_earned).sum();
        self.total_max_points = self.cases.iter().map(|c| c.max_points).sum();
        self.score_percent = if self.total_max_points > 0.0 {
            (self.total_points_earned / self.total_max_points * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };
    }

    pub fn passed_count(&self) -> usize {
        self.cases
            .iter()
            .filter(|c| c.status == CaseStatus::Pass)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.cases
            .iter()
            .filter(|c| c.status == CaseStatus::Fail)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite() -> BenchmarkSuite {
        crate::suite::BenchmarkSuite::from_yaml_str(
            r#"
id: s
title: t
version: "1"
cases:
  - id: c1
    title: a
    prompts: ["x"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_totals_track_case_sums() {
        let mut run = RunResult::new("20260825-120000", "model-x", &suite());

        let mut passed = CaseResult::skipped("c1", 10.0);
        passed.status = CaseStatus::Pass;
        passed.points_earned = 10.0;
        passed.score_percent = 100.0;
        run.push_case(passed);
        run.push_case(CaseResult::skipped("c2", 10.0));

        assert_eq!(run.total_points_earned, 10.0);
        assert_eq!(run.total_max_points, 20.0);
        assert!((run.score_percent - 50.0).abs() < 1e-9);
        assert_eq!(run.passed_count(), 1);
    }

    #[test]
    fn test_status_display_and_terminality() {
        assert_eq!(CaseStatus::Pass.to_string(), "pass");
        assert_eq!(CaseStatus::Skipped.to_string(), "skipped");
        assert!(CaseStatus::Error.is_terminal());
        assert!(!CaseStatus::Running.is_terminal());
    }

    #[test]
    fn test_errored_case_has_message_and_zero_points() {
        let result = CaseResult::errored("c1", 10.0, Utc::now(), "driver exploded");
        assert_eq!(result.status, CaseStatus::Error);
        assert_eq!(result.points_earned, 0.0);
        assert_eq!(result.errors, vec!["driver exploded".to_string()]);
        assert!(result.duration_ms().is_some());
    }
}
