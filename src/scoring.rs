//! Scoring engine: weighted correctness + budget-based efficiency.
//!
//! Correctness comes from the snapshot diffs; efficiency from the case
//! metrics measured against the efficiency budget. Both fractions are
//! combined into points under the normalized suite weights.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::metrics::CaseMetrics;
use crate::snapshot::FileDiff;
use crate::suite::EfficiencyBudget;

/// Fallback correctness weight when the suite weights are invalid.
pub const DEFAULT_CORRECTNESS_WEIGHT: f64 = 0.7;
/// Fallback efficiency weight when the suite weights are invalid.
pub const DEFAULT_EFFICIENCY_WEIGHT: f64 = 0.3;
/// Fallback max points per case.
pub const DEFAULT_MAX_POINTS: f64 = 10.0;

/// Correctness/efficiency weighting for a suite.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub correctness: f64,
    pub efficiency: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            correctness: DEFAULT_CORRECTNESS_WEIGHT,
            efficiency: DEFAULT_EFFICIENCY_WEIGHT,
        }
    }
}

impl ScoreWeights {
    /// Returns `(correctness, efficiency)` scaled to sum to 1.
    ///
    /// Negative, non-finite or all-zero weights fall back to the defaults.
    pub fn normalized(&self) -> (f64, f64) {
        let valid = self.correctness.is_finite()
            && self.efficiency.is_finite()
            && self.correctness >= 0.0
            && self.efficiency >= 0.0
            && self.correctness + self.efficiency > 0.0;
        if !valid {
            return (DEFAULT_CORRECTNESS_WEIGHT, DEFAULT_EFFICIENCY_WEIGHT);
        }
        let sum = self.correctness + self.efficiency;
        (self.correctness / sum, self.efficiency / sum)
    }
}

/// Point decomposition of a case score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub correctness_points: f64,
    pub efficiency_points: f64,
    /// Correctness points lost to collateral (non-required) diffs.
    pub penalty_points: f64,
    pub correctness_fraction: f64,
    pub efficiency_fraction: f64,
}

/// Outcome of scoring one case.
#[derive(Debug, Clone)]
pub struct CaseScore {
    pub points_earned: f64,
    pub max_points: f64,
    pub score_percent: f64,
    pub breakdown: ScoreBreakdown,
    /// Pass iff there were zero diffs.
    pub passed: bool,
}

/// Score for one budget dimension: 1 at or under the ceiling, otherwise
/// `max / actual`, clamped to `[0, 1]`.
pub fn compute_budget_score(actual: f64, max: f64) -> f64 {
    if actual <= max {
        1.0
    } else {
        (max / actual).clamp(0.0, 1.0)
    }
}

/// Combines diffs and metrics into a weighted point score.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    weights: ScoreWeights,
}

impl ScoringEngine {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    /// Scores a case from its diffs, required paths, metrics and budget.
    pub fn score_case(
        &self,
        diffs: &[FileDiff],
        required: &BTreeSet<String>,
        metrics: &CaseMetrics,
        budget: Option<&EfficiencyBudget>,
        max_points: f64,
    ) -> CaseScore {
        let correctness = correctness_fraction(diffs, required, true);
        let required_only = correctness_fraction(diffs, required, false);
        let efficiency = efficiency_fraction(metrics, budget);

        let (correctness_weight, _) = self.weights.normalized();
        let correctness_max = max_points * correctness_weight;
        let efficiency_max = max_points - correctness_max;

        let points_earned = (correctness_max * correctness + efficiency_max * efficiency)
            .clamp(0.0, max_points);
        let score_percent = if max_points > 0.0 {
            points_earned / max_points * 100.0
        } else {
            0.0
        };

        let breakdown = ScoreBreakdown {
            correctness_points: correctness_max * correctness,
            efficiency_points: efficiency_max * efficiency,
            penalty_points: (correctness_max * (required_only - correctness)).max(0.0),
            correctness_fraction: correctness,
            efficiency_fraction: efficiency,
        };

        debug!(
            correctness,
            efficiency, points_earned, max_points, "Case scored"
        );

        CaseScore {
            points_earned,
            max_points,
            score_percent,
            breakdown,
            passed: diffs.is_empty(),
        }
    }
}

/// Mean of per-path correctness scores.
///
/// Required paths score 1 when untouched by a diff, otherwise a
/// similarity derived from the diff stats. Collateral diffs each add a
/// hard 0 to the pool when `include_collateral` is set.
fn correctness_fraction(
    diffs: &[FileDiff],
    required: &BTreeSet<String>,
    include_collateral: bool,
) -> f64 {
    if required.is_empty() {
        return if diffs.is_empty() { 1.0 } else { 0.0 };
    }

    let mut scores: Vec<f64> = Vec::with_capacity(required.len());
    for path in required {
        match diffs.iter().find(|d| &d.path == path) {
            None => scores.push(1.0),
            Some(diff) => scores.push(required_path_score(diff)),
        }
    }
    if include_collateral {
        for diff in diffs {
            if !required.contains(&diff.path) {
                scores.push(0.0);
            }
        }
    }

    scores.iter().sum::<f64>() / scores.len() as f64
}

fn required_path_score(diff: &FileDiff) -> f64 {
    let (Some(expected), Some(_)) = (&diff.expected, &diff.actual) else {
        // Content unknowable or file missing.
        return 0.0;
    };
    let expected_lines = expected.lines().count();
    if expected_lines == 0 {
        return 0.0;
    }
    (1.0 - diff.diff.changed_lines() as f64 / expected_lines as f64).clamp(0.0, 1.0)
}

/// Mean of per-dimension budget scores; 1 when no dimension applies.
///
/// A defined ceiling whose metric was not measured is excluded from the
/// average rather than treated as an overrun.
fn efficiency_fraction(metrics: &CaseMetrics, budget: Option<&EfficiencyBudget>) -> f64 {
    let Some(budget) = budget else {
        return 1.0;
    };

    let dimensions: [(Option<f64>, Option<u64>); 6] = [
        (budget.max_tool_calls, metrics.tool_calls),
        (budget.max_wall_time_ms, metrics.wall_time_ms),
        (budget.max_tool_time_ms, metrics.tool_time_ms),
        (budget.max_tokens, metrics.estimated_tokens),
        (budget.max_chars_read, metrics.chars_read),
        (budget.max_chars_written, metrics.chars_written),
    ];

    let mut scores = Vec::new();
    for (ceiling, actual) in dimensions {
        let Some(max) = ceiling.filter(|m| m.is_finite() && *m > 0.0) else {
            continue;
        };
        let Some(actual) = actual else {
            continue;
        };
        scores.push(compute_budget_score(actual as f64, max));
    }

    if scores.is_empty() {
        1.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}
