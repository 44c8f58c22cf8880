//! Benchmark suite and case definitions.
//!
//! A suite bundles a fixture (the initial vault tree every case starts
//! from), scoring defaults, and an ordered list of cases. Suites are
//! authored as YAML or JSON files and are immutable once loaded.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scoring::ScoreWeights;

/// Errors that can occur while loading or validating a suite.
#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("Unsupported suite format: {0} (expected .yaml, .yml or .json)")]
    UnknownFormat(String),

    #[error("Suite validation failed: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Case difficulty tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("Unknown difficulty: {}", other)),
        }
    }
}

/// Optional ceilings for the efficiency dimensions of a case.
///
/// Any omitted ceiling is excluded from the efficiency average rather
/// than penalized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EfficiencyBudget {
    #[serde(default)]
    pub max_tool_calls: Option<f64>,
    #[serde(default)]
    pub max_wall_time_ms: Option<f64>,
    #[serde(default)]
    pub max_tool_time_ms: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<f64>,
    #[serde(default)]
    pub max_chars_read: Option<f64>,
    #[serde(default)]
    pub max_chars_written: Option<f64>,
}

impl EfficiencyBudget {
    /// True if no dimension has a ceiling.
    pub fn is_empty(&self) -> bool {
        [
            self.max_tool_calls,
            self.max_wall_time_ms,
            self.max_tool_time_ms,
            self.max_tokens,
            self.max_chars_read,
            self.max_chars_written,
        ]
        .iter()
        .all(Option::is_none)
    }
}

/// A single benchmark case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkCase {
    /// Unique identifier within the suite.
    pub id: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Instructions issued to the agent driver, one per turn.
    pub prompts: Vec<String>,
    /// Path -> new content applied on top of the suite fixture;
    /// `None` means the path must be deleted.
    #[serde(default)]
    pub expected_updates: BTreeMap<String, Option<String>>,
    /// Overrides the suite default when set.
    #[serde(default)]
    pub max_points: Option<f64>,
    /// Overrides the suite default when set.
    #[serde(default)]
    pub efficiency_budget: Option<EfficiencyBudget>,
}

impl BenchmarkCase {
    /// Paths named in `expected_updates`, scored under correctness.
    pub fn required_paths(&self) -> BTreeSet<String> {
        self.expected_updates.keys().cloned().collect()
    }
}

fn default_max_points() -> f64 {
    crate::scoring::DEFAULT_MAX_POINTS
}

/// A benchmark suite: fixture, scoring defaults and an ordered case list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSuite {
    pub id: String,
    pub title: String,
    pub version: String,
    /// Correctness/efficiency weighting; normalized before use.
    #[serde(default)]
    pub weights: ScoreWeights,
    #[serde(default = "default_max_points")]
    pub default_max_points: f64,
    #[serde(default)]
    pub default_efficiency_budget: Option<EfficiencyBudget>,
    /// Initial vault tree every case starts from after reset.
    #[serde(default)]
    pub fixture: BTreeMap<String, String>,
    pub cases: Vec<BenchmarkCase>,
}

impl BenchmarkSuite {
    /// Loads a suite from a YAML or JSON file and validates it.
    pub fn load(path: &Path) -> Result<Self, SuiteError> {
        let content = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let suite = match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&content)?,
            "json" => Self::from_json_str(&content)?,
            other => return Err(SuiteError::UnknownFormat(other.to_string())),
        };
        Ok(suite)
    }

    /// Parses a suite from YAML and validates it.
    pub fn from_yaml_str(content: &str) -> Result<Self, SuiteError> {
        let suite: Self = serde_yaml::from_str(content)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Parses a suite from JSON and validates it.
    pub fn from_json_str(content: &str) -> Result<Self, SuiteError> {
        let suite: Self = serde_json::from_str(content)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Checks structural invariants of the suite definition.
    pub fn validate(&self) -> Result<(), SuiteError> {
        if self.id.is_empty() {
            return Err(SuiteError::Validation("suite id must not be empty".into()));
        }
        if self.version.is_empty() {
            return Err(SuiteError::Validation(
                "suite version must not be empty".into(),
            ));
        }
        if self.cases.is_empty() {
            return Err(SuiteError::Validation("suite has no cases".into()));
        }
        if !(self.default_max_points.is_finite() && self.default_max_points > 0.0) {
            return Err(SuiteError::Validation(format!(
                "default_max_points must be a positive number, got {}",
                self.default_max_points
            )));
        }

        let mut seen = BTreeSet::new();
        for case in &self.cases {
            if case.id.is_empty() {
                return Err(SuiteError::Validation("case id must not be empty".into()));
            }
            if !seen.insert(case.id.as_str()) {
                return Err(SuiteError::Validation(format!(
                    "duplicate case id '{}'",
                    case.id
                )));
            }
            if case.prompts.is_empty() {
                return Err(SuiteError::Validation(format!(
                    "case '{}' has no prompts",
                    case.id
                )));
            }
        }
        Ok(())
    }

    /// Max points for a case, falling back to the suite default.
    pub fn case_max_points(&self, case: &BenchmarkCase) -> f64 {
        case.max_points.unwrap_or(self.default_max_points)
    }

    /// Efficiency budget for a case, falling back to the suite default.
    pub fn case_budget<'a>(&'a self, case: &'a BenchmarkCase) -> Option<&'a EfficiencyBudget> {
        case.efficiency_budget
            .as_ref()
            .or(self.default_efficiency_budget.as_ref())
    }
}
