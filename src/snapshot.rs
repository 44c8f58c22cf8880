//! Snapshot comparison between the expected and actual vault trees.
//!
//! The expected tree is the suite fixture with a case's updates applied.
//! Both sides are normalized before comparison so that cosmetic blank-line
//! reflow does not register as a mismatch, while structural and content
//! differences still do.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::diff::{DiffEngine, DiffError, DiffOutput};
use crate::storage::{read_tree, StorageError, VaultStorage};
use crate::suite::BenchmarkCase;

/// A mismatch between expected and actual content for one path.
///
/// Exists only for paths where the normalized contents differ or one
/// side is absent. `expected`/`actual` hold the normalized text; `None`
/// means the path should not exist / was missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub diff: DiffOutput,
}

/// Errors raised while evaluating a case's snapshot.
#[derive(Debug, Error)]
pub enum ComparatorError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Diff error: {0}")]
    Diff(#[from] DiffError),
}

/// Applies a case's updates on top of the fixture. Pure, no I/O.
///
/// `Some(content)` sets the path; `None` deletes it.
pub fn build_expected_snapshot(
    fixture: &BTreeMap<String, String>,
    updates: &BTreeMap<String, Option<String>>,
) -> BTreeMap<String, String> {
    let mut snapshot = fixture.clone();
    for (path, update) in updates {
        match update {
            Some(content) => {
                snapshot.insert(path.clone(), content.clone());
            }
            None => {
                snapshot.remove(path);
            }
        }
    }
    snapshot
}

/// Normalizes text for comparison.
///
/// Line endings become `\n` and trailing whitespace is stripped per line.
/// Blank lines are removed from the body, but a leading YAML frontmatter
/// block (`---` ... `---`) keeps its blank lines, and the whole text is
/// trimmed of leading/trailing blank lines. The function is a projection:
/// applying it twice equals applying it once.
pub fn normalize_content(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = unified.split('\n').map(str::trim_end).collect();

    // Index of the closing frontmatter delimiter, if the text opens with one.
    let frontmatter_end = if lines.first() == Some(&"---") {
        lines
            .iter()
            .skip(1)
            .position(|l| *l == "---")
            .map(|offset| offset + 1)
    } else {
        None
    };

    let mut kept: Vec<&str> = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        let in_frontmatter = frontmatter_end.is_some_and(|end| idx <= end);
        if in_frontmatter || !line.is_empty() {
            kept.push(line);
        }
    }

    while kept.first().is_some_and(|l| l.is_empty()) {
        kept.remove(0);
    }
    while kept.last().is_some_and(|l| l.is_empty()) {
        kept.pop();
    }

    kept.join("\n")
}

/// Compares the expected final tree against the actual sandbox tree.
pub struct SnapshotComparator {
    diff: Arc<dyn DiffEngine>,
}

impl SnapshotComparator {
    pub fn new(diff: Arc<dyn DiffEngine>) -> Self {
        Self { diff }
    }

    /// Evaluates a case against the active sandbox tree.
    ///
    /// Returns one [`FileDiff`] per mismatched path: every expected path
    /// first (in key order), then any extra paths found only in the actual
    /// tree. Downstream scoring relies on that ordering to separate
    /// required mismatches from collateral ones.
    pub fn evaluate(
        &self,
        storage: &dyn VaultStorage,
        active_root: &str,
        fixture: &BTreeMap<String, String>,
        case: &BenchmarkCase,
    ) -> Result<Vec<FileDiff>, ComparatorError> {
        let expected = build_expected_snapshot(fixture, &case.expected_updates);
        let actual = read_tree(storage, active_root)?;

        let expected: BTreeMap<String, String> = expected
            .into_iter()
            .map(|(path, text)| (path, normalize_content(&text)))
            .collect();
        let actual: BTreeMap<String, String> = actual
            .into_iter()
            .map(|(path, text)| (path, normalize_content(&text)))
            .collect();

        let mut diffs = Vec::new();
        for (path, expected_text) in &expected {
            match actual.get(path) {
                Some(actual_text) if actual_text == expected_text => {}
                Some(actual_text) => diffs.push(self.file_diff(
                    path,
                    Some(expected_text.clone()),
                    Some(actual_text.clone()),
                )?),
                None => diffs.push(self.file_diff(path, Some(expected_text.clone()), None)?),
            }
        }
        for (path, actual_text) in &actual {
            if !expected.contains_key(path) {
                diffs.push(self.file_diff(path, None, Some(actual_text.clone()))?);
            }
        }

        debug!(
            case_id = %case.id,
            expected = expected.len(),
            actual = actual.len(),
            mismatches = diffs.len(),
            "Snapshot evaluated"
        );
        Ok(diffs)
    }

    fn file_diff(
        &self,
        path: &str,
        expected: Option<String>,
        actual: Option<String>,
    ) -> Result<FileDiff, ComparatorError> {
        let diff = self.diff.diff(
            expected.as_deref().unwrap_or(""),
            actual.as_deref().unwrap_or(""),
        )?;
        Ok(FileDiff {
            path: path.to_string(),
            expected,
            actual,
            diff,
        })
    }
}
