//! Line-level diff seam.
//!
//! The comparator only depends on the output shape: added/removed line
//! counts plus a renderable unified diff. [`LineDiff`] is the default
//! implementation; callers may plug in their own engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Output of diffing two texts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffOutput {
    /// Lines present in `actual` but not in `expected`.
    pub additions: usize,
    /// Lines present in `expected` but not in `actual`.
    pub deletions: usize,
    /// Unified diff suitable for display in reports.
    pub rendered: String,
}

impl DiffOutput {
    /// Total changed lines on both sides.
    pub fn changed_lines(&self) -> usize {
        self.additions + self.deletions
    }
}

/// Errors from a diff engine.
#[derive(Debug, Error)]
pub enum DiffError {
    #[error("Diff failed: {0}")]
    Failed(String),
}

/// Text diff engine consumed by the snapshot comparator.
pub trait DiffEngine: Send + Sync {
    fn diff(&self, expected: &str, actual: &str) -> Result<DiffOutput, DiffError>;
}

/// Default engine backed by `similar`'s line diff.
#[derive(Debug, Default)]
pub struct LineDiff;

impl DiffEngine for LineDiff {
    fn diff(&self, expected: &str, actual: &str) -> Result<DiffOutput, DiffError> {
        let diff = similar::TextDiff::from_lines(expected, actual);

        let mut additions = 0;
        let mut deletions = 0;
        for change in diff.iter_all_changes() {
            match change.tag() {
                similar::ChangeTag::Insert => additions += 1,
                similar::ChangeTag::Delete => deletions += 1,
                similar::ChangeTag::Equal => {}
            }
        }

        let rendered = diff
            .unified_diff()
            .context_radius(3)
            .header("expected", "actual")
            .to_string();

        Ok(DiffOutput {
            additions,
            deletions,
            rendered,
        })
    }
}
