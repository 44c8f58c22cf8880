//! Harness configuration.
//!
//! All defaults are named constants; nothing is read from ambient state.
//! The config is passed to the orchestrator at construction time.

use serde::{Deserialize, Serialize};

use crate::sandbox::DEFAULT_KEEP_RUNS;

/// Default base folder for the sandbox and run artifacts.
pub const DEFAULT_BENCH_ROOT: &str = "bench";

/// Configuration for a run orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Base folder holding `active/` and `runs/`.
    pub bench_root: String,
    /// Historical runs kept by retention pruning.
    pub keep_runs: usize,
    /// Whether to copy the sandbox tree into the run artifacts per case.
    pub snapshot_vault: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            bench_root: DEFAULT_BENCH_ROOT.to_string(),
            keep_runs: DEFAULT_KEEP_RUNS,
            snapshot_vault: true,
        }
    }
}

impl HarnessConfig {
    pub fn with_bench_root(mut self, root: impl Into<String>) -> Self {
        self.bench_root = root.into();
        self
    }

    pub fn with_keep_runs(mut self, keep: usize) -> Self {
        self.keep_runs = keep;
        self
    }

    pub fn without_vault_snapshots(mut self) -> Self {
        self.snapshot_vault = false;
        self
    }
}
