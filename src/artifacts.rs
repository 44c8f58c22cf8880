//! Artifact persistence for runs and cases.
//!
//! Artifacts are write-once: re-running a suite creates a fresh run id
//! rather than mutating prior artifacts. Layout under `runs/<runId>/`:
//! `run.json`, `bench-<runId>.md`, and per case `cases/<caseId>/`
//! with `result.json`, `transcript.json` and the `vault/` snapshot.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::report;
use crate::result::{CaseResult, RunResult};
use crate::storage::{create_folders, StorageError, VaultStorage};
use crate::transcript::TranscriptMessage;

/// Errors from artifact persistence.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Writes and reads run artifacts through the storage adapter.
pub struct ArtifactStore {
    storage: Arc<dyn VaultStorage>,
}

impl ArtifactStore {
    pub fn new(storage: Arc<dyn VaultStorage>) -> Self {
        Self { storage }
    }

    fn case_dir(run_path: &str, case_id: &str) -> String {
        format!("{}/cases/{}", run_path, case_id)
    }

    /// Persists `result.json` and `transcript.json` for one case.
    pub fn write_case_artifacts(
        &self,
        run_path: &str,
        result: &CaseResult,
        transcript: &[TranscriptMessage],
    ) -> Result<(), ArtifactError> {
        let dir = Self::case_dir(run_path, &result.case_id);
        create_folders(self.storage.as_ref(), &dir)?;

        let result_json = serde_json::to_string_pretty(result)?;
        self.storage
            .write(&format!("{}/result.json", dir), &result_json)?;

        let transcript_json = serde_json::to_string_pretty(transcript)?;
        self.storage
            .write(&format!("{}/transcript.json", dir), &transcript_json)?;

        debug!(case_id = %result.case_id, "Case artifacts written");
        Ok(())
    }

    /// Persists `run.json` and the markdown report for a run.
    pub fn write_run_summary(&self, run_path: &str, run: &RunResult) -> Result<(), ArtifactError> {
        create_folders(self.storage.as_ref(), run_path)?;

        let json = serde_json::to_string_pretty(run)?;
        self.storage.write(&format!("{}/run.json", run_path), &json)?;

        let markdown = report::render_markdown(run);
        self.storage.write(
            &format!("{}/bench-{}.md", run_path, run.run_id),
            &markdown,
        )?;

        debug!(run_id = %run.run_id, "Run summary written");
        Ok(())
    }

    /// Loads a persisted run summary.
    pub fn load_run(&self, run_path: &str) -> Result<RunResult, ArtifactError> {
        let json = self.storage.read(&format!("{}/run.json", run_path))?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::CaseResult;
    use crate::storage::MemoryVault;
    use crate::suite::BenchmarkSuite;

    fn suite() -> BenchmarkSuite {
        BenchmarkSuite::from_yaml_str(
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
    fn test_case_artifacts_layout() {
        let vault = Arc::new(MemoryVault::new());
        let store = ArtifactStore::new(vault.clone());
        let result = CaseResult::skipped("c1", 10.0);
        let transcript = vec![TranscriptMessage::user("do the thing")];

        store
            .write_case_artifacts("bench/runs/r1", &result, &transcript)
            .unwrap();

        let result_json = vault.read("bench/runs/r1/cases/c1/result.json").unwrap();
        assert!(result_json.contains("\"skipped\""));
        let transcript_json = vault
            .read("bench/runs/r1/cases/c1/transcript.json")
            .unwrap();
        assert!(transcript_json.contains("do the thing"));
    }

    #[test]
    fn test_run_summary_roundtrip() {
        let vault = Arc::new(MemoryVault::new());
        let store = ArtifactStore::new(vault.clone());

        let mut run = RunResult::new("20260825-120000", "model-x", &suite());
        run.push_case(CaseResult::skipped("c1", 10.0));

        store.write_run_summary("bench/runs/20260825-120000", &run).unwrap();

        assert!(vault
            .exists("bench/runs/20260825-120000/bench-20260825-120000.md")
            .unwrap());

        let loaded = store.load_run("bench/runs/20260825-120000").unwrap();
        assert_eq!(loaded.run_id, "20260825-120000");
        assert_eq!(loaded.cases.len(), 1);
        assert_eq!(loaded.total_max_points, 10.0);
    }
}
