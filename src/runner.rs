//! Run orchestration: sequences cases against the sandbox, invokes the
//! agent driver and drives scoring plus artifact persistence.
//!
//! Cases execute strictly sequentially because they share one active
//! sandbox root. A case-level failure becomes an `error` result and the
//! run continues; only sandbox setup failures abort the run. Case N's
//! artifacts are fully written before case N+1's reset begins.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::artifacts::ArtifactStore;
use crate::config::HarnessConfig;
use crate::diff::{DiffEngine, LineDiff};
use crate::driver::{AgentDriver, DriverContext, DriverError};
use crate::metrics::MetricsCollector;
use crate::result::{CaseResult, CaseStatus, RunResult};
use crate::sandbox::{RunPaths, SandboxError, SandboxManager};
use crate::scoring::ScoringEngine;
use crate::snapshot::SnapshotComparator;
use crate::storage::{ScopedVault, VaultStorage};
use crate::suite::{BenchmarkCase, BenchmarkSuite, SuiteError};
use crate::transcript::TranscriptMessage;

/// Errors fatal to a whole run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Suite error: {0}")]
    Suite(#[from] SuiteError),

    #[error("Sandbox setup failed: {0}")]
    Setup(#[from] SandboxError),
}

/// Progress notifications emitted while a run executes.
///
/// Presentation layers subscribe to these instead of reading orchestrator
/// state; each finished case arrives as an immutable [`CaseResult`].
#[derive(Debug, Clone)]
pub enum CaseEvent {
    Started { case_id: String },
    Finished(CaseResult),
}

/// Sequences a suite's cases against one sandbox root.
pub struct RunOrchestrator {
    storage: Arc<dyn VaultStorage>,
    sandbox: SandboxManager,
    comparator: SnapshotComparator,
    metrics: MetricsCollector,
    artifacts: ArtifactStore,
    config: HarnessConfig,
    events: Option<UnboundedSender<CaseEvent>>,
}

impl RunOrchestrator {
    pub fn new(storage: Arc<dyn VaultStorage>, config: HarnessConfig) -> Self {
        Self {
            sandbox: SandboxManager::new(storage.clone(), config.bench_root.clone()),
            comparator: SnapshotComparator::new(Arc::new(LineDiff)),
            metrics: MetricsCollector::default(),
            artifacts: ArtifactStore::new(storage.clone()),
            storage,
            config,
            events: None,
        }
    }

    /// Replaces the default diff engine.
    pub fn with_diff_engine(mut self, diff: Arc<dyn DiffEngine>) -> Self {
        self.comparator = SnapshotComparator::new(diff);
        self
    }

    /// Replaces the default metrics collector.
    pub fn with_metrics_collector(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    /// Subscribes a channel to per-case progress events.
    pub fn with_events(mut self, events: UnboundedSender<CaseEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: CaseEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }

    /// Executes every case of the suite and returns the aggregate result.
    ///
    /// The returned [`RunResult`] always carries a terminal status for
    /// every case of the suite, including under cancellation.
    pub async fn run(
        &self,
        suite: &BenchmarkSuite,
        model_id: &str,
        driver: &dyn AgentDriver,
        cancel: CancellationToken,
    ) -> Result<RunResult, HarnessError> {
        suite.validate()?;

        let run_id = Utc::now().format("%Y%m%d-%H%M%S").to_string();
        info!(
            run_id,
            model_id,
            suite_id = %suite.id,
            driver = driver.name(),
            cases = suite.cases.len(),
            "Starting benchmark run"
        );

        // Fatal: without the directory layout no case can execute.
        let paths = self.sandbox.ensure_directories(&run_id)?;

        // Retention runs against runs/, never against the active sandbox.
        if let Err(e) = self
            .sandbox
            .prune_old_runs(&paths.runs_root, self.config.keep_runs)
        {
            warn!(error = %e, "Retention pruning failed");
        }

        let mut run = RunResult::new(run_id, model_id, suite);
        for case in &suite.cases {
            let max_points = suite.case_max_points(case);

            let result = if cancel.is_cancelled() {
                // Never started; still listed so totals stay explainable.
                CaseResult::skipped(&case.id, max_points)
            } else {
                let (result, transcript) = self
                    .execute_case(suite, case, model_id, driver, &paths, &cancel)
                    .await;
                self.persist_case(&paths, &result, &transcript);
                result
            };

            info!(
                case_id = %case.id,
                status = %result.status,
                points = result.points_earned,
                "Case finished"
            );
            self.emit(CaseEvent::Finished(result.clone()));
            run.push_case(result);
        }

        run.completed_at = Some(Utc::now());
        run.recompute_totals();

        // Artifact write faults never suppress the in-memory result.
        if let Err(e) = self.artifacts.write_run_summary(&paths.run_path, &run) {
            error!(error = %e, "Failed to write run summary");
        }

        info!(
            run_id = %run.run_id,
            score = run.score_percent,
            passed = run.passed_count(),
            "Benchmark run complete"
        );
        Ok(run)
    }

    /// Runs one case through reset, driver, evaluation and scoring.
    ///
    /// Never propagates case-level failures; they come back as an
    /// `error`-status result.
    async fn execute_case(
        &self,
        suite: &BenchmarkSuite,
        case: &BenchmarkCase,
        model_id: &str,
        driver: &dyn AgentDriver,
        paths: &RunPaths,
        cancel: &CancellationToken,
    ) -> (CaseResult, Vec<TranscriptMessage>) {
        let max_points = suite.case_max_points(case);
        let started_at = Utc::now();

        if let Err(e) = self
            .sandbox
            .reset_active_sandbox(&paths.active_root, &suite.fixture)
        {
            return (
                CaseResult::errored(&case.id, max_points, started_at, format!("sandbox reset: {}", e)),
                Vec::new(),
            );
        }

        self.emit(CaseEvent::Started {
            case_id: case.id.clone(),
        });

        // The driver only ever sees the active subtree.
        let scoped: Arc<dyn VaultStorage> = Arc::new(ScopedVault::new(
            self.storage.clone(),
            paths.active_root.clone(),
        ));
        let ctx = DriverContext {
            case_id: case.id.clone(),
            prompts: case.prompts.clone(),
            model_id: model_id.to_string(),
            vault: scoped,
            cancel: cancel.clone(),
        };

        let transcript = match driver.run_case(ctx).await {
            Ok(transcript) => transcript,
            Err(DriverError::Cancelled) => {
                return (
                    CaseResult::errored(&case.id, max_points, started_at, "cancelled mid-case"),
                    Vec::new(),
                );
            }
            Err(e) => {
                return (
                    CaseResult::errored(&case.id, max_points, started_at, e.to_string()),
                    Vec::new(),
                );
            }
        };

        // Comparator faults (including a throwing diff engine) are case
        // errors, not silent zeros.
        let diffs = match self
            .comparator
            .evaluate(self.storage.as_ref(), &paths.active_root, &suite.fixture, case)
        {
            Ok(diffs) => diffs,
            Err(e) => {
                return (
                    CaseResult::errored(&case.id, max_points, started_at, format!("evaluation: {}", e)),
                    transcript,
                );
            }
        };

        let completed_at = Utc::now();
        let mut metrics = self.metrics.collect(&transcript);
        metrics.wall_time_ms = u64::try_from((completed_at - started_at).num_milliseconds()).ok();

        let scoring = ScoringEngine::new(suite.weights);
        let score = scoring.score_case(
            &diffs,
            &case.required_paths(),
            &metrics,
            suite.case_budget(case),
            max_points,
        );

        let result = CaseResult {
            case_id: case.id.clone(),
            status: if score.passed {
                CaseStatus::Pass
            } else {
                CaseStatus::Fail
            },
            started_at: Some(started_at),
            completed_at: Some(completed_at),
            points_earned: score.points_earned,
            max_points: score.max_points,
            score_percent: score.score_percent,
            breakdown: score.breakdown,
            metrics,
            diffs,
            errors: Vec::new(),
        };
        (result, transcript)
    }

    /// Snapshots the sandbox and writes case artifacts. Runs after every
    /// started case, including errored ones; failures are logged only.
    fn persist_case(&self, paths: &RunPaths, result: &CaseResult, transcript: &[TranscriptMessage]) {
        if self.config.snapshot_vault {
            if let Err(e) =
                self.sandbox
                    .snapshot_active_case(&paths.active_root, &paths.run_path, &result.case_id)
            {
                warn!(case_id = %result.case_id, error = %e, "Sandbox snapshot failed");
            }
        }
        if let Err(e) = self
            .artifacts
            .write_case_artifacts(&paths.run_path, result, transcript)
        {
            warn!(case_id = %result.case_id, error = %e, "Case artifact write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{NoopDriver, OracleDriver};
    use crate::storage::MemoryVault;
    use async_trait::async_trait;

    fn suite() -> BenchmarkSuite {
        BenchmarkSuite::from_yaml_str(
            r#"
id: notes
title: Note edits
version: "1"
weights:
  correctness: 0.7
  efficiency: 0.3
default_max_points: 10
fixture:
  target.md: OLD
  keep.md: KEEP
cases:
  - id: edit-target
    title: Edit target
    prompts: ["set target.md to NEW"]
    expected_updates:
      target.md: NEW
  - id: delete-keep
    title: Delete keep
    prompts: ["remove keep.md"]
    expected_updates:
      keep.md: null
"#,
        )
        .unwrap()
    }

    fn orchestrator(vault: Arc<MemoryVault>) -> RunOrchestrator {
        RunOrchestrator::new(vault, HarnessConfig::default())
    }

    #[tokio::test]
    async fn test_oracle_run_scores_full_marks() {
        let vault = Arc::new(MemoryVault::new());
        let suite = suite();
        let driver = OracleDriver::from_suite(&suite);

        let run = orchestrator(vault.clone())
            .run(&suite, "model-x", &driver, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(run.cases.len(), 2);
        assert!(run.cases.iter().all(|c| c.status == CaseStatus::Pass));
        assert!((run.score_percent - 100.0).abs() < 1e-9);
        assert_eq!(run.total_max_points, 20.0);
    }

    #[tokio::test]
    async fn test_noop_run_fails_but_persists_everything() {
        let vault = Arc::new(MemoryVault::new());
        let run = orchestrator(vault.clone())
            .run(&suite(), "model-x", &NoopDriver, CancellationToken::new())
            .await
            .unwrap();

        assert!(run.cases.iter().all(|c| c.status == CaseStatus::Fail));
        // Efficiency defaults to 1 with no budgets: 30% of the points.
        assert!((run.score_percent - 30.0).abs() < 1e-6);

        let run_path = format!("bench/runs/{}", run.run_id);
        assert!(vault.exists(&format!("{}/run.json", run_path)).unwrap());
        assert!(vault
            .exists(&format!("{}/bench-{}.md", run_path, run.run_id))
            .unwrap());
        for case in &run.cases {
            let dir = format!("{}/cases/{}", run_path, case.case_id);
            assert!(vault.exists(&format!("{}/result.json", dir)).unwrap());
            assert!(vault.exists(&format!("{}/transcript.json", dir)).unwrap());
            assert!(vault.exists(&format!("{}/vault/target.md", dir)).unwrap());
        }
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_lists_every_case_as_skipped() {
        let vault = Arc::new(MemoryVault::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let run = orchestrator(vault)
            .run(&suite(), "model-x", &NoopDriver, cancel)
            .await
            .unwrap();

        assert_eq!(run.cases.len(), 2);
        assert!(run.cases.iter().all(|c| c.status == CaseStatus::Skipped));
        assert_eq!(run.total_points_earned, 0.0);
        assert_eq!(run.total_max_points, 20.0);
    }

    /// Driver that cancels the shared token while handling its first case.
    struct CancelAfterFirst;

    #[async_trait]
    impl AgentDriver for CancelAfterFirst {
        fn name(&self) -> &str {
            "cancel-after-first"
        }

        async fn run_case(
            &self,
            ctx: DriverContext,
        ) -> Result<Vec<TranscriptMessage>, DriverError> {
            ctx.cancel.cancel();
            Ok(vec![TranscriptMessage::assistant("stopping")])
        }
    }

    #[tokio::test]
    async fn test_mid_run_cancellation_skips_the_rest() {
        let vault = Arc::new(MemoryVault::new());
        let run = orchestrator(vault)
            .run(&suite(), "model-x", &CancelAfterFirst, CancellationToken::new())
            .await
            .unwrap();

        // First case completed (noop edits -> fail), second never started.
        assert_eq!(run.cases[0].status, CaseStatus::Fail);
        assert_eq!(run.cases[1].status, CaseStatus::Skipped);
    }

    /// Driver that panics on a named case, via an error return.
    struct FailingDriver;

    #[async_trait]
    impl AgentDriver for FailingDriver {
        fn name(&self) -> &str {
            "failing"
        }

        async fn run_case(
            &self,
            ctx: DriverContext,
        ) -> Result<Vec<TranscriptMessage>, DriverError> {
            if ctx.case_id == "edit-target" {
                return Err(DriverError::Failed("model unreachable".to_string()));
            }
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_case_error_does_not_abort_the_run() {
        let vault = Arc::new(MemoryVault::new());
        let run = orchestrator(vault)
            .run(&suite(), "model-x", &FailingDriver, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(run.cases[0].status, CaseStatus::Error);
        assert!(run.cases[0].errors[0].contains("model unreachable"));
        // The second case still executed and was evaluated.
        assert_eq!(run.cases[1].status, CaseStatus::Fail);
    }

    #[tokio::test]
    async fn test_event_channel_receives_case_results() {
        let vault = Arc::new(MemoryVault::new());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let suite = suite();
        let driver = OracleDriver::from_suite(&suite);

        orchestrator(vault)
            .with_events(tx)
            .run(&suite, "model-x", &driver, CancellationToken::new())
            .await
            .unwrap();

        let mut finished = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let CaseEvent::Finished(result) = event {
                finished.push(result.case_id);
            }
        }
        assert_eq!(finished, vec!["edit-target", "delete-keep"]);
    }
}
