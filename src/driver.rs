//! Agent driver seam.
//!
//! A driver consumes the case prompts and produces a transcript while
//! mutating the sandbox through a storage handle scoped to the active
//! root. Real model-backed drivers live outside this crate; the built-in
//! ones exist for baselines and harness self-checks.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::storage::{StorageError, VaultStorage};
use crate::suite::BenchmarkSuite;
use crate::transcript::{ToolInvocation, TranscriptMessage};

/// Everything a driver gets for one case.
pub struct DriverContext {
    pub case_id: String,
    /// Instructions, one per turn, in order.
    pub prompts: Vec<String>,
    pub model_id: String,
    /// Storage restricted to the active sandbox root.
    pub vault: Arc<dyn VaultStorage>,
    /// Cooperative cancellation; drivers should observe it mid-case.
    pub cancel: CancellationToken,
}

/// Errors from an agent driver.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Driver cancelled")]
    Cancelled,

    #[error("Driver failed: {0}")]
    Failed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Produces a transcript for a case, editing the sandbox as a side effect.
#[async_trait]
pub trait AgentDriver: Send + Sync {
    /// Human-readable driver name, used in logs.
    fn name(&self) -> &str;

    async fn run_case(&self, ctx: DriverContext) -> Result<Vec<TranscriptMessage>, DriverError>;
}

/// Driver that answers every prompt without touching the vault.
///
/// Useful as a score floor: any real agent should beat it.
#[derive(Debug, Default)]
pub struct NoopDriver;

#[async_trait]
impl AgentDriver for NoopDriver {
    fn name(&self) -> &str {
        "noop"
    }

    async fn run_case(&self, ctx: DriverContext) -> Result<Vec<TranscriptMessage>, DriverError> {
        let mut transcript = Vec::new();
        for prompt in &ctx.prompts {
            if ctx.cancel.is_cancelled() {
                return Err(DriverError::Cancelled);
            }
            transcript.push(TranscriptMessage::user(prompt.clone()));
            transcript.push(TranscriptMessage::assistant("Acknowledged."));
        }
        Ok(transcript)
    }
}

/// Driver that applies each case's expected updates verbatim.
///
/// A run with this driver must score 100% on every case; anything less
/// points at a harness bug, not an agent one.
pub struct OracleDriver {
    updates_by_case: BTreeMap<String, BTreeMap<String, Option<String>>>,
}

impl OracleDriver {
    pub fn from_suite(suite: &BenchmarkSuite) -> Self {
        Self {
            updates_by_case: suite
                .cases
                .iter()
                .map(|c| (c.id.clone(), c.expected_updates.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl AgentDriver for OracleDriver {
    fn name(&self) -> &str {
        "oracle"
    }

    async fn run_case(&self, ctx: DriverContext) -> Result<Vec<TranscriptMessage>, DriverError> {
        let updates = self
            .updates_by_case
            .get(&ctx.case_id)
            .ok_or_else(|| DriverError::Failed(format!("unknown case '{}'", ctx.case_id)))?;

        let mut transcript: Vec<TranscriptMessage> =
            ctx.prompts.iter().cloned().map(TranscriptMessage::user).collect();

        let mut reply = TranscriptMessage::assistant("Applying the requested edits.");
        for (seq, (path, update)) in updates.iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                return Err(DriverError::Cancelled);
            }
            let started = Utc::now();
            let call = match update {
                Some(content) => {
                    ctx.vault.write(path, content)?;
                    ToolInvocation::new(
                        format!("oracle-{}-{}", ctx.case_id, seq),
                        "write",
                        serde_json::json!({ "path": path, "content": content }),
                    )
                    .with_result(serde_json::json!("ok"))
                }
                None => {
                    match ctx.vault.remove(path) {
                        Ok(()) | Err(StorageError::NotFound(_)) => {}
                        Err(e) => return Err(e.into()),
                    }
                    ToolInvocation::new(
                        format!("oracle-{}-{}", ctx.case_id, seq),
                        "remove",
                        serde_json::json!({ "path": path }),
                    )
                    .with_result(serde_json::json!("ok"))
                }
            };
            reply = reply.with_tool_call(call.with_timestamps(started, Utc::now()));
        }
        transcript.push(reply);

        debug!(case_id = %ctx.case_id, edits = updates.len(), "Oracle applied expected updates");
        Ok(transcript)
    }
}
