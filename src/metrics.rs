//! Deterministic performance signals extracted from a case transcript.
//!
//! Every field of [`CaseMetrics`] is an explicit `Option`: `None` means
//! "not measured", which is distinct from a measured zero. A failure in
//! one extractor never blocks the others.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::transcript::{ToolInvocation, TranscriptMessage};

/// Performance signals for one case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseMetrics {
    /// Distinct tool invocations (deduplicated by invocation id).
    pub tool_calls: Option<u64>,
    #[serde(default)]
    pub tool_calls_by_name: BTreeMap<String, u64>,
    /// Wall-clock case duration; filled in by the orchestrator.
    pub wall_time_ms: Option<u64>,
    /// Summed tool execution time across calls with both timestamps.
    pub tool_time_ms: Option<u64>,
    pub estimated_tokens: Option<u64>,
    /// Advisory character volume read through recognized tools.
    pub chars_read: Option<u64>,
    /// Advisory character volume written through recognized tools.
    pub chars_written: Option<u64>,
}

/// A single metric field failed to extract.
#[derive(Debug, Error)]
#[error("Failed to extract {field}: {reason}")]
pub struct ExtractionError {
    pub field: &'static str,
    pub reason: String,
}

/// Character volume a tool invocation contributed.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeContribution {
    pub read: u64,
    pub written: u64,
}

/// Typed extractor for a known tool name. `None` means no contribution.
pub type VolumeExtractor = fn(&ToolInvocation) -> Option<VolumeContribution>;

fn text_len(value: &serde_json::Value) -> u64 {
    match value {
        serde_json::Value::String(s) => s.chars().count() as u64,
        serde_json::Value::Null => 0,
        other => serde_json::to_string(other)
            .map(|s| s.chars().count() as u64)
            .unwrap_or(0),
    }
}

fn read_volume(call: &ToolInvocation) -> Option<VolumeContribution> {
    let result = call.result.as_ref()?;
    Some(VolumeContribution {
        read: text_len(result),
        written: 0,
    })
}

fn write_volume(call: &ToolInvocation) -> Option<VolumeContribution> {
    let content = call.arguments.get("content")?;
    Some(VolumeContribution {
        read: 0,
        written: text_len(content),
    })
}

/// Registry of tool-name -> volume extractor.
///
/// Unknown tool names resolve to no contribution rather than an error;
/// the resulting volumes are advisory, not authoritative.
pub struct VolumeRegistry {
    extractors: BTreeMap<&'static str, VolumeExtractor>,
}

impl VolumeRegistry {
    pub fn empty() -> Self {
        Self {
            extractors: BTreeMap::new(),
        }
    }

    /// Registry covering the built-in vault tool names.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for name in ["read", "read_file", "list", "list_files"] {
            registry.register(name, read_volume);
        }
        for name in ["write", "write_file", "append", "append_file"] {
            registry.register(name, write_volume);
        }
        registry
    }

    pub fn register(&mut self, name: &'static str, extractor: VolumeExtractor) {
        self.extractors.insert(name, extractor);
    }

    pub fn contribution(&self, call: &ToolInvocation) -> Option<VolumeContribution> {
        self.extractors.get(call.name.as_str())?(call)
    }
}

impl Default for VolumeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Token-count estimation over a full transcript.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, messages: &[TranscriptMessage]) -> Result<u64, ExtractionError>;
}

/// Rough chars-per-token heuristic estimator.
#[derive(Debug, Clone)]
pub struct HeuristicTokenEstimator {
    chars_per_token: u64,
}

impl Default for HeuristicTokenEstimator {
    fn default() -> Self {
        Self { chars_per_token: 4 }
    }
}

impl TokenEstimator for HeuristicTokenEstimator {
    fn estimate(&self, messages: &[TranscriptMessage]) -> Result<u64, ExtractionError> {
        let mut chars: u64 = 0;
        for message in messages {
            chars += message.content.chars().count() as u64;
            for call in &message.tool_calls {
                chars += text_len(&call.arguments);
                if let Some(result) = &call.result {
                    chars += text_len(result);
                }
            }
        }
        Ok(chars / self.chars_per_token.max(1))
    }
}

/// Extracts [`CaseMetrics`] from a transcript.
pub struct MetricsCollector {
    volumes: VolumeRegistry,
    tokens: Arc<dyn TokenEstimator>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            volumes: VolumeRegistry::standard(),
            tokens: Arc::new(HeuristicTokenEstimator::default()),
        }
    }
}

impl MetricsCollector {
    pub fn new(volumes: VolumeRegistry, tokens: Arc<dyn TokenEstimator>) -> Self {
        Self { volumes, tokens }
    }

    /// Computes all metrics, field by field. Extraction failures are
    /// logged and leave the field unset.
    pub fn collect(&self, messages: &[TranscriptMessage]) -> CaseMetrics {
        let calls = dedupe_calls(messages);

        let mut metrics = CaseMetrics {
            tool_calls: Some(calls.len() as u64),
            ..Default::default()
        };
        for call in &calls {
            *metrics.tool_calls_by_name.entry(call.name.clone()).or_insert(0) += 1;
        }

        metrics.tool_time_ms = record("tool_time_ms", tool_time(&calls));
        metrics.estimated_tokens = record("estimated_tokens", self.tokens.estimate(messages));

        let mut read: u64 = 0;
        let mut written: u64 = 0;
        for call in &calls {
            if let Some(volume) = self.volumes.contribution(call) {
                read += volume.read;
                written += volume.written;
            }
        }
        metrics.chars_read = Some(read);
        metrics.chars_written = Some(written);

        metrics
    }
}

fn record<T>(field: &'static str, result: Result<T, ExtractionError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(field, error = %e, "Metric extraction failed");
            None
        }
    }
}

/// Keeps the latest revision of each invocation id, preserving first-seen order.
fn dedupe_calls(messages: &[TranscriptMessage]) -> Vec<ToolInvocation> {
    let mut order: Vec<String> = Vec::new();
    let mut by_id: BTreeMap<String, ToolInvocation> = BTreeMap::new();
    for message in messages {
        for call in &message.tool_calls {
            if !by_id.contains_key(&call.id) {
                order.push(call.id.clone());
            }
            by_id.insert(call.id.clone(), call.clone());
        }
    }
    order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect()
}

fn tool_time(calls: &[ToolInvocation]) -> Result<u64, ExtractionError> {
    let mut total: u64 = 0;
    let mut skewed = 0usize;
    for call in calls {
        if call.started_at.is_some() && call.completed_at.is_some() {
            match call.duration_ms() {
                Some(ms) => total += ms,
                // Both timestamps present but end precedes start.
                None => skewed += 1,
            }
        }
    }
    if skewed > 0 {
        return Err(ExtractionError {
            field: "tool_time_ms",
            reason: format!("{} call(s) with end before start", skewed),
        });
    }
    Ok(total)
}
