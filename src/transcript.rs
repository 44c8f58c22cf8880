//! Transcript wire types produced by agent drivers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single message in a case's transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    /// "user", "assistant" or "system".
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolInvocation>,
}

impl TranscriptMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Attaches a tool invocation to this message.
    pub fn with_tool_call(mut self, call: ToolInvocation) -> Self {
        self.tool_calls.push(call);
        self
    }
}

/// One tool call made by the agent.
///
/// The same invocation id may appear on several message revisions; the
/// metrics collector deduplicates by id and keeps the latest revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            result: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_timestamps(mut self, started: DateTime<Utc>, completed: DateTime<Utc>) -> Self {
        self.started_at = Some(started);
        self.completed_at = Some(completed);
        self
    }

    /// Wall-clock duration in milliseconds, when both timestamps are present.
    ///
    /// A negative interval (clock skew between revisions) yields `None`.
    pub fn duration_ms(&self) -> Option<u64> {
        let (start, end) = (self.started_at?, self.completed_at?);
        let ms = (end - start).num_milliseconds();
        u64::try_from(ms).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_duration_requires_both_timestamps() {
        let call = ToolInvocation::new("c1", "read", serde_json::json!({}));
        assert_eq!(call.duration_ms(), None);

        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = start + chrono::Duration::milliseconds(250);
        let call = call.with_timestamps(start, end);
        assert_eq!(call.duration_ms(), Some(250));
    }

    #[test]
    fn test_negative_duration_is_none() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 1).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let call =
            ToolInvocation::new("c1", "read", serde_json::json!({})).with_timestamps(start, end);
        assert_eq!(call.duration_ms(), None);
    }
}
