use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A message in the transcript (panel-agnostic).
///
/// The transcript is append-only; the only message ever mutated in place is
/// the single assistant message currently being streamed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role")]
pub enum Message {
    #[serde(rename = "user")]
    User { content: String },

    /// The assistant turn. `content` accumulates answer text, `reasoning`
    /// accumulates reasoning text, and `tool_calls` collects every tool
    /// invocation the model issued during this turn, keyed by call id.
    #[serde(rename = "assistant")]
    Assistant {
        content: String,
        reasoning: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        tool_calls: BTreeMap<String, ToolCallRecord>,
    },

    /// The outcome of one tool invocation, appended to the transcript when
    /// the tool-execution collaborator reports back.
    #[serde(rename = "tool-result")]
    ToolResult {
        call_id: String,
        name: String,
        result: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { content: text.into() }
    }

    /// An empty assistant placeholder, opened when a stream starts.
    pub fn assistant_placeholder() -> Self {
        Self::Assistant {
            content: String::new(),
            reasoning: String::new(),
            tool_calls: BTreeMap::new(),
        }
    }
}

/// One tool invocation issued by the model during an assistant turn.
///
/// `args_buffer` is the raw concatenation of argument fragments as delivered
/// by the upstream stream. It is not guaranteed to be well-formed JSON until
/// the stream signals completion for this call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub name: String,
    pub args_buffer: String,
    pub status: ToolCallStatus,
}

impl ToolCallRecord {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            args_buffer: String::new(),
            status: ToolCallStatus::PendingArgs,
        }
    }

    /// Whether this call has reached a terminal status.
    pub fn is_settled(&self) -> bool {
        matches!(
            self.status,
            ToolCallStatus::Resolved | ToolCallStatus::Failed
        )
    }
}

/// Lifecycle of a tool call, from first announcement to settled result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolCallStatus {
    /// Announced; argument fragments still arriving.
    PendingArgs,
    /// Arguments complete and frozen; awaiting the execution result.
    PendingResult,
    Resolved,
    Failed,
}
