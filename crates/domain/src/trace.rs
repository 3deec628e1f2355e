use serde::Serialize;

/// Structured trace events emitted across all chatbridge crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    StreamStarted {
        session_id: String,
        prior_messages: usize,
    },
    StreamFinished {
        session_id: String,
        answer_chars: usize,
        reasoning_chars: usize,
        tool_calls: usize,
    },
    StreamErrored {
        session_id: String,
        message: String,
    },
    /// The segmenter crossed from reasoning to answer.
    PhaseTransition {
        fragments_seen: usize,
    },
    /// The stream ended without the closing marker ever appearing;
    /// the whole output was classified as reasoning.
    MarkerAbsent {
        reasoning_chars: usize,
    },
    ToolCallRegistered {
        call_id: String,
        tool_name: String,
    },
    ToolCallResolved {
        call_id: String,
        is_error: bool,
    },
    /// An argument fragment arrived for a call id the transcript does not
    /// know. Dropped, not fatal.
    ToolCallOrphanFragment {
        call_id: String,
    },
    SessionCancelled {
        session_id: String,
        pending_calls: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "cb_event");
    }
}
