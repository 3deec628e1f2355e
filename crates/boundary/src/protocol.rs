//! Boundary message envelopes.
//!
//! Every message is `{ "command": …, "payload": … }` in both directions.
//! The enums are closed: an unknown command is a deserialization error at
//! the boundary, never a silently ignored message.

use cb_domain::message::Message;
use cb_session::SessionEvent;
use serde::{Deserialize, Serialize};

/// Panel → host requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload")]
pub enum Inbound {
    /// Begin a generation over the panel's full message list.
    #[serde(rename = "chat.start")]
    ChatStart { messages: Vec<Message> },

    /// Cancel the in-flight generation, if any.
    #[serde(rename = "chat.abort")]
    ChatAbort,

    /// Result (or error) of a tool call the panel executed.
    #[serde(rename = "toolcall")]
    ToolResult {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Keyed configuration lookup.
    #[serde(rename = "env")]
    EnvRequest { key: String },
}

/// Host → panel notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload")]
pub enum Outbound {
    #[serde(rename = "chat.started")]
    ChatStarted,

    #[serde(rename = "chat.delta")]
    ChatDelta(Delta),

    #[serde(rename = "chat.finish")]
    ChatFinish,

    #[serde(rename = "chat.error")]
    ChatError { message: String },

    #[serde(rename = "env")]
    EnvValue {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<serde_json::Value>,
    },
}

/// One streamed increment of the assistant turn.
///
/// Replaying deltas in delivery order reconstructs the transcript state;
/// `tool-input-final` supersedes every prior `tool-input-delta` for its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Delta {
    #[serde(rename = "reasoning-delta")]
    Reasoning { text: String },

    #[serde(rename = "text-delta")]
    Text { text: String },

    #[serde(rename = "tool-input-start")]
    ToolInputStart { id: String, name: String },

    /// Incremental argument text. Not guaranteed parseable on its own.
    #[serde(rename = "tool-input-delta")]
    ToolInputDelta { id: String, delta: String },

    /// The full accumulated argument buffer for the call.
    #[serde(rename = "tool-input-final")]
    ToolInputFinal { id: String, args: String },
}

impl From<SessionEvent> for Outbound {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Started => Outbound::ChatStarted,
            SessionEvent::ReasoningDelta { text } => Outbound::ChatDelta(Delta::Reasoning { text }),
            SessionEvent::AnswerDelta { text } => Outbound::ChatDelta(Delta::Text { text }),
            SessionEvent::ToolCallStarted { call_id, name } => {
                Outbound::ChatDelta(Delta::ToolInputStart { id: call_id, name })
            }
            SessionEvent::ToolCallArgsDelta { call_id, delta } => {
                Outbound::ChatDelta(Delta::ToolInputDelta { id: call_id, delta })
            }
            SessionEvent::ToolCallArgsFinal { call_id, args } => {
                Outbound::ChatDelta(Delta::ToolInputFinal { id: call_id, args })
            }
            SessionEvent::Finished => Outbound::ChatFinish,
            SessionEvent::Errored { message } => Outbound::ChatError { message },
        }
    }
}
