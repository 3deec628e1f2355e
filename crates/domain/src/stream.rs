use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::message::Message;

/// A boxed async stream, used for the upstream chunk-event sequence.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events delivered by the upstream model collaborator, in order.
///
/// The collaborator guarantees that `ToolCallStarted` precedes any
/// `ToolCallDelta` for the same id, and that `ToolCallFinished` is emitted
/// at most once per id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChunkEvent {
    /// A raw text fragment. Subject to reasoning/answer segmentation.
    #[serde(rename = "text")]
    Text { text: String },

    /// A fragment the provider already classified as reasoning.
    #[serde(rename = "reasoning")]
    Reasoning { text: String },

    /// A tool call has been announced; no arguments yet.
    #[serde(rename = "tool_call_started")]
    ToolCallStarted { call_id: String, tool_name: String },

    /// Incremental tool-call argument data. Not parseable on its own.
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta { call_id: String, delta: String },

    /// The call's argument buffer is complete.
    #[serde(rename = "tool_call_finished")]
    ToolCallFinished { call_id: String },

    /// The stream ended normally.
    #[serde(rename = "done")]
    Done { finish_reason: Option<String> },

    /// The stream ended in error. Partial output stays valid.
    #[serde(rename = "error")]
    Error { message: String },
}

/// The upstream model collaborator: produces one ordered, cancellable
/// chunk-event sequence per generation.
///
/// Implementations own the network call, retry policy, and prompt wire
/// format; the core only consumes the event sequence.
#[async_trait::async_trait]
pub trait ChatStream: Send + Sync {
    /// Open a streaming generation over the given conversation.
    ///
    /// The returned stream must stop yielding promptly once `cancel` fires;
    /// in-flight I/O may finish, but no further events are consumed.
    async fn stream_chat(
        &self,
        messages: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<ChunkEvent>>>;
}

/// The tool-execution collaborator.
///
/// Receives the fully accumulated argument buffer only after the upstream
/// stream signalled completion for the call; parsing it is this
/// collaborator's job, never the core's.
#[async_trait::async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn call(&self, name: &str, args: &str) -> Result<serde_json::Value>;
}

/// Keyed configuration lookup backing the panel's `env` request.
pub trait ConfigSource: Send + Sync {
    fn lookup(&self, key: &str) -> Option<serde_json::Value>;
}
