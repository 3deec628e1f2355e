/// Shared error type used across all chatbridge crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A generation was started while one is already streaming.
    /// Recoverable: the caller cancels or waits, then retries.
    #[error("session busy: a generation is already streaming")]
    SessionBusy,

    /// A tool result referenced a call id this session never issued.
    #[error("unknown tool call: {0}")]
    UnknownCall(String),

    /// A tool result arrived for a call that was already settled.
    #[error("tool call already resolved: {0}")]
    AlreadyResolved(String),

    /// The upstream stream announced a tool call id twice.
    #[error("duplicate tool call: {0}")]
    DuplicateCall(String),

    /// A mutation targeted an assistant message that is already frozen.
    #[error("assistant message is closed")]
    AssistantClosed,

    /// A mutation required an open assistant message and there is none.
    #[error("no open assistant message")]
    NoOpenAssistant,

    /// The collaborator's chunk stream failed mid-generation.
    #[error("upstream stream: {0}")]
    Upstream(String),

    /// The boundary transport failed to deliver a message.
    #[error("transport: {0}")]
    Transport(String),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
