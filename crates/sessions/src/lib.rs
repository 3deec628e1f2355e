//! Session state for one streamed generation at a time.
//!
//! [`Transcript`] owns the ordered message list, [`CorrelationTable`] routes
//! asynchronous tool results back to the call that requested them, and
//! [`SessionController`] is the single authority over the streaming state
//! machine. All three are plain single-threaded state: the controller is
//! driven from exactly one flow of control (the boundary dispatcher) and
//! performs no I/O itself.

pub mod controller;
pub mod correlation;
pub mod transcript;

pub use controller::{SessionController, SessionEvent, SessionStatus, StartGrant};
pub use correlation::CorrelationTable;
pub use transcript::{AssistantHandle, Transcript};
