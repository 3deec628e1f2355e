//! Shared domain types for the chatbridge workspace.
//!
//! Everything that crosses a crate boundary lives here: the transcript
//! message model, the upstream chunk-event contract, the collaborator
//! traits, the shared error type, configuration, and trace events.

pub mod config;
pub mod error;
pub mod message;
pub mod stream;
pub mod trace;
