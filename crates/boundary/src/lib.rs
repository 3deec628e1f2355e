//! The serialization frontier between the host core and the sandboxed panel.
//!
//! Only the tagged messages in [`protocol`] cross the boundary; the
//! [`dispatcher`] translates them 1:1 to and from session-controller calls
//! and owns the single event loop that drives a generation.

pub mod dispatcher;
pub mod protocol;
pub mod transport;

pub use dispatcher::Dispatcher;
pub use protocol::{Delta, Inbound, Outbound};
pub use transport::Transport;
