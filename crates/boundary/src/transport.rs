//! Outbound delivery seam.
//!
//! The host embedding decides how serialized messages reach the panel
//! (webview post, WebSocket, in-process channel in tests). Delivery is
//! fire-and-forget from the session's point of view: a send failure is a
//! transport error reported to the caller, never retried here.

use cb_domain::error::Result;

use crate::protocol::Outbound;

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &Outbound) -> Result<()>;
}
