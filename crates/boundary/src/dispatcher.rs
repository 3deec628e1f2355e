//! The boundary dispatcher: one event loop per panel.
//!
//! Pure adaptation layer — each inbound message maps to exactly one session
//! controller call and each controller event to exactly one outbound
//! message. The loop is single-threaded and cooperative: it suspends only
//! while awaiting the next inbound message or the next upstream chunk, so
//! the controller is never re-entered concurrently and needs no locking.

use std::sync::Arc;

use cb_domain::error::{Error, Result};
use cb_domain::stream::{BoxStream, ChatStream, ChunkEvent, ConfigSource};
use cb_session::{SessionController, SessionEvent, SessionStatus};
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::protocol::{Inbound, Outbound};
use crate::transport::Transport;

type ChunkStream = BoxStream<'static, Result<ChunkEvent>>;

pub struct Dispatcher<T: Transport> {
    controller: SessionController,
    chat: Arc<dyn ChatStream>,
    config: Arc<dyn ConfigSource>,
    transport: T,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(
        controller: SessionController,
        chat: Arc<dyn ChatStream>,
        config: Arc<dyn ConfigSource>,
        transport: T,
    ) -> Self {
        Self {
            controller,
            chat,
            config,
            transport,
        }
    }

    /// Drive the session until the inbound channel closes.
    ///
    /// Tool results arrive on the same inbound channel but are independent
    /// of streaming status; they are handled as soon as received, even
    /// between chunks of an active generation.
    pub async fn run(mut self, mut inbound: mpsc::UnboundedReceiver<Inbound>) -> Result<()> {
        let mut active: Option<ChunkStream> = None;

        loop {
            tokio::select! {
                message = inbound.recv() => match message {
                    Some(message) => self.handle_inbound(message, &mut active).await?,
                    None => break,
                },
                chunk = next_chunk(active.as_mut()), if active.is_some() => {
                    match chunk {
                        Some(chunk) => {
                            let events = self.controller.handle_chunk(chunk);
                            self.forward(events).await?;
                            if self.controller.status() == SessionStatus::Ready {
                                active = None;
                            }
                        }
                        None => {
                            // Collaborator closed without a terminal event;
                            // treat it as a normal end of stream.
                            let done = Ok(ChunkEvent::Done { finish_reason: None });
                            let events = self.controller.handle_chunk(done);
                            self.forward(events).await?;
                            active = None;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_inbound(
        &mut self,
        message: Inbound,
        active: &mut Option<ChunkStream>,
    ) -> Result<()> {
        match message {
            Inbound::ChatStart { messages } => match self.controller.start(messages) {
                Ok(grant) => {
                    self.forward(grant.events).await?;
                    match self.chat.stream_chat(grant.messages, grant.token).await {
                        Ok(stream) => *active = Some(stream),
                        Err(e) => {
                            // The upstream call failed before producing any
                            // chunk; close the turn through the normal
                            // error path so partial state stays consistent.
                            let events = self.controller.handle_chunk(Err(e));
                            self.forward(events).await?;
                        }
                    }
                }
                Err(e @ Error::SessionBusy) => {
                    self.transport
                        .send(&Outbound::ChatError {
                            message: e.to_string(),
                        })
                        .await?;
                }
                Err(e) => return Err(e),
            },

            Inbound::ChatAbort => {
                let events = self.controller.cancel();
                *active = None;
                self.forward(events).await?;
            }

            Inbound::ToolResult { id, result, error } => {
                let outcome = match error {
                    Some(message) => Err(message),
                    None => Ok(result.unwrap_or(serde_json::Value::Null)),
                };
                if let Err(e) = self.controller.submit_tool_result(&id, outcome) {
                    // Protocol violation from the far side: logged and
                    // dropped, the session continues.
                    tracing::warn!(call_id = %id, error = %e, "tool result dropped");
                }
            }

            Inbound::EnvRequest { key } => {
                let value = self.config.lookup(&key);
                self.transport
                    .send(&Outbound::EnvValue { key, value })
                    .await?;
            }
        }
        Ok(())
    }

    async fn forward(&self, events: Vec<SessionEvent>) -> Result<()> {
        for event in events {
            let message = Outbound::from(event);
            if let Err(e) = self.transport.send(&message).await {
                tracing::error!(error = %e, "outbound delivery failed");
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Await the next chunk of the active stream, or park forever when there is
/// none (the select arm is disabled in that case; this keeps the future
/// constructible without unwrapping).
async fn next_chunk(stream: Option<&mut ChunkStream>) -> Option<Result<ChunkEvent>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
