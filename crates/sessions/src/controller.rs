//! The session controller: single authority over one streaming generation.
//!
//! All methods are synchronous state transitions that return the outbound
//! notifications they produced; the boundary dispatcher owns every await
//! point. This keeps the state machine testable without a runtime and makes
//! the ordering guarantee trivial: deltas are returned in the order their
//! transcript mutations were applied.

use cb_domain::config::SegmentationConfig;
use cb_domain::error::{Error, Result};
use cb_domain::message::Message;
use cb_domain::stream::ChunkEvent;
use cb_domain::trace::TraceEvent;
use cb_segment::{Phase, Segmenter};
use tokio_util::sync::CancellationToken;

use crate::correlation::CorrelationTable;
use crate::transcript::{AssistantHandle, Transcript};

/// Session streaming status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Ready,
    Streaming,
    /// Cancellation requested; the token has fired but the stream has not
    /// been torn down yet.
    Cancelling,
}

/// Typed internal events produced by the controller, each mapping to exactly
/// one outbound boundary message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Started,
    ReasoningDelta { text: String },
    AnswerDelta { text: String },
    ToolCallStarted { call_id: String, name: String },
    ToolCallArgsDelta { call_id: String, delta: String },
    /// Carries the full accumulated argument buffer, semantically replacing
    /// every prior args delta for this call.
    ToolCallArgsFinal { call_id: String, args: String },
    Finished,
    Errored { message: String },
}

/// Everything `start` hands the caller: the token to propagate into the
/// collaborator's network call and the conversation to send upstream.
pub struct StartGrant {
    pub token: CancellationToken,
    pub messages: Vec<Message>,
    pub events: Vec<SessionEvent>,
}

pub struct SessionController {
    session_id: String,
    segmentation: SegmentationConfig,
    status: SessionStatus,
    transcript: Transcript,
    correlation: CorrelationTable,
    segmenter: Option<Segmenter>,
    open: Option<AssistantHandle>,
    cancel: Option<CancellationToken>,
}

impl SessionController {
    pub fn new(segmentation: SegmentationConfig) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            segmentation,
            status: SessionStatus::Ready,
            transcript: Transcript::new(),
            correlation: CorrelationTable::new(),
            segmenter: None,
            open: None,
            cancel: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Begin one streaming generation over the conversation the panel sent.
    ///
    /// The panel replays its full message list on every start; any tail the
    /// transcript does not hold yet (normally the one new user message) is
    /// appended first. Rejected with [`Error::SessionBusy`] while a
    /// generation is in flight: callers cancel first, nothing is queued.
    pub fn start(&mut self, prior: Vec<Message>) -> Result<StartGrant> {
        if self.status != SessionStatus::Ready {
            return Err(Error::SessionBusy);
        }

        let have = self.transcript.len();
        for message in prior.iter().skip(have) {
            self.transcript.append_history(message.clone())?;
        }

        let handle = self.transcript.open_assistant()?;
        self.open = Some(handle);
        self.segmenter = Some(Segmenter::new(&self.segmentation));
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        self.status = SessionStatus::Streaming;

        TraceEvent::StreamStarted {
            session_id: self.session_id.clone(),
            prior_messages: prior.len(),
        }
        .emit();

        Ok(StartGrant {
            token,
            messages: prior,
            events: vec![SessionEvent::Started],
        })
    }

    /// Apply one upstream chunk event, in delivery order.
    pub fn handle_chunk(&mut self, chunk: Result<ChunkEvent>) -> Vec<SessionEvent> {
        if self.status != SessionStatus::Streaming {
            tracing::warn!(status = ?self.status, "chunk outside streaming; dropped");
            return Vec::new();
        }
        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            // The token has fired: no further transcript mutations.
            return Vec::new();
        }

        let event = match chunk {
            Ok(event) => event,
            Err(e) => return self.finish_stream(Some(e.to_string())),
        };

        match event {
            ChunkEvent::Text { text } => self.on_text(&text),
            ChunkEvent::Reasoning { text } => self.on_reasoning(&text),
            ChunkEvent::ToolCallStarted { call_id, tool_name } => {
                self.on_tool_start(&call_id, &tool_name)
            }
            ChunkEvent::ToolCallDelta { call_id, delta } => self.on_tool_delta(&call_id, &delta),
            ChunkEvent::ToolCallFinished { call_id } => self.on_tool_finished(&call_id),
            ChunkEvent::Done { .. } => self.finish_stream(None),
            ChunkEvent::Error { message } => self.finish_stream(Some(message)),
        }
    }

    /// Cooperatively cancel the in-flight generation.
    ///
    /// No-op unless streaming. The assistant message is closed with whatever
    /// partial content it holds; still-pending tool calls are failed with a
    /// cancelled reason rather than dropped.
    pub fn cancel(&mut self) -> Vec<SessionEvent> {
        if self.status != SessionStatus::Streaming {
            tracing::debug!("no active stream to cancel");
            return Vec::new();
        }
        self.status = SessionStatus::Cancelling;
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }

        // Flush withheld segmenter text so the partial message is complete
        // up to the moment of cancellation.
        let mut events = Vec::new();
        if let Some(mut segmenter) = self.segmenter.take() {
            let report = segmenter.finish();
            events.extend(self.apply_emissions(report.emissions));
        }

        let pending = self.correlation.drain();
        let pending_count = pending.len();
        for (call_id, message_index) in pending {
            let outcome = self.transcript.settle_tool_call(
                message_index,
                &call_id,
                serde_json::json!({ "reason": "cancelled" }),
                true,
            );
            if let Err(e) = outcome {
                tracing::warn!(call_id = %call_id, error = %e, "failed to cancel pending call");
            }
        }

        if let Some(handle) = self.open.take() {
            let _ = self.transcript.close_assistant(handle);
        }
        self.status = SessionStatus::Ready;

        TraceEvent::SessionCancelled {
            session_id: self.session_id.clone(),
            pending_calls: pending_count,
        }
        .emit();

        events
    }

    /// Route a tool result to the pending call that requested it.
    ///
    /// Deliberately independent of streaming status: a result may arrive
    /// after the stream that requested it already finished and still lands
    /// in the transcript. Protocol violations (unknown id, double result)
    /// are returned for the caller to log; the transcript is untouched.
    pub fn submit_tool_result(
        &mut self,
        call_id: &str,
        outcome: std::result::Result<serde_json::Value, String>,
    ) -> Result<()> {
        let message_index = match self.correlation.lookup(call_id) {
            Ok(index) => index,
            Err(_) => {
                // Distinguish a double result from a never-issued id.
                use cb_domain::message::ToolCallStatus::{Failed, Resolved};
                return match self.transcript.tool_call_status(call_id) {
                    Some(Resolved | Failed) => Err(Error::AlreadyResolved(call_id.to_string())),
                    _ => Err(Error::UnknownCall(call_id.to_string())),
                };
            }
        };

        let (result, is_error) = match outcome {
            Ok(value) => (value, false),
            Err(message) => (serde_json::json!({ "error": message }), true),
        };
        self.transcript
            .settle_tool_call(message_index, call_id, result, is_error)?;
        self.correlation.remove(call_id);
        Ok(())
    }

    // ── Chunk handlers ────────────────────────────────────────────────

    fn on_text(&mut self, text: &str) -> Vec<SessionEvent> {
        let emissions = match self.segmenter.as_mut() {
            Some(segmenter) => segmenter.feed(text),
            None => vec![(Phase::Answer, text.to_string())],
        };
        self.apply_emissions(emissions)
    }

    fn on_reasoning(&mut self, text: &str) -> Vec<SessionEvent> {
        // Provider-native reasoning arrives pre-classified and bypasses the
        // marker detector.
        self.apply_emissions(vec![(Phase::Reasoning, text.to_string())])
    }

    fn on_tool_start(&mut self, call_id: &str, name: &str) -> Vec<SessionEvent> {
        let Some(handle) = self.open else {
            return Vec::new();
        };
        if let Err(e) = self.transcript.begin_tool_call(handle, call_id, name) {
            tracing::warn!(call_id = call_id, error = %e, "tool call rejected; stream continues");
            return Vec::new();
        }
        if let Err(e) = self.correlation.register(call_id, handle.index()) {
            tracing::warn!(call_id = call_id, error = %e, "correlation rejected");
        }
        TraceEvent::ToolCallRegistered {
            call_id: call_id.to_string(),
            tool_name: name.to_string(),
        }
        .emit();
        vec![SessionEvent::ToolCallStarted {
            call_id: call_id.to_string(),
            name: name.to_string(),
        }]
    }

    fn on_tool_delta(&mut self, call_id: &str, delta: &str) -> Vec<SessionEvent> {
        let Some(handle) = self.open else {
            return Vec::new();
        };
        match self.transcript.append_tool_args(handle, call_id, delta) {
            Ok(true) => vec![SessionEvent::ToolCallArgsDelta {
                call_id: call_id.to_string(),
                delta: delta.to_string(),
            }],
            Ok(false) => Vec::new(),
            Err(e) => {
                tracing::warn!(call_id = call_id, error = %e, "args fragment dropped");
                Vec::new()
            }
        }
    }

    fn on_tool_finished(&mut self, call_id: &str) -> Vec<SessionEvent> {
        let Some(handle) = self.open else {
            return Vec::new();
        };
        match self.transcript.complete_tool_call(handle, call_id) {
            Ok(args) => vec![SessionEvent::ToolCallArgsFinal {
                call_id: call_id.to_string(),
                args,
            }],
            Err(e) => {
                tracing::warn!(call_id = call_id, error = %e, "completion for unknown call");
                Vec::new()
            }
        }
    }

    /// Common teardown for stream end and stream error. Partial content is
    /// preserved either way; only the far side's closing notification
    /// differs.
    fn finish_stream(&mut self, error: Option<String>) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        if let Some(mut segmenter) = self.segmenter.take() {
            let report = segmenter.finish();
            events.extend(self.apply_emissions(report.emissions));
        }

        let closed_index = self.open.map(|h| h.index());
        if let Some(handle) = self.open.take() {
            let _ = self.transcript.close_assistant(handle);
        }
        self.cancel = None;
        self.status = SessionStatus::Ready;

        match error {
            Some(message) => {
                TraceEvent::StreamErrored {
                    session_id: self.session_id.clone(),
                    message: message.clone(),
                }
                .emit();
                events.push(SessionEvent::Errored { message });
            }
            None => {
                let (answer_chars, reasoning_chars, tool_calls) = closed_index
                    .map(|i| self.transcript.assistant_summary(i))
                    .unwrap_or_default();
                TraceEvent::StreamFinished {
                    session_id: self.session_id.clone(),
                    answer_chars,
                    reasoning_chars,
                    tool_calls,
                }
                .emit();
                events.push(SessionEvent::Finished);
            }
        }
        events
    }

    fn apply_emissions(&mut self, emissions: Vec<(Phase, String)>) -> Vec<SessionEvent> {
        let Some(handle) = self.open else {
            return Vec::new();
        };
        let mut events = Vec::new();
        for (phase, text) in emissions {
            let applied = match phase {
                Phase::Reasoning => self
                    .transcript
                    .append_reasoning(handle, &text)
                    .map(|_| SessionEvent::ReasoningDelta { text }),
                Phase::Answer => self
                    .transcript
                    .append_answer(handle, &text)
                    .map(|_| SessionEvent::AnswerDelta { text }),
            };
            match applied {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!(error = %e, "delta dropped"),
            }
        }
        events
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
