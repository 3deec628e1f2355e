//! In-memory, append-only transcript with one mutable assistant message.
//!
//! Messages are never deleted or reordered within a session. The only
//! message ever mutated is the assistant message currently being streamed,
//! reached through an [`AssistantHandle`]; once that message is closed the
//! handle goes stale and further mutation through it fails.

use cb_domain::error::{Error, Result};
use cb_domain::message::{Message, ToolCallRecord, ToolCallStatus};
use cb_domain::trace::TraceEvent;

/// Opaque handle to the currently open assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssistantHandle(usize);

impl AssistantHandle {
    /// Position of the assistant message in the transcript. Used as the
    /// correlation target for tool calls issued during this turn.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// The ordered message list for one session.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    open: Option<usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether an assistant message is currently open for mutation.
    pub fn has_open_assistant(&self) -> bool {
        self.open.is_some()
    }

    /// Append a user message. Rejected while a stream is open.
    pub fn append_user(&mut self, text: impl Into<String>) -> Result<()> {
        if self.open.is_some() {
            return Err(Error::SessionBusy);
        }
        self.messages.push(Message::user(text));
        Ok(())
    }

    /// Append an already-formed message (history replayed by the panel at
    /// stream start). Rejected while a stream is open.
    pub fn append_history(&mut self, message: Message) -> Result<()> {
        if self.open.is_some() {
            return Err(Error::SessionBusy);
        }
        self.messages.push(message);
        Ok(())
    }

    /// Open a new empty assistant message for streaming.
    pub fn open_assistant(&mut self) -> Result<AssistantHandle> {
        if self.open.is_some() {
            return Err(Error::SessionBusy);
        }
        self.messages.push(Message::assistant_placeholder());
        let idx = self.messages.len() - 1;
        self.open = Some(idx);
        Ok(AssistantHandle(idx))
    }

    pub fn append_reasoning(&mut self, handle: AssistantHandle, text: &str) -> Result<()> {
        let (_, reasoning, _) = self.open_fields(handle)?;
        reasoning.push_str(text);
        Ok(())
    }

    pub fn append_answer(&mut self, handle: AssistantHandle, text: &str) -> Result<()> {
        let (content, _, _) = self.open_fields(handle)?;
        content.push_str(text);
        Ok(())
    }

    /// Record a newly announced tool call, with no arguments yet.
    pub fn begin_tool_call(
        &mut self,
        handle: AssistantHandle,
        call_id: &str,
        name: &str,
    ) -> Result<()> {
        let (_, _, tool_calls) = self.open_fields(handle)?;
        if tool_calls.contains_key(call_id) {
            return Err(Error::DuplicateCall(call_id.to_string()));
        }
        tool_calls.insert(call_id.to_string(), ToolCallRecord::new(call_id, name));
        Ok(())
    }

    /// Concatenate one argument fragment into a pending call's buffer.
    ///
    /// Unknown ids and already-completed calls are logged and skipped, not
    /// fatal: a completion can race a late fragment upstream. Returns
    /// whether the fragment was applied.
    pub fn append_tool_args(
        &mut self,
        handle: AssistantHandle,
        call_id: &str,
        fragment: &str,
    ) -> Result<bool> {
        let (_, _, tool_calls) = self.open_fields(handle)?;
        match tool_calls.get_mut(call_id) {
            Some(record) if record.status == ToolCallStatus::PendingArgs => {
                record.args_buffer.push_str(fragment);
                Ok(true)
            }
            Some(record) => {
                tracing::warn!(
                    call_id = call_id,
                    status = ?record.status,
                    "argument fragment after completion; dropped"
                );
                Ok(false)
            }
            None => {
                TraceEvent::ToolCallOrphanFragment {
                    call_id: call_id.to_string(),
                }
                .emit();
                Ok(false)
            }
        }
    }

    /// Freeze a call's argument buffer and return the full accumulated
    /// string for the args-final notification.
    pub fn complete_tool_call(
        &mut self,
        handle: AssistantHandle,
        call_id: &str,
    ) -> Result<String> {
        let (_, _, tool_calls) = self.open_fields(handle)?;
        let record = tool_calls
            .get_mut(call_id)
            .ok_or_else(|| Error::UnknownCall(call_id.to_string()))?;
        record.status = ToolCallStatus::PendingResult;
        Ok(record.args_buffer.clone())
    }

    /// Settle a tool call with its result (or error), appending a
    /// tool-result message to the transcript.
    ///
    /// Addresses the assistant message by position rather than handle: a
    /// result may arrive long after the message was closed and must still
    /// land in the transcript. Only the record's status changes; the frozen
    /// text content is untouched.
    pub fn settle_tool_call(
        &mut self,
        message_index: usize,
        call_id: &str,
        result: serde_json::Value,
        is_error: bool,
    ) -> Result<()> {
        let name = {
            let record = self
                .tool_call_mut(message_index, call_id)
                .ok_or_else(|| Error::UnknownCall(call_id.to_string()))?;
            if record.is_settled() {
                return Err(Error::AlreadyResolved(call_id.to_string()));
            }
            record.status = if is_error {
                ToolCallStatus::Failed
            } else {
                ToolCallStatus::Resolved
            };
            record.name.clone()
        };

        self.messages.push(Message::ToolResult {
            call_id: call_id.to_string(),
            name,
            result,
            is_error,
        });
        TraceEvent::ToolCallResolved {
            call_id: call_id.to_string(),
            is_error,
        }
        .emit();
        Ok(())
    }

    /// Freeze the open assistant message. Subsequent mutation through the
    /// handle fails.
    pub fn close_assistant(&mut self, handle: AssistantHandle) -> Result<()> {
        if self.open != Some(handle.0) {
            return Err(Error::AssistantClosed);
        }
        self.open = None;
        Ok(())
    }

    /// Status of a tool call anywhere in the transcript, if known.
    pub fn tool_call_status(&self, call_id: &str) -> Option<ToolCallStatus> {
        self.messages.iter().rev().find_map(|m| match m {
            Message::Assistant { tool_calls, .. } => {
                tool_calls.get(call_id).map(|r| r.status)
            }
            _ => None,
        })
    }

    /// Accumulated sizes of the assistant message at `index`:
    /// (answer chars, reasoning chars, tool call count).
    pub fn assistant_summary(&self, index: usize) -> (usize, usize, usize) {
        match self.messages.get(index) {
            Some(Message::Assistant {
                content,
                reasoning,
                tool_calls,
            }) => (content.len(), reasoning.len(), tool_calls.len()),
            _ => (0, 0, 0),
        }
    }

    // ── Private helpers ───────────────────────────────────────────────

    fn open_fields(
        &mut self,
        handle: AssistantHandle,
    ) -> Result<(
        &mut String,
        &mut String,
        &mut std::collections::BTreeMap<String, ToolCallRecord>,
    )> {
        if self.open != Some(handle.0) {
            return Err(Error::AssistantClosed);
        }
        match &mut self.messages[handle.0] {
            Message::Assistant {
                content,
                reasoning,
                tool_calls,
            } => Ok((content, reasoning, tool_calls)),
            _ => Err(Error::NoOpenAssistant),
        }
    }

    fn tool_call_mut(
        &mut self,
        message_index: usize,
        call_id: &str,
    ) -> Option<&mut ToolCallRecord> {
        match self.messages.get_mut(message_index) {
            Some(Message::Assistant { tool_calls, .. }) => tool_calls.get_mut(call_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_append_rejected_while_streaming() {
        let mut t = Transcript::new();
        t.append_user("hi").unwrap();
        let _h = t.open_assistant().unwrap();
        assert!(matches!(t.append_user("again"), Err(Error::SessionBusy)));
    }

    #[test]
    fn single_open_assistant() {
        let mut t = Transcript::new();
        let h = t.open_assistant().unwrap();
        assert!(matches!(t.open_assistant(), Err(Error::SessionBusy)));
        t.close_assistant(h).unwrap();
        t.open_assistant().unwrap();
    }

    #[test]
    fn closed_handle_goes_stale() {
        let mut t = Transcript::new();
        let h = t.open_assistant().unwrap();
        t.append_answer(h, "partial").unwrap();
        t.close_assistant(h).unwrap();
        assert!(matches!(t.append_answer(h, "late"), Err(Error::AssistantClosed)));
        assert!(matches!(t.close_assistant(h), Err(Error::AssistantClosed)));
    }

    #[test]
    fn tool_args_accumulate_and_freeze() {
        let mut t = Transcript::new();
        let h = t.open_assistant().unwrap();
        t.begin_tool_call(h, "c1", "read_file").unwrap();
        assert!(t.append_tool_args(h, "c1", "{\"a\":").unwrap());
        assert!(t.append_tool_args(h, "c1", "1}").unwrap());
        let args = t.complete_tool_call(h, "c1").unwrap();
        assert_eq!(args, "{\"a\":1}");
        // Late fragment after completion is dropped, not an error.
        assert!(!t.append_tool_args(h, "c1", "x").unwrap());
        assert_eq!(t.complete_tool_call(h, "c1").unwrap(), "{\"a\":1}");
    }

    #[test]
    fn duplicate_call_id_rejected() {
        let mut t = Transcript::new();
        let h = t.open_assistant().unwrap();
        t.begin_tool_call(h, "c1", "read_file").unwrap();
        assert!(matches!(
            t.begin_tool_call(h, "c1", "read_file"),
            Err(Error::DuplicateCall(_))
        ));
    }

    #[test]
    fn unknown_fragment_is_logged_noop() {
        let mut t = Transcript::new();
        let h = t.open_assistant().unwrap();
        assert!(!t.append_tool_args(h, "ghost", "{}").unwrap());
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn settle_works_after_close() {
        let mut t = Transcript::new();
        let h = t.open_assistant().unwrap();
        t.begin_tool_call(h, "c1", "read_file").unwrap();
        t.complete_tool_call(h, "c1").unwrap();
        t.close_assistant(h).unwrap();

        t.settle_tool_call(h.index(), "c1", serde_json::json!({"ok": true}), false)
            .unwrap();
        assert_eq!(t.tool_call_status("c1"), Some(ToolCallStatus::Resolved));
        assert!(matches!(
            t.messages().last(),
            Some(Message::ToolResult { is_error: false, .. })
        ));
    }

    #[test]
    fn settle_twice_is_already_resolved() {
        let mut t = Transcript::new();
        let h = t.open_assistant().unwrap();
        t.begin_tool_call(h, "c1", "read_file").unwrap();
        t.settle_tool_call(h.index(), "c1", serde_json::json!(1), false)
            .unwrap();
        assert!(matches!(
            t.settle_tool_call(h.index(), "c1", serde_json::json!(2), false),
            Err(Error::AlreadyResolved(_))
        ));
        // Exactly one tool-result message was appended.
        let results = t
            .messages()
            .iter()
            .filter(|m| matches!(m, Message::ToolResult { .. }))
            .count();
        assert_eq!(results, 1);
    }
}
