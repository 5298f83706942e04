//! Rendering agent history into gateway messages.

use serde_json::Value;
use switchyard_core::{Message, Role, ToolCall, ToolCallResult};

use crate::state::HistoryEntry;

/// Convert history into the message list sent to the model.
///
/// Vendors that pair tool calls with results reject a call followed by a
/// plain user message, so a corrective message that follows an unanswered
/// call is sent as that call's result instead. The stored history is not
/// touched. Empty assistant turns are left out, since vendors reject
/// empty text blocks.
pub fn to_messages(history: &[HistoryEntry]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len());
    let mut pending: Option<&ToolCall> = None;

    for entry in history {
        match entry {
            HistoryEntry::Message(msg) if is_empty_reply(msg) => {}
            HistoryEntry::Message(msg) => match pending.take() {
                Some(call) if msg.role == Role::User => {
                    let result = ToolCallResult::for_call(call, Value::String(msg.text()));
                    messages.push(Message::tool_result(result));
                }
                _ => messages.push(msg.clone()),
            },
            HistoryEntry::ToolCall(call) => {
                messages.push(Message::assistant_tool_call(call.clone()));
                pending = Some(call);
            }
            HistoryEntry::ToolCallResult(result) => {
                messages.push(Message::tool_result(result.clone()));
                pending = None;
            }
        }
    }
    messages
}

fn is_empty_reply(msg: &Message) -> bool {
    msg.role == Role::Assistant && msg.tool_calls().is_empty() && msg.text().trim().is_empty()
}
