//! Transcript assembler — folds the raw turn log back into the message
//! sequence the chat-completion service accepts.
//!
//! Contiguous `tool_call` rows (only text rows break a run) become a single
//! assistant message with a `tool_calls` list, each call immediately followed
//! by its `tool` message. Deterministic: the same rows always produce the
//! same messages.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use magpie_store::{MessageType, Role, Turn};

use crate::provider::{AssembledMessage, ChatRole, FunctionPayload, ToolCallPayload};

/// Synthesised response text for a call whose response row is missing, so
/// the model input stays well-formed.
pub const NO_RESPONSE_PLACEHOLDER: &str = "<no response recorded>";

fn chat_role(role: Role) -> ChatRole {
    match role {
        Role::User => ChatRole::User,
        Role::Assistant => ChatRole::Assistant,
        Role::Tool => ChatRole::Tool,
    }
}

/// Fold chronologically ordered turns into assembled messages.
pub fn assemble(turns: &[Turn]) -> Vec<AssembledMessage> {
    // Index responses by call id; first occurrence wins.
    let mut responses: HashMap<&str, &Turn> = HashMap::new();
    for turn in turns {
        if turn.message_type == MessageType::ToolResponse {
            if let Some(id) = turn.tool_call_id.as_deref() {
                responses.entry(id).or_insert(turn);
            }
        }
    }

    let mut messages = Vec::new();
    let mut batch: Vec<&Turn> = Vec::new();
    let mut consumed: HashSet<&str> = HashSet::new();

    for turn in turns {
        match turn.message_type {
            MessageType::Text => {
                flush_batch(&mut messages, &mut batch, &responses, &mut consumed);
                messages.push(AssembledMessage::text(
                    chat_role(turn.role),
                    turn.content.clone(),
                ));
            }
            MessageType::ToolCall => batch.push(turn),
            // Attached to its call's batch via the index; never standalone.
            MessageType::ToolResponse => {}
        }
    }
    flush_batch(&mut messages, &mut batch, &responses, &mut consumed);

    for (id, turn) in &responses {
        if !consumed.contains(id) {
            warn!(
                tool_call_id = %id,
                conversation = %turn.conversation_id,
                "dropping orphan tool response"
            );
        }
    }

    messages
}

fn flush_batch<'a>(
    messages: &mut Vec<AssembledMessage>,
    batch: &mut Vec<&'a Turn>,
    responses: &HashMap<&'a str, &'a Turn>,
    consumed: &mut HashSet<&'a str>,
) {
    if batch.is_empty() {
        return;
    }

    let calls: Vec<ToolCallPayload> = batch
        .iter()
        .map(|turn| ToolCallPayload {
            id: turn.tool_call_id.clone().unwrap_or_default(),
            call_type: "function".to_string(),
            function: FunctionPayload {
                name: turn.tool_name.clone().unwrap_or_default(),
                arguments: turn.content.clone(),
            },
        })
        .collect();
    messages.push(AssembledMessage::assistant_tool_calls(calls));

    for turn in batch.drain(..) {
        let id = turn.tool_call_id.as_deref().unwrap_or_default();
        let text = match responses.get(id) {
            Some(resp) => {
                consumed.insert(id);
                resp.content.clone()
            }
            None => NO_RESPONSE_PLACEHOLDER.to_string(),
        };
        messages.push(AssembledMessage::tool(id, text));
    }
}
