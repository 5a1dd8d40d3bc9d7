//! Conversation driver — the iterative tool-use loop.
//!
//! Flow: model call with the tool catalog → if the model requests tools,
//! dispatch the batch and persist both row kinds → repeat until the model
//! yields text or the iteration ceiling is hit, then one forced-close call
//! without tools. The driver never raises an error to the entry point; it
//! always settles on a textual answer.

use std::collections::HashMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use magpie_store::TranscriptStore;

use crate::dispatch::dispatch;
use crate::provider::{
    extract_text, AssembledMessage, ChatRequest, ChatResponse, CompletionService, ProviderError,
    ToolCallPayload, FAILED_REQUEST_TEXT, NO_RESPONSE_TEXT,
};
use crate::registry::{ToolContext, ToolRegistry};

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub model: String,
    /// Ceiling on tool-loop iterations; the forced-close call is on top.
    pub max_iterations: u32,
}

/// One tool call as recorded for the debug payload: name plus parsed
/// arguments (or the raw string when the arguments are not valid JSON).
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: serde_json::Value,
}

pub struct DriverOutcome {
    /// The full message sequence as it stood at termination.
    pub messages: Vec<AssembledMessage>,
    /// Model calls made inside the tool loop (the forced-close call is not
    /// counted).
    pub iterations: u32,
    /// Final assistant text; an error sentinel on fatal paths.
    pub text: String,
    /// Per-batch tool listing for the debug payload.
    pub tool_trace: Vec<Vec<ToolInvocation>>,
}

/// Drive `messages` to a final textual answer.
///
/// Tool-call and tool-response rows are persisted incrementally as they are
/// produced; persistence failures are logged and never abort the turn.
#[allow(clippy::too_many_arguments)]
pub async fn run_conversation(
    service: &dyn CompletionService,
    registry: &ToolRegistry,
    store: &TranscriptStore,
    bot_id: &str,
    ctx: &ToolContext,
    mut messages: Vec<AssembledMessage>,
    cfg: &DriverConfig,
    cancel: &CancellationToken,
) -> DriverOutcome {
    let catalog = registry.definitions();
    let mut iteration: u32 = 0;
    let mut tool_trace: Vec<Vec<ToolInvocation>> = Vec::new();

    loop {
        iteration += 1;
        let response = match call_model(service, cfg, &messages, Some(catalog.clone()), cancel).await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(iteration, error = %e, "model call failed");
                return terminal(messages, iteration, FAILED_REQUEST_TEXT, tool_trace);
            }
        };

        let Some(choice) = response.choices.into_iter().next() else {
            warn!(iteration, "model returned zero choices");
            return terminal(messages, iteration, NO_RESPONSE_TEXT, tool_trace);
        };

        let calls: Vec<ToolCallPayload> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter(|c| c.call_type == "function")
            .collect();

        let wants_tools =
            choice.finish_reason.as_deref() == Some("tool_calls") && !calls.is_empty();
        if !wants_tools {
            let text = extract_text(choice.message.content.as_ref());
            info!(iteration, "tool loop complete");
            return terminal(messages, iteration, &text, tool_trace);
        }

        debug!(iteration, calls = calls.len(), "model requested tool batch");
        messages.push(AssembledMessage::assistant_tool_calls(calls.clone()));
        tool_trace.push(calls.iter().map(summarize).collect());

        // Persist the calls, capturing each tool's expires_at so the paired
        // response row can be stamped with the same instant.
        let mut expiries: HashMap<String, Option<String>> = HashMap::new();
        for call in &calls {
            let validity = registry
                .lookup(&call.function.name)
                .map(|d| d.validity)
                .unwrap_or(Duration::ZERO);
            match store.append_tool_call(
                &ctx.conversation_id,
                bot_id,
                &call.id,
                &call.function.name,
                &call.function.arguments,
                validity,
            ) {
                Ok(expires_at) => {
                    expiries.insert(call.id.clone(), expires_at);
                }
                Err(e) => warn!(tool = %call.function.name, error = %e, "tool_call row write failed"),
            }
        }

        let results = dispatch(registry, ctx, &calls, cancel).await;

        // Append results in batch order, paired by id.
        for call in &calls {
            let Some(result) = results.iter().find(|r| r.tool_call_id == call.id) else {
                continue;
            };
            messages.push(AssembledMessage::tool(&call.id, &result.text));
            let expires_at = expiries.get(&call.id).cloned().flatten();
            if let Err(e) = store.append_tool_response(
                &ctx.conversation_id,
                bot_id,
                &call.id,
                &call.function.name,
                &result.text,
                expires_at.as_deref(),
            ) {
                warn!(tool = %call.function.name, error = %e, "tool_response row write failed");
            }
        }

        if iteration >= cfg.max_iterations {
            info!(iteration, "iteration ceiling reached, forcing close");
            let text = forced_close(service, cfg, &messages, cancel).await;
            return terminal(messages, iteration, &text, tool_trace);
        }
    }
}

/// One final model call without the tool catalog, coercing a textual answer.
async fn forced_close(
    service: &dyn CompletionService,
    cfg: &DriverConfig,
    messages: &[AssembledMessage],
    cancel: &CancellationToken,
) -> String {
    let response = match call_model(service, cfg, messages, None, cancel).await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "forced-close call failed");
            return FAILED_REQUEST_TEXT.to_string();
        }
    };
    match response.choices.into_iter().next() {
        Some(choice) => extract_text(choice.message.content.as_ref()),
        None => NO_RESPONSE_TEXT.to_string(),
    }
}

async fn call_model(
    service: &dyn CompletionService,
    cfg: &DriverConfig,
    messages: &[AssembledMessage],
    tools: Option<Vec<serde_json::Value>>,
    cancel: &CancellationToken,
) -> Result<ChatResponse, ProviderError> {
    let req = ChatRequest {
        model: cfg.model.clone(),
        messages: messages.to_vec(),
        tools,
    };
    tokio::select! {
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        r = service.complete(&req) => r,
    }
}

fn summarize(call: &ToolCallPayload) -> ToolInvocation {
    let arguments = serde_json::from_str(&call.function.arguments)
        .unwrap_or_else(|_| serde_json::Value::String(call.function.arguments.clone()));
    ToolInvocation {
        name: call.function.name.clone(),
        arguments,
    }
}

fn terminal(
    messages: Vec<AssembledMessage>,
    iterations: u32,
    text: &str,
    tool_trace: Vec<Vec<ToolInvocation>>,
) -> DriverOutcome {
    DriverOutcome {
        messages,
        iterations,
        text: text.to_string(),
        tool_trace,
    }
}
