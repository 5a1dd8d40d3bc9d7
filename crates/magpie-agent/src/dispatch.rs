//! Tool dispatcher — executes one batch of model-requested tool calls.
//!
//! All valid calls in a batch run in parallel; the batch joins only when
//! every handler has finished, so the model's expected tool_call_ids are
//! always answered. Results are paired by id, never by position.

use std::time::Instant;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::provider::ToolCallPayload;
use crate::registry::{ToolContext, ToolRegistry};

/// Outcome of one tool call. `text` is either the handler's response or an
/// error flavoured message the model can recover from.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub tool_call_id: String,
    pub text: String,
}

/// Run a batch of tool calls. Calls whose `type` is not `"function"` are
/// silently skipped; everything else produces exactly one [`ToolOutcome`].
/// The batch itself never fails.
pub async fn dispatch(
    registry: &ToolRegistry,
    ctx: &ToolContext,
    calls: &[ToolCallPayload],
    cancel: &CancellationToken,
) -> Vec<ToolOutcome> {
    let batch_id = Uuid::new_v4();
    let valid: Vec<&ToolCallPayload> = calls
        .iter()
        .filter(|c| c.call_type == "function")
        .collect();

    debug!(
        batch = %batch_id,
        conversation = %ctx.conversation_id,
        requested = calls.len(),
        valid = valid.len(),
        "dispatching tool batch"
    );

    let futures = valid
        .into_iter()
        .map(|call| run_one(registry, ctx, call, cancel));
    let results = join_all(futures).await;

    debug!(batch = %batch_id, results = results.len(), "tool batch complete");
    results
}

async fn run_one(
    registry: &ToolRegistry,
    ctx: &ToolContext,
    call: &ToolCallPayload,
    cancel: &CancellationToken,
) -> ToolOutcome {
    let name = call.function.name.as_str();

    let Some(descriptor) = registry.lookup(name) else {
        warn!(tool = name, "unknown tool requested by model");
        return ToolOutcome {
            tool_call_id: call.id.clone(),
            text: format!("Unknown tool: {name}"),
        };
    };

    let start = Instant::now();
    let result = tokio::select! {
        _ = cancel.cancelled() => Err(anyhow::anyhow!("cancelled")),
        r = descriptor.handler.call(ctx, &call.function.arguments) => r,
    };
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(text) => {
            debug!(tool = name, elapsed_ms, "tool executed");
            ToolOutcome {
                tool_call_id: call.id.clone(),
                text,
            }
        }
        Err(e) => {
            warn!(tool = name, elapsed_ms, error = %e, "tool execution failed");
            ToolOutcome {
                tool_call_id: call.id.clone(),
                text: format!("Error executing {name}: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ToolDescriptor, ToolHandler};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, _ctx: &ToolContext, raw_args: &str) -> anyhow::Result<String> {
            Ok(format!("echo:{raw_args}"))
        }
    }

    struct SlowFail(Duration);

    #[async_trait]
    impl ToolHandler for SlowFail {
        async fn call(&self, _ctx: &ToolContext, _raw_args: &str) -> anyhow::Result<String> {
            tokio::time::sleep(self.0).await;
            anyhow::bail!("backend exploded")
        }
    }

    struct Sleeper(Duration);

    #[async_trait]
    impl ToolHandler for Sleeper {
        async fn call(&self, _ctx: &ToolContext, _raw_args: &str) -> anyhow::Result<String> {
            tokio::time::sleep(self.0).await;
            Ok("slept".into())
        }
    }

    fn schema() -> serde_json::Value {
        json!({"type": "object", "properties": {}, "required": []})
    }

    fn ctx() -> ToolContext {
        ToolContext {
            conversation_id: "R".into(),
            sender_id: "U".into(),
        }
    }

    fn call(id: &str, name: &str) -> ToolCallPayload {
        ToolCallPayload {
            id: id.into(),
            call_type: "function".into(),
            function: crate::provider::FunctionPayload {
                name: name.into(),
                arguments: "{}".into(),
            },
        }
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_text() {
        let reg = ToolRegistry::new();
        let out = dispatch(&reg, &ctx(), &[call("t1", "nope")], &CancellationToken::new()).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tool_call_id, "t1");
        assert_eq!(out[0].text, "Unknown tool: nope");
    }

    #[tokio::test]
    async fn non_function_calls_are_skipped() {
        let mut reg = ToolRegistry::new();
        reg.register(ToolDescriptor::new(
            "echo",
            "",
            schema(),
            Duration::ZERO,
            Arc::new(Echo),
        ))
        .unwrap();

        let mut retrieval = call("t1", "echo");
        retrieval.call_type = "retrieval".into();
        let out = dispatch(
            &reg,
            &ctx(),
            &[retrieval, call("t2", "echo")],
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tool_call_id, "t2");
    }

    #[tokio::test]
    async fn handler_error_does_not_fail_the_batch() {
        let mut reg = ToolRegistry::new();
        reg.register(ToolDescriptor::new(
            "echo",
            "",
            schema(),
            Duration::ZERO,
            Arc::new(Echo),
        ))
        .unwrap();
        reg.register(ToolDescriptor::new(
            "boom",
            "",
            schema(),
            Duration::ZERO,
            Arc::new(SlowFail(Duration::from_millis(50))),
        ))
        .unwrap();

        let out = dispatch(
            &reg,
            &ctx(),
            &[call("t1", "echo"), call("t2", "boom"), call("t3", "echo")],
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(out.len(), 3);
        let t2 = out.iter().find(|o| o.tool_call_id == "t2").unwrap();
        assert_eq!(t2.text, "Error executing boom: backend exploded");
        assert!(out
            .iter()
            .filter(|o| o.tool_call_id != "t2")
            .all(|o| o.text.starts_with("echo:")));
    }

    #[tokio::test]
    async fn batch_runs_in_parallel() {
        let mut reg = ToolRegistry::new();
        reg.register(ToolDescriptor::new(
            "sleep",
            "",
            schema(),
            Duration::ZERO,
            Arc::new(Sleeper(Duration::from_millis(300))),
        ))
        .unwrap();

        let start = Instant::now();
        let out = dispatch(
            &reg,
            &ctx(),
            &[call("t1", "sleep"), call("t2", "sleep"), call("t3", "sleep")],
            &CancellationToken::new(),
        )
        .await;
        let elapsed = start.elapsed();

        assert_eq!(out.len(), 3);
        // Three 300 ms handlers joined well under the 900 ms a sequential
        // run would need.
        assert!(elapsed < Duration::from_millis(700), "batch took {elapsed:?}");
    }

    #[tokio::test]
    async fn cancellation_still_pairs_results() {
        let mut reg = ToolRegistry::new();
        reg.register(ToolDescriptor::new(
            "sleep",
            "",
            schema(),
            Duration::ZERO,
            Arc::new(Sleeper(Duration::from_secs(30))),
        ))
        .unwrap();

        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel2.cancel();
        });

        let out = dispatch(
            &reg,
            &ctx(),
            &[call("t1", "sleep"), call("t2", "sleep")],
            &cancel,
        )
        .await;

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|o| o.text.contains("cancelled")));
        let mut ids: Vec<&str> = out.iter().map(|o| o.tool_call_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["t1", "t2"]);
    }
}
