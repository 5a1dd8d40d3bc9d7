//! Reminder-creation tool.
//!
//! Parses the user's reminder spec and hands the resolved fire time to a
//! [`ReminderSink`]; scheduling persistence and delivery live outside the
//! conversation core.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use magpie_core::reminder::resolve_fire_time;

use crate::registry::{ToolContext, ToolDescriptor, ToolHandler};

/// Receives resolved reminders for scheduling and later delivery.
#[async_trait]
pub trait ReminderSink: Send + Sync {
    async fn schedule(
        &self,
        conversation_id: &str,
        sender_id: &str,
        fire_at: DateTime<Utc>,
        message: &str,
    ) -> anyhow::Result<()>;
}

pub struct ReminderTool {
    sink: Arc<dyn ReminderSink>,
    tz: Tz,
}

#[derive(Deserialize)]
struct Args {
    /// Duration ("5m", "in 2h") or time of day ("10:00").
    when: String,
    message: String,
}

#[async_trait]
impl ToolHandler for ReminderTool {
    async fn call(&self, ctx: &ToolContext, raw_args: &str) -> anyhow::Result<String> {
        let args: Args =
            serde_json::from_str(raw_args).context("invalid create_reminder arguments")?;
        let fire_at = resolve_fire_time(&args.when, Utc::now(), self.tz)?;
        self.sink
            .schedule(&ctx.conversation_id, &ctx.sender_id, fire_at, &args.message)
            .await?;
        Ok(format!(
            "Reminder set for {}",
            fire_at.with_timezone(&self.tz).format("%Y-%m-%d %H:%M %Z")
        ))
    }
}

pub fn descriptor(sink: Arc<dyn ReminderSink>, tz: Tz) -> ToolDescriptor {
    ToolDescriptor::new(
        "create_reminder",
        "Set a reminder to be delivered to this room at a later time",
        serde_json::json!({
            "type": "object",
            "properties": {
                "when": {
                    "type": "string",
                    "description": "When to fire: a duration like \"5m\" or \"2h 30m\", or a time of day like \"10:00\""
                },
                "message": {
                    "type": "string",
                    "description": "Text to deliver when the reminder fires"
                }
            },
            "required": ["when", "message"]
        }),
        Duration::ZERO,
        Arc::new(ReminderTool { sink, tz }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        scheduled: Mutex<Vec<(String, String, DateTime<Utc>, String)>>,
    }

    #[async_trait]
    impl ReminderSink for Recording {
        async fn schedule(
            &self,
            conversation_id: &str,
            sender_id: &str,
            fire_at: DateTime<Utc>,
            message: &str,
        ) -> anyhow::Result<()> {
            self.scheduled.lock().unwrap().push((
                conversation_id.to_string(),
                sender_id.to_string(),
                fire_at,
                message.to_string(),
            ));
            Ok(())
        }
    }

    fn ctx() -> ToolContext {
        ToolContext {
            conversation_id: "R".into(),
            sender_id: "U".into(),
        }
    }

    #[tokio::test]
    async fn schedules_through_sink_with_context() {
        let sink = Arc::new(Recording {
            scheduled: Mutex::new(Vec::new()),
        });
        let tool = ReminderTool {
            sink: Arc::clone(&sink) as Arc<dyn ReminderSink>,
            tz: chrono_tz::UTC,
        };

        let out = tool
            .call(&ctx(), r#"{"when":"5m","message":"stretch"}"#)
            .await
            .unwrap();
        assert!(out.starts_with("Reminder set for"));

        let scheduled = sink.scheduled.lock().unwrap();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].0, "R");
        assert_eq!(scheduled[0].1, "U");
        assert_eq!(scheduled[0].3, "stretch");
        assert!(scheduled[0].2 > Utc::now());
    }

    #[tokio::test]
    async fn zero_duration_propagates_parse_error() {
        let sink = Arc::new(Recording {
            scheduled: Mutex::new(Vec::new()),
        });
        let tool = ReminderTool {
            sink,
            tz: chrono_tz::UTC,
        };
        let err = tool
            .call(&ctx(), r#"{"when":"0s","message":"x"}"#)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("at least 1s"));
    }
}
