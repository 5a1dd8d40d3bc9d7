//! Clock tool — current wall-clock time in a requested timezone.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use serde::Deserialize;

use crate::registry::{ToolContext, ToolDescriptor, ToolHandler};

pub struct ClockTool;

#[derive(Deserialize)]
struct Args {
    timezone: String,
}

#[async_trait]
impl ToolHandler for ClockTool {
    async fn call(&self, _ctx: &ToolContext, raw_args: &str) -> anyhow::Result<String> {
        let args: Args = serde_json::from_str(raw_args).context("invalid get_time arguments")?;
        let tz = resolve_zone(&args.timezone)
            .with_context(|| format!("unknown timezone: {}", args.timezone))?;
        let now = Utc::now().with_timezone(&tz);
        Ok(format!(
            "Current time in {}: {}",
            tz.name(),
            now.format("%Y-%m-%d %H:%M:%S %Z")
        ))
    }
}

/// Resolve a zone name. Accepts full IANA names and bare city names
/// ("Tokyo" → Asia/Tokyo), case-insensitively.
fn resolve_zone(name: &str) -> Option<Tz> {
    if let Ok(tz) = name.parse() {
        return Some(tz);
    }
    let needle = name.to_lowercase().replace(' ', "_");
    chrono_tz::TZ_VARIANTS
        .iter()
        .find(|tz| {
            tz.name()
                .rsplit('/')
                .next()
                .map(|city| city.to_lowercase() == needle)
                .unwrap_or(false)
        })
        .copied()
}

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "get_time",
        "Get the current time in a given timezone",
        serde_json::json!({
            "type": "object",
            "properties": {
                "timezone": {
                    "type": "string",
                    "description": "IANA timezone name (e.g. Asia/Tokyo) or a city name (e.g. Tokyo)"
                }
            },
            "required": ["timezone"]
        }),
        Duration::ZERO,
        Arc::new(ClockTool),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ToolContext {
        ToolContext {
            conversation_id: "R".into(),
            sender_id: "U".into(),
        }
    }

    #[tokio::test]
    async fn full_iana_name() {
        let out = ClockTool
            .call(&ctx(), r#"{"timezone":"Europe/Helsinki"}"#)
            .await
            .unwrap();
        assert!(out.starts_with("Current time in Europe/Helsinki:"));
    }

    #[tokio::test]
    async fn bare_city_name_resolves() {
        let out = ClockTool
            .call(&ctx(), r#"{"timezone":"Tokyo"}"#)
            .await
            .unwrap();
        assert!(out.starts_with("Current time in Asia/Tokyo:"));
    }

    #[tokio::test]
    async fn unknown_zone_errors() {
        let err = ClockTool
            .call(&ctx(), r#"{"timezone":"Atlantis"}"#)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown timezone"));
    }

    #[tokio::test]
    async fn bad_arguments_error() {
        assert!(ClockTool.call(&ctx(), "not json").await.is_err());
    }
}
