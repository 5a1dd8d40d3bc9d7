use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::collections::HashMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Default number of history turns folded into each model prompt.
pub const DEFAULT_HISTORY_LIMIT: u32 = 20;
/// Default ceiling on tool-use iterations per conversation turn.
pub const DEFAULT_MAX_TOOL_ITERATIONS: u32 = 5;
/// Default byte budget for web content fetched on behalf of a room.
pub const DEFAULT_MAX_WEB_BYTES: u64 = 2 * 1024 * 1024;
/// Default transcript retention window in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 7;
/// Default interval between retention sweeps, in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Top-level config (magpie.toml + MAGPIE_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagpieConfig {
    #[serde(default)]
    pub bot: BotConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Per-room overrides keyed by room id. Anything unset falls back to the
    /// global defaults in `llm` / `RoomConfig::default_for`.
    #[serde(default)]
    pub rooms: HashMap<String, RoomOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Fallback display name when the chat service cannot resolve one.
    #[serde(default = "default_display_name")]
    pub display_name: String,
    /// IANA timezone used for wall-clock time in prompts and reminders.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
            timezone: default_timezone(),
        }
    }
}

impl BotConfig {
    /// Parse the configured timezone. Unknown names fall back to UTC with a
    /// warning rather than failing startup.
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or_else(|_| {
            tracing::warn!(timezone = %self.timezone, "unknown timezone, falling back to UTC");
            chrono_tz::UTC
        })
    }
}

/// Chat-completion service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Path appended to base_url for chat completions.
    #[serde(default = "default_chat_path")]
    pub chat_path: String,
    /// Model used for plain text turns.
    #[serde(default = "default_text_model")]
    pub text_model: String,
    /// Model used when the turn carries an inline image.
    #[serde(default = "default_image_model")]
    pub image_model: String,
    /// Sent as the HTTP-Referer header so the API can attribute traffic.
    #[serde(default)]
    pub referer: Option<String>,
    /// Sent as the X-Title header alongside the referer.
    #[serde(default)]
    pub title: Option<String>,
    /// When true, completed calls are followed by a fire-and-forget
    /// generation-stats lookup (cost, latency, token counts).
    #[serde(default)]
    pub fetch_generation_stats: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_days")]
    pub days: u32,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Per-room override entry as it appears in the config file. All fields
/// optional; unset fields inherit the global defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomOverride {
    pub text_model: Option<String>,
    pub image_model: Option<String>,
    pub history_limit: Option<u32>,
    pub max_tool_iterations: Option<u32>,
    pub max_web_bytes: Option<u64>,
}

/// Fully resolved per-room settings used by the conversation core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConfig {
    pub text_model: String,
    pub image_model: String,
    pub history_limit: u32,
    pub max_tool_iterations: u32,
    pub max_web_bytes: u64,
}

/// Runtime view over per-room overrides.
///
/// Read from every conversation task; overrides can be adjusted at runtime
/// (e.g. by an admin command), hence the concurrent map.
pub struct RoomSettings {
    defaults: LlmConfig,
    overrides: DashMap<String, RoomOverride>,
}

impl RoomSettings {
    pub fn new(llm: LlmConfig, overrides: HashMap<String, RoomOverride>) -> Self {
        let map = DashMap::new();
        for (room, ov) in overrides {
            map.insert(room, ov);
        }
        Self {
            defaults: llm,
            overrides: map,
        }
    }

    /// Resolve the effective settings for a room.
    pub fn for_room(&self, room_id: &str) -> RoomConfig {
        let ov = self
            .overrides
            .get(room_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        RoomConfig {
            text_model: ov
                .text_model
                .unwrap_or_else(|| self.defaults.text_model.clone()),
            image_model: ov
                .image_model
                .unwrap_or_else(|| self.defaults.image_model.clone()),
            history_limit: ov.history_limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
            max_tool_iterations: ov
                .max_tool_iterations
                .unwrap_or(DEFAULT_MAX_TOOL_ITERATIONS),
            max_web_bytes: ov.max_web_bytes.unwrap_or(DEFAULT_MAX_WEB_BYTES),
        }
    }

    /// Replace the override entry for a room.
    pub fn set_override(&self, room_id: &str, ov: RoomOverride) {
        self.overrides.insert(room_id.to_string(), ov);
    }
}

fn default_display_name() -> String {
    "magpie".to_string()
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_llm_base_url() -> String {
    "https://openrouter.ai/api".to_string()
}
fn default_chat_path() -> String {
    "/v1/chat/completions".to_string()
}
fn default_text_model() -> String {
    "openai/gpt-4o-mini".to_string()
}
fn default_image_model() -> String {
    "openai/gpt-4o".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.magpie/magpie.db", home)
}
fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}
fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

impl MagpieConfig {
    /// Load config from a TOML file with MAGPIE_* env var overrides.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: MagpieConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("MAGPIE_").split("_"))
            .extract()
            .map_err(|e| crate::error::MagpieError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.magpie/magpie.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llm() -> LlmConfig {
        LlmConfig {
            api_key: "k".into(),
            base_url: default_llm_base_url(),
            chat_path: default_chat_path(),
            text_model: "text-model".into(),
            image_model: "image-model".into(),
            referer: None,
            title: None,
            fetch_generation_stats: false,
        }
    }

    #[test]
    fn room_defaults_inherit_globals() {
        let settings = RoomSettings::new(llm(), HashMap::new());
        let cfg = settings.for_room("!room:example.org");
        assert_eq!(cfg.text_model, "text-model");
        assert_eq!(cfg.history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(cfg.max_tool_iterations, DEFAULT_MAX_TOOL_ITERATIONS);
    }

    #[test]
    fn room_override_wins() {
        let settings = RoomSettings::new(llm(), HashMap::new());
        settings.set_override(
            "!room:example.org",
            RoomOverride {
                text_model: Some("other-model".into()),
                history_limit: Some(0),
                max_tool_iterations: Some(1),
                ..Default::default()
            },
        );
        let cfg = settings.for_room("!room:example.org");
        assert_eq!(cfg.text_model, "other-model");
        assert_eq!(cfg.image_model, "image-model");
        assert_eq!(cfg.history_limit, 0);
        assert_eq!(cfg.max_tool_iterations, 1);
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        let bot = BotConfig {
            display_name: "m".into(),
            timezone: "Mars/Olympus".into(),
        };
        assert_eq!(bot.tz(), chrono_tz::UTC);
    }
}
