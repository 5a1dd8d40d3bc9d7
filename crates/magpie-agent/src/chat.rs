//! Contract with the external chat service (room sends, typing signal,
//! event lookups, media download). The protocol client itself lives outside
//! the conversation core; the core degrades gracefully when any of these
//! operations fail.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat service error: {0}")]
    Service(String),
}

pub type ChatResult<T> = std::result::Result<T, ChatError>;

/// Reference to an image event: where to fetch it and how to decrypt it.
/// `info` carries the event's image metadata (mimetype, declared size).
#[derive(Debug, Clone)]
pub struct ImageEventRef {
    pub url: String,
    pub encryption: Option<serde_json::Value>,
    pub info: serde_json::Value,
}

/// Debug metadata attached to an outbound assistant message.
pub type DebugPayload = serde_json::Map<String, serde_json::Value>;

#[async_trait]
pub trait ChatService: Send + Sync {
    async fn send_plain(&self, conversation_id: &str, text: &str) -> ChatResult<()>;

    async fn send_markdown_with_debug(
        &self,
        conversation_id: &str,
        text: &str,
        debug: &DebugPayload,
    ) -> ChatResult<()>;

    /// Raise or clear the typing signal. `timeout` bounds how long the
    /// signal stays up if it is never cleared explicitly.
    async fn set_typing(
        &self,
        conversation_id: &str,
        on: bool,
        timeout: Duration,
    ) -> ChatResult<()>;

    async fn mark_read(&self, conversation_id: &str, event_id: &str) -> ChatResult<()>;

    async fn display_name(&self, user_id: &str) -> ChatResult<Option<String>>;

    /// The chat-protocol type of an event (e.g. an image vs. a text message).
    async fn event_type(&self, conversation_id: &str, event_id: &str) -> ChatResult<String>;

    async fn event_text(&self, conversation_id: &str, event_id: &str) -> ChatResult<String>;

    async fn event_image(
        &self,
        conversation_id: &str,
        event_id: &str,
    ) -> ChatResult<ImageEventRef>;

    /// Fetch (and, when encrypted, decrypt) the media behind an image event.
    async fn download_media(&self, image: &ImageEventRef) -> ChatResult<Vec<u8>>;
}
