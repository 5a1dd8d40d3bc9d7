//! Wire types for the chat-completion service, plus the service trait the
//! driver is written against.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// User-visible text when the model call itself fails.
pub const FAILED_REQUEST_TEXT: &str = "Failed to process chat request";
/// User-visible text when the API returns zero choices.
pub const NO_RESPONSE_TEXT: &str = "No response from chat API";
/// Sentinel when the response content has an unrecognised shape.
pub const UNRENDERABLE_TEXT: &str = "Unable to render chat API response";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// Message content: either a plain string or a list of content parts
/// (text + inline image) for multimodal turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One message in the shape the chat-completion service expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledMessage {
    pub role: ChatRole,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallPayload>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl AssembledMessage {
    pub fn text(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(ChatRole::User, content)
    }

    /// Multimodal user turn: text plus an inline image part.
    pub fn user_with_image(text: impl Into<String>, image: ContentPart) -> Self {
        Self {
            role: ChatRole::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                image,
            ]),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Assistant turn requesting a batch of tool calls. Content is the empty
    /// string per the tool-call batching protocol.
    pub fn assistant_tool_calls(calls: Vec<ToolCallPayload>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: MessageContent::Text(String::new()),
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    /// Tool message answering one call of the preceding batch.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: MessageContent::Text(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// A tool call as it appears on the wire, both in responses and when echoing
/// the assistant turn back on the next request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionPayload {
    pub name: String,
    /// Unparsed JSON string, exactly as the model produced it.
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<AssembledMessage>,
    /// Tool catalog; omitted entirely on the forced-close call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    /// Kept as raw JSON: providers return a string, an object with a `text`
    /// property, or other shapes — see [`extract_text`].
    #[serde(default)]
    pub content: Option<serde_json::Value>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallPayload>>,
}

/// Normalise the model's `content` field into displayable text.
///
/// Recognised shapes, in order: a plain string; an object with a string
/// `text` property. Anything else yields [`UNRENDERABLE_TEXT`]. Applied to
/// both tool-loop turns and the forced-close turn.
pub fn extract_text(content: Option<&serde_json::Value>) -> String {
    match content {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Object(obj)) => match obj.get("text").and_then(|t| t.as_str()) {
            Some(t) => t.to_string(),
            None => UNRENDERABLE_TEXT.to_string(),
        },
        _ => UNRENDERABLE_TEXT.to_string(),
    }
}

/// Common interface to the chat-completion service.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("operation cancelled")]
    Cancelled,
}
