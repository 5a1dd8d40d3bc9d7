use serde::{Deserialize, Serialize};

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "tool" => Ok(Self::Tool),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// What a turn row represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    ToolCall,
    ToolResponse,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::ToolCall => write!(f, "tool_call"),
            Self::ToolResponse => write!(f, "tool_response"),
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "tool_call" => Ok(Self::ToolCall),
            "tool_response" => Ok(Self::ToolResponse),
            other => Err(format!("unknown message type: {other}")),
        }
    }
}

/// One row in the per-conversation transcript log.
///
/// Invariants maintained by [`crate::TranscriptStore`]:
/// - every `tool_response` row is preceded by a `tool_call` row with the same
///   `tool_call_id` in the same conversation;
/// - `role` is `Tool` iff `message_type` is `ToolResponse`;
/// - `tool_call` rows carry `role = Assistant` and a non-empty `tool_name`;
/// - a `tool_response` shares its call's `expires_at` so the pair ages as a
///   unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: i64,
    pub conversation_id: String,
    pub author_id: String,
    pub role: Role,
    pub message_type: MessageType,
    pub content: String,
    pub tool_call_id: Option<String>,
    pub tool_name: Option<String>,
    /// RFC3339; set when the originating tool declared a validity duration.
    pub expires_at: Option<String>,
    /// RFC3339 insertion time.
    pub created_at: String,
}
