//! Tool registry — the static catalog of callable tools.
//!
//! Read-only after startup; descriptors are advertised to the model and
//! looked up by name at dispatch time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Per-call scoped data passed into every handler invocation. An explicit
/// value bag, never a thread-local.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub conversation_id: String,
    pub sender_id: String,
}

/// A callable tool backend. Handlers are black boxes to the core: they take
/// the raw argument string the model produced and return response text.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: &ToolContext, raw_args: &str) -> anyhow::Result<String>;
}

/// Immutable description of one registered tool.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON schema for the arguments; must be an object with named
    /// properties and a `required` list.
    pub parameters: serde_json::Value,
    /// How long a result may be considered reusable. Zero means no cache
    /// guarantee; positive values co-date call and response rows for
    /// retention.
    pub validity: Duration,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        validity: Duration,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            validity,
            handler,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool name must not be empty")]
    EmptyName,

    #[error("parameter schema for tool {0} must be a JSON object")]
    InvalidSchema(String),
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor keyed by name; a later registration replaces an
    /// earlier one.
    pub fn register(&mut self, tool: ToolDescriptor) -> Result<(), RegistryError> {
        if tool.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if !tool.parameters.is_object() {
            return Err(RegistryError::InvalidSchema(tool.name));
        }
        self.tools.insert(tool.name.clone(), tool);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// All descriptors, sorted by name for a stable advertising order.
    pub fn list(&self) -> Vec<&ToolDescriptor> {
        let mut all: Vec<&ToolDescriptor> = self.tools.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The catalog in the wire format the chat-completion service expects.
    pub fn definitions(&self) -> Vec<serde_json::Value> {
        self.list()
            .into_iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect()
    }
}
