use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool/Function definition offered to the model.
///
/// Provider-neutral; every adapter renders it into its own declaration format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// JSON Schema for parameters
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Names listed under the schema's `required` key
    pub fn required_properties(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Tool call requested by the model, fully reconstructed from a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    /// Position in the round's declaration/stream order
    pub index: u32,
    pub arguments: Value,
}

/// Executes tools on behalf of the tool loop.
///
/// Calls within one round are awaited one at a time, in declaration order.
#[async_trait]
pub trait ToolCallback: Send + Sync {
    async fn call(&self, name: &str, arguments: Value, tool_call_id: &str) -> anyhow::Result<Value>;
}

/// Callback for requests that carry no tools
pub struct NoTools;

#[async_trait]
impl ToolCallback for NoTools {
    async fn call(&self, name: &str, _arguments: Value, _tool_call_id: &str) -> anyhow::Result<Value> {
        anyhow::bail!("No tools are available (requested '{}')", name)
    }
}
