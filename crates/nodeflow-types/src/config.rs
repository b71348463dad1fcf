use nodeflow_llm::{Delivery, ProviderType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Run-wide execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Nodes allowed to execute at the same time
    pub max_concurrency: usize,
    pub execution_timeout: Duration,
    /// Capacity of the run event channel
    pub event_buffer: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            execution_timeout: Duration::from_secs(300),
            event_buffer: 1000,
        }
    }
}

impl GraphConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }
}

fn default_delivery() -> Delivery {
    Delivery::Streaming
}

fn default_true() -> bool {
    true
}

/// Configuration of a Model node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelNodeConfig {
    pub provider: ProviderType,
    pub model: String,
    /// Ids into the run's prompt table, sent as system messages in this order
    #[serde(default)]
    pub prompt_ids: Vec<String>,
    #[serde(default = "default_delivery")]
    pub delivery: Delivery,
    /// Provider metadata (temperature, max_tokens, ...)
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Tool names this node may offer, subject to the caller's posture
    #[serde(default)]
    pub tools: Vec<String>,
    /// Send the inbound message history before the synthesized user turn
    #[serde(default = "default_true")]
    pub include_history: bool,
}

impl ModelNodeConfig {
    pub fn new(provider: ProviderType, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            prompt_ids: Vec::new(),
            delivery: Delivery::Streaming,
            metadata: Map::new(),
            tools: Vec::new(),
            include_history: true,
        }
    }

    pub fn with_prompt(mut self, prompt_id: impl Into<String>) -> Self {
        self.prompt_ids.push(prompt_id.into());
        self
    }

    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_tool(mut self, name: impl Into<String>) -> Self {
        self.tools.push(name.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Configuration of a String-Formatter node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringFormatterConfig {
    pub template: String,
}

impl StringFormatterConfig {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_model_config_defaults() {
        let config: ModelNodeConfig =
            serde_json::from_value(json!({"provider": "anthropic", "model": "claude-sonnet-4-5"})).unwrap();

        assert_eq!(config.provider, ProviderType::Anthropic);
        assert_eq!(config.delivery, Delivery::Streaming);
        assert!(config.include_history);
        assert!(config.tools.is_empty());
    }

    #[test]
    fn test_graph_config_builders() {
        let config = GraphConfig::new()
            .with_max_concurrency(0)
            .with_timeout(Duration::from_secs(5))
            .with_event_buffer(16);

        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.execution_timeout, Duration::from_secs(5));
        assert_eq!(config.event_buffer, 16);
    }
}
