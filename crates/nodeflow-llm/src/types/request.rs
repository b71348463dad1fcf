use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::message::Message;

pub const TEMPERATURE: &str = "temperature";
pub const MAX_TOKENS: &str = "max_tokens";
pub const TOP_P: &str = "top_p";
pub const TOP_K: &str = "top_k";
pub const THINKING_BUDGET: &str = "thinking_budget";
/// Read by the tool loop, not forwarded to the vendor
pub const MAX_ROUNDS: &str = "max_rounds";

/// One chat invocation: the conversation plus open, provider-interpreted metadata.
///
/// `id` becomes the `execution_id` of every item streamed for this request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub id: String,
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            model: model.into(),
            messages,
            metadata: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn extend_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.metadata.insert(TEMPERATURE.to_string(), Value::from(temp));
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.metadata.insert(MAX_TOKENS.to_string(), Value::from(tokens));
        self
    }

    pub fn max_rounds(mut self, rounds: u32) -> Self {
        self.metadata.insert(MAX_ROUNDS.to_string(), Value::from(rounds));
        self
    }

    pub fn get_f32(&self, key: &str) -> Option<f32> {
        self.metadata.get(key).and_then(Value::as_f64).map(|v| v as f32)
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.metadata
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }
}
