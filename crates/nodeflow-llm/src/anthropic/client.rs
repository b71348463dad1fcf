// Anthropic-specific dialect (Messages API)

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{LlmError, Result};
use crate::tool_loop::{Dialect, RoundEvent, RoundOutput, RoundParser, ToolLoopProvider};
use crate::traits::Delivery;
use crate::transport::{HttpRequest, HttpTransport};
use crate::types::message::split_system;
use crate::types::request::{MAX_TOKENS, TEMPERATURE, THINKING_BUDGET, TOP_K, TOP_P};
use crate::types::{ChatRequest, Role, ToolDefinition, ToolInvocation};

pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic adapter: the tool loop speaking the Messages dialect
pub type AnthropicClient = ToolLoopProvider<AnthropicDialect>;

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self::with_transport(
            AnthropicDialect::new(api_key),
            Arc::new(HttpTransport::new()?),
        ))
    }
}

/// One entry of the Messages API transcript.
///
/// Content is kept as raw blocks so thinking blocks can be echoed back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: Vec<Value>,
}

impl AnthropicMessage {
    fn is_tool_results(&self) -> bool {
        self.role == "user"
            && !self.content.is_empty()
            && self
                .content
                .iter()
                .all(|block| block.get("type").and_then(Value::as_str) == Some("tool_result"))
    }
}

pub struct AnthropicDialect {
    api_key: String,
    base_url: String,
    api_version: String,
}

impl AnthropicDialect {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_BASE.to_string(),
            api_version: ANTHROPIC_VERSION.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    fn convert_tool(tool: &ToolDefinition) -> Value {
        json!({
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool.parameters,
        })
    }

    fn build_request(
        &self,
        request: &ChatRequest,
        messages: &[AnthropicMessage],
        tools: &[ToolDefinition],
        stream: bool,
    ) -> Result<Value> {
        let (system, _) = split_system(&request.messages);
        let thinking_budget = request.get_u32(THINKING_BUDGET);

        let mut payload = json!({
            "model": request.model,
            "max_tokens": request.get_u32(MAX_TOKENS).unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": serde_json::to_value(messages)?,
            "stream": stream,
        });

        if let Some(obj) = payload.as_object_mut() {
            if let Some(system) = system {
                obj.insert("system".to_string(), json!(system));
            }
            if let Some(budget) = thinking_budget {
                obj.insert(
                    "thinking".to_string(),
                    json!({ "type": "enabled", "budget_tokens": budget }),
                );
            } else if let Some(temp) = request.get_f32(TEMPERATURE) {
                // Extended thinking only accepts the default temperature
                obj.insert("temperature".to_string(), json!(temp));
            }
            if let Some(top_p) = request.get_f32(TOP_P) {
                obj.insert("top_p".to_string(), json!(top_p));
            }
            if let Some(top_k) = request.get_u32(TOP_K) {
                obj.insert("top_k".to_string(), json!(top_k));
            }
            if !tools.is_empty() {
                let tools: Vec<Value> = tools.iter().map(Self::convert_tool).collect();
                obj.insert("tools".to_string(), json!(tools));
            }
        }

        Ok(payload)
    }
}

impl Dialect for AnthropicDialect {
    type Message = AnthropicMessage;
    type Parser = AnthropicStreamParser;

    const PROVIDER: &'static str = "anthropic";

    fn conversation(&self, request: &ChatRequest) -> Vec<AnthropicMessage> {
        let (_, turns) = split_system(&request.messages);
        let mut conversation: Vec<AnthropicMessage> = Vec::new();

        for message in turns {
            let role = match message.role {
                Role::Assistant => "assistant",
                _ => "user",
            };
            let block = json!({ "type": "text", "text": message.content });

            // The Messages API wants alternating turns
            match conversation.last_mut() {
                Some(last) if last.role == role => last.content.push(block),
                _ => conversation.push(AnthropicMessage {
                    role: role.to_string(),
                    content: vec![block],
                }),
            }
        }

        conversation
    }

    fn render(
        &self,
        request: &ChatRequest,
        conversation: &[AnthropicMessage],
        tools: &[ToolDefinition],
        delivery: Delivery,
    ) -> Result<HttpRequest> {
        let payload =
            self.build_request(request, conversation, tools, delivery == Delivery::Streaming)?;

        Ok(HttpRequest::new(format!("{}/v1/messages", self.base_url), payload)
            .header("x-api-key", self.api_key.clone())
            .header("anthropic-version", self.api_version.clone()))
    }

    fn stream_parser(&self) -> AnthropicStreamParser {
        AnthropicStreamParser::default()
    }

    fn parse_response(&self, body: Value) -> Result<Vec<RoundEvent>> {
        let raw: MessageResponse = serde_json::from_value(body)?;
        let mut events = vec![
            RoundEvent::Started {
                message_id: Some(raw.id),
            },
            RoundEvent::Usage {
                input_tokens: raw.usage.input_tokens,
                output_tokens: raw.usage.output_tokens,
            },
        ];

        for (index, block) in raw.content.into_iter().enumerate() {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    let text = block.get("text").and_then(Value::as_str).unwrap_or_default();
                    events.push(RoundEvent::Text(text.to_string()));
                }
                Some("tool_use") => events.push(RoundEvent::ToolCallDelta {
                    index: index as u32,
                    id: block.get("id").and_then(Value::as_str).map(str::to_string),
                    name: block.get("name").and_then(Value::as_str).map(str::to_string),
                    arguments: block.get("input").map(Value::to_string),
                }),
                Some("thinking") | Some("redacted_thinking") => events.push(RoundEvent::Replay(block)),
                _ => {}
            }
        }

        Ok(events)
    }

    fn push_assistant_turn(&self, conversation: &mut Vec<AnthropicMessage>, round: &RoundOutput) {
        let mut content = round.replay.clone();

        if !round.text.is_empty() {
            content.push(json!({ "type": "text", "text": round.text }));
        }
        for call in &round.calls {
            content.push(json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": call.arguments,
            }));
        }

        conversation.push(AnthropicMessage {
            role: "assistant".to_string(),
            content,
        });
    }

    fn push_tool_result(
        &self,
        conversation: &mut Vec<AnthropicMessage>,
        call: &ToolInvocation,
        result: &Value,
    ) {
        let block = json!({
            "type": "tool_result",
            "tool_use_id": call.id,
            "content": result.to_string(),
        });

        // All results answering one assistant turn share a single user message
        match conversation.last_mut() {
            Some(last) if last.is_tool_results() => last.content.push(block),
            _ => conversation.push(AnthropicMessage {
                role: "user".to_string(),
                content: vec![block],
            }),
        }
    }
}

#[derive(Debug, Default)]
struct ThinkingBuffer {
    thinking: String,
    signature: String,
}

/// Reads Messages API stream events
#[derive(Debug, Default)]
pub struct AnthropicStreamParser {
    input_tokens: u32,
    thinking: HashMap<u32, ThinkingBuffer>,
}

impl RoundParser for AnthropicStreamParser {
    fn parse_chunk(&mut self, data: &str) -> Result<Vec<RoundEvent>> {
        let event: StreamEvent = serde_json::from_str(data)?;

        let events = match event {
            StreamEvent::MessageStart { message } => {
                self.input_tokens = message.usage.map(|u| u.input_tokens).unwrap_or(0);
                vec![RoundEvent::Started {
                    message_id: Some(message.id),
                }]
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block.get("type").and_then(Value::as_str) {
                Some("tool_use") => vec![RoundEvent::ToolCallDelta {
                    index,
                    id: content_block.get("id").and_then(Value::as_str).map(str::to_string),
                    name: content_block.get("name").and_then(Value::as_str).map(str::to_string),
                    arguments: None,
                }],
                Some("text") => {
                    let text = content_block.get("text").and_then(Value::as_str).unwrap_or_default();
                    vec![RoundEvent::Text(text.to_string())]
                }
                Some("thinking") => {
                    self.thinking.insert(index, ThinkingBuffer::default());
                    Vec::new()
                }
                Some("redacted_thinking") => vec![RoundEvent::Replay(content_block)],
                _ => Vec::new(),
            },
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => vec![RoundEvent::Text(text)],
                BlockDelta::InputJsonDelta { partial_json } => vec![RoundEvent::ToolCallDelta {
                    index,
                    id: None,
                    name: None,
                    arguments: Some(partial_json),
                }],
                BlockDelta::ThinkingDelta { thinking } => {
                    self.thinking.entry(index).or_default().thinking.push_str(&thinking);
                    Vec::new()
                }
                BlockDelta::SignatureDelta { signature } => {
                    self.thinking.entry(index).or_default().signature.push_str(&signature);
                    Vec::new()
                }
                BlockDelta::Other => Vec::new(),
            },
            StreamEvent::ContentBlockStop { index } => match self.thinking.remove(&index) {
                Some(buffer) => vec![RoundEvent::Replay(json!({
                    "type": "thinking",
                    "thinking": buffer.thinking,
                    "signature": buffer.signature,
                }))],
                None => Vec::new(),
            },
            StreamEvent::MessageDelta { usage } => match usage {
                Some(usage) => vec![RoundEvent::Usage {
                    input_tokens: self.input_tokens,
                    output_tokens: usage.output_tokens,
                }],
                None => Vec::new(),
            },
            StreamEvent::Error { error } => {
                return Err(LlmError::Stream(format!(
                    "anthropic stream error ({}): {}",
                    error.error_type, error.message
                )));
            }
            StreamEvent::MessageStop | StreamEvent::Ping => Vec::new(),
        };

        Ok(events)
    }
}

// ============================================================================
// ANTHROPIC-SPECIFIC WIRE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: StartMessage,
    },
    ContentBlockStart {
        index: u32,
        content_block: Value,
    },
    ContentBlockDelta {
        index: u32,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        #[serde(default)]
        usage: Option<OutputUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiError,
    },
}

#[derive(Debug, Deserialize)]
struct StartMessage {
    id: String,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    id: String,
    content: Vec<Value>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OutputUsage {
    #[serde(default)]
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[test]
    fn test_system_prompt_moves_to_top_level() {
        let dialect = AnthropicDialect::new("key");
        let request = ChatRequest::new(
            "claude-sonnet-4-5",
            vec![Message::system("Be brief"), Message::user("Hello")],
        );

        let conversation = dialect.conversation(&request);
        let payload = dialect.build_request(&request, &conversation, &[], true).unwrap();

        assert_eq!(payload["system"], "Be brief");
        assert_eq!(payload["max_tokens"], 4096);
        assert_eq!(payload["messages"].as_array().unwrap().len(), 1);
        assert_eq!(payload["messages"][0]["role"], "user");
    }

    #[test]
    fn test_thinking_budget_replaces_temperature() {
        let dialect = AnthropicDialect::new("key");
        let request = ChatRequest::new("claude-sonnet-4-5", vec![Message::user("Hi")])
            .temperature(0.3)
            .with_metadata("thinking_budget", 2048);

        let payload = dialect.build_request(&request, &[], &[], false).unwrap();
        assert_eq!(payload["thinking"]["budget_tokens"], 2048);
        assert!(payload.get("temperature").is_none());
    }

    #[test]
    fn test_thinking_block_is_replayed_on_stop() {
        let mut parser = AnthropicStreamParser::default();
        parser
            .parse_chunk(r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}"#)
            .unwrap();
        parser
            .parse_chunk(r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"Let me see"}}"#)
            .unwrap();
        parser
            .parse_chunk(r#"{"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"sig"}}"#)
            .unwrap();
        let events = parser.parse_chunk(r#"{"type":"content_block_stop","index":0}"#).unwrap();

        assert_eq!(
            events,
            vec![RoundEvent::Replay(json!({
                "type": "thinking",
                "thinking": "Let me see",
                "signature": "sig",
            }))]
        );
    }

    #[test]
    fn test_error_event_fails_the_round() {
        let mut parser = AnthropicStreamParser::default();
        let result = parser
            .parse_chunk(r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#);

        assert!(matches!(result, Err(LlmError::Stream(_))));
    }
}
