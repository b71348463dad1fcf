// OpenAI-specific dialect (Chat Completions API, HTTP direct, no SDK)

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::Result;
use crate::tool_loop::{Dialect, RoundEvent, RoundOutput, RoundParser, ToolLoopProvider};
use crate::traits::Delivery;
use crate::transport::{HttpRequest, HttpTransport};
use crate::types::request::{MAX_TOKENS, TEMPERATURE, TOP_P};
use crate::types::{ChatRequest, Message, ToolDefinition, ToolInvocation};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI adapter: the tool loop speaking the Chat Completions dialect
pub type OpenAIClient = ToolLoopProvider<OpenAIDialect>;

impl OpenAIClient {
    /// Create new client with API key
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self::with_transport(
            OpenAIDialect::new(api_key),
            Arc::new(HttpTransport::new()?),
        ))
    }
}

pub struct OpenAIDialect {
    api_key: String,
    base_url: String,
}

impl OpenAIDialect {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: OPENAI_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// o-series and gpt-5 models reject `temperature` and use `max_completion_tokens`
    pub fn is_reasoning_model(model: &str) -> bool {
        model.starts_with("o1")
            || model.starts_with("o3")
            || model.starts_with("o4")
            || model.starts_with("gpt-5")
    }

    /// Convert our Message type to OpenAI format
    fn convert_message(message: &Message) -> Value {
        json!({
            "role": message.role.as_str(),
            "content": message.content,
        })
    }

    fn convert_tool(tool: &ToolDefinition) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        })
    }

    /// Build chat completion request payload
    fn build_chat_request(
        &self,
        request: &ChatRequest,
        messages: &[Value],
        tools: &[ToolDefinition],
        stream: bool,
    ) -> Value {
        let mut payload = json!({
            "model": request.model,
            "messages": messages,
            "stream": stream,
        });

        if let Some(obj) = payload.as_object_mut() {
            let is_reasoning_model = Self::is_reasoning_model(&request.model);

            if stream {
                obj.insert("stream_options".to_string(), json!({ "include_usage": true }));
            }
            if let Some(temp) = request.get_f32(TEMPERATURE) {
                if !is_reasoning_model {
                    obj.insert("temperature".to_string(), json!(temp));
                }
            }
            if let Some(max_tokens) = request.get_u32(MAX_TOKENS) {
                let token_field = if is_reasoning_model {
                    "max_completion_tokens"
                } else {
                    "max_tokens"
                };
                obj.insert(token_field.to_string(), json!(max_tokens));
            }
            if let Some(top_p) = request.get_f32(TOP_P) {
                obj.insert("top_p".to_string(), json!(top_p));
            }
            if !tools.is_empty() {
                let tools: Vec<Value> = tools.iter().map(Self::convert_tool).collect();
                obj.insert("tools".to_string(), json!(tools));
                obj.insert("tool_choice".to_string(), json!("auto"));
            }
        }

        payload
    }
}

impl Dialect for OpenAIDialect {
    type Message = Value;
    type Parser = OpenAIStreamParser;

    const PROVIDER: &'static str = "openai";

    fn conversation(&self, request: &ChatRequest) -> Vec<Value> {
        request.messages.iter().map(Self::convert_message).collect()
    }

    fn render(
        &self,
        request: &ChatRequest,
        conversation: &[Value],
        tools: &[ToolDefinition],
        delivery: Delivery,
    ) -> Result<HttpRequest> {
        let payload = self.build_chat_request(
            request,
            conversation,
            tools,
            delivery == Delivery::Streaming,
        );

        Ok(
            HttpRequest::new(format!("{}/chat/completions", self.base_url), payload)
                .header("Authorization", format!("Bearer {}", self.api_key)),
        )
    }

    fn stream_parser(&self) -> OpenAIStreamParser {
        OpenAIStreamParser::default()
    }

    fn parse_response(&self, body: Value) -> Result<Vec<RoundEvent>> {
        let raw: OpenAIChatResponse = serde_json::from_value(body)?;
        let mut events = vec![RoundEvent::Started {
            message_id: Some(raw.id),
        }];

        if let Some(usage) = raw.usage {
            events.push(RoundEvent::Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            });
        }

        if let Some(choice) = raw.choices.into_iter().next() {
            if let Some(content) = choice.message.content {
                events.push(RoundEvent::Text(content));
            }
            for (index, call) in choice.message.tool_calls.unwrap_or_default().into_iter().enumerate() {
                events.push(RoundEvent::ToolCallDelta {
                    index: index as u32,
                    id: call.id,
                    name: call.function.as_ref().and_then(|f| f.name.clone()),
                    arguments: call.function.and_then(|f| f.arguments),
                });
            }
        }

        Ok(events)
    }

    fn push_assistant_turn(&self, conversation: &mut Vec<Value>, round: &RoundOutput) {
        let tool_calls: Vec<Value> = round
            .calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.arguments.to_string(),
                    }
                })
            })
            .collect();

        let content = if round.text.is_empty() {
            Value::Null
        } else {
            json!(round.text)
        };

        conversation.push(json!({
            "role": "assistant",
            "content": content,
            "tool_calls": tool_calls,
        }));
    }

    fn push_tool_result(&self, conversation: &mut Vec<Value>, call: &ToolInvocation, result: &Value) {
        conversation.push(json!({
            "role": "tool",
            "tool_call_id": call.id,
            "content": result.to_string(),
        }));
    }
}

/// Reads `chat.completion.chunk` payloads
#[derive(Debug, Default)]
pub struct OpenAIStreamParser {
    started: bool,
}

impl RoundParser for OpenAIStreamParser {
    fn parse_chunk(&mut self, data: &str) -> Result<Vec<RoundEvent>> {
        let chunk: ChatStreamChunk = serde_json::from_str(data)?;
        let mut events = Vec::new();

        if !self.started {
            self.started = true;
            events.push(RoundEvent::Started {
                message_id: chunk.id.clone(),
            });
        }

        if let Some(choice) = chunk.choices.first() {
            if let Some(content) = &choice.delta.content {
                if !content.is_empty() {
                    events.push(RoundEvent::Text(content.clone()));
                }
            }

            if let Some(tool_calls) = &choice.delta.tool_calls {
                for tc in tool_calls {
                    events.push(RoundEvent::ToolCallDelta {
                        index: tc.index,
                        id: tc.id.clone(),
                        name: tc.function.as_ref().and_then(|f| f.name.clone()),
                        arguments: tc.function.as_ref().and_then(|f| f.arguments.clone()),
                    });
                }
            }
        }

        if let Some(usage) = &chunk.usage {
            events.push(RoundEvent::Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            });
        }

        Ok(events)
    }
}

// ============================================================================
// OPENAI-SPECIFIC WIRE TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Delta {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIChatResponse {
    pub id: String,
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Choice {
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResponseMessage {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResponseToolCall {
    pub id: Option<String>,
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasoning_model_request_fields() {
        let dialect = OpenAIDialect::new("key");
        let request = ChatRequest::new("o1-mini", vec![Message::user("hi")])
            .temperature(0.2)
            .max_tokens(64);

        let payload = dialect.build_chat_request(&request, &[], &[], false);
        assert!(payload.get("temperature").is_none());
        assert_eq!(payload["max_completion_tokens"], 64);
    }

    #[test]
    fn test_regular_model_request_fields() {
        let dialect = OpenAIDialect::new("key");
        let request = ChatRequest::new("gpt-4o", vec![Message::user("hi")])
            .max_tokens(64)
            .with_metadata("top_k", 5);

        let payload = dialect.build_chat_request(&request, &[], &[], true);
        assert_eq!(payload["max_tokens"], 64);
        assert_eq!(payload["stream_options"]["include_usage"], true);
        assert!(payload.get("top_k").is_none());
        assert!(payload.get("tools").is_none());
    }

    #[test]
    fn test_stream_parser_emits_started_once() {
        let mut parser = OpenAIStreamParser::default();
        let first = parser
            .parse_chunk(r#"{"id":"chatcmpl-1","choices":[{"index":0,"delta":{"content":"He"},"finish_reason":null}]}"#)
            .unwrap();
        let second = parser
            .parse_chunk(r#"{"id":"chatcmpl-1","choices":[{"index":0,"delta":{"content":"llo"},"finish_reason":null}]}"#)
            .unwrap();

        assert_eq!(
            first,
            vec![
                RoundEvent::Started { message_id: Some("chatcmpl-1".to_string()) },
                RoundEvent::Text("He".to_string()),
            ]
        );
        assert_eq!(second, vec![RoundEvent::Text("llo".to_string())]);
    }

    #[test]
    fn test_stream_parser_reads_usage_chunk() {
        let mut parser = OpenAIStreamParser { started: true };
        let events = parser
            .parse_chunk(r#"{"id":"c","choices":[],"usage":{"prompt_tokens":7,"completion_tokens":3,"total_tokens":10}}"#)
            .unwrap();

        assert_eq!(events, vec![RoundEvent::Usage { input_tokens: 7, output_tokens: 3 }]);
    }
}
