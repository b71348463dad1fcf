// Gemini-specific dialect (generateContent API)

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::Result;
use crate::tool_loop::{Dialect, RoundEvent, RoundOutput, RoundParser, ToolLoopProvider};
use crate::traits::Delivery;
use crate::transport::{HttpRequest, HttpTransport};
use crate::types::message::split_system;
use crate::types::request::{MAX_TOKENS, TEMPERATURE, THINKING_BUDGET, TOP_K, TOP_P};
use crate::types::{ChatRequest, Role, ToolDefinition, ToolInvocation};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const MALFORMED_FUNCTION_CALL: &str = "MALFORMED_FUNCTION_CALL";
const FUNCTION_ROLE: &str = "function";

/// Gemini adapter: the tool loop speaking the generateContent dialect
pub type GeminiClient = ToolLoopProvider<GeminiDialect>;

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self::with_transport(
            GeminiDialect::new(api_key),
            Arc::new(HttpTransport::new()?),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiContent {
    pub role: String,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<GeminiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<GeminiFunctionResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

impl GeminiPart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

/// Gemini rejects function responses whose root is an array
pub fn function_response_payload(result: &Value) -> Value {
    match result {
        Value::Array(_) => json!({ "result": result }),
        Value::Object(_) => result.clone(),
        other => json!({ "result": other }),
    }
}

pub struct GeminiDialect {
    api_key: String,
    base_url: String,
}

impl GeminiDialect {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, model: &str, delivery: Delivery) -> String {
        match delivery {
            Delivery::Streaming => format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.base_url, model
            ),
            Delivery::Single => format!("{}/models/{}:generateContent", self.base_url, model),
        }
    }

    fn generation_config(request: &ChatRequest) -> Option<Value> {
        let mut config = serde_json::Map::new();

        if let Some(max_tokens) = request.get_u32(MAX_TOKENS) {
            config.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        if let Some(temp) = request.get_f32(TEMPERATURE) {
            config.insert("temperature".to_string(), json!(temp));
        }
        if let Some(top_p) = request.get_f32(TOP_P) {
            config.insert("topP".to_string(), json!(top_p));
        }
        if let Some(top_k) = request.get_u32(TOP_K) {
            config.insert("topK".to_string(), json!(top_k));
        }
        if let Some(budget) = request.get_u32(THINKING_BUDGET) {
            config.insert(
                "thinkingConfig".to_string(),
                json!({ "thinkingBudget": budget }),
            );
        }

        (!config.is_empty()).then(|| Value::Object(config))
    }

    fn build_request(
        &self,
        request: &ChatRequest,
        contents: &[GeminiContent],
        tools: &[ToolDefinition],
    ) -> Result<Value> {
        let (system, _) = split_system(&request.messages);
        let mut payload = json!({ "contents": serde_json::to_value(contents)? });

        if let Some(obj) = payload.as_object_mut() {
            if let Some(system) = system {
                obj.insert(
                    "systemInstruction".to_string(),
                    json!({ "parts": [{ "text": system }] }),
                );
            }
            if !tools.is_empty() {
                let declarations: Vec<Value> = tools
                    .iter()
                    .map(|tool| {
                        json!({
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        })
                    })
                    .collect();
                obj.insert(
                    "tools".to_string(),
                    json!([{ "functionDeclarations": declarations }]),
                );
            }
            if let Some(config) = Self::generation_config(request) {
                obj.insert("generationConfig".to_string(), config);
            }
        }

        Ok(payload)
    }
}

impl Dialect for GeminiDialect {
    type Message = GeminiContent;
    type Parser = GeminiStreamParser;

    const PROVIDER: &'static str = "gemini";

    fn conversation(&self, request: &ChatRequest) -> Vec<GeminiContent> {
        let (_, turns) = split_system(&request.messages);
        let mut contents: Vec<GeminiContent> = Vec::new();

        for message in turns {
            let role = match message.role {
                Role::Assistant => "model",
                _ => "user",
            };
            match contents.last_mut() {
                Some(last) if last.role == role => last.parts.push(GeminiPart::text(&message.content)),
                _ => contents.push(GeminiContent {
                    role: role.to_string(),
                    parts: vec![GeminiPart::text(&message.content)],
                }),
            }
        }

        contents
    }

    fn render(
        &self,
        request: &ChatRequest,
        conversation: &[GeminiContent],
        tools: &[ToolDefinition],
        delivery: Delivery,
    ) -> Result<HttpRequest> {
        let payload = self.build_request(request, conversation, tools)?;

        Ok(HttpRequest::new(self.endpoint(&request.model, delivery), payload)
            .header("x-goog-api-key", self.api_key.clone()))
    }

    fn stream_parser(&self) -> GeminiStreamParser {
        GeminiStreamParser::default()
    }

    fn parse_response(&self, body: Value) -> Result<Vec<RoundEvent>> {
        let response: GenerateContentResponse = serde_json::from_value(body)?;
        let mut parser = GeminiStreamParser::default();

        let mut events = parser.read_response(response);
        events.extend(parser.finish());
        Ok(events)
    }

    fn push_assistant_turn(&self, conversation: &mut Vec<GeminiContent>, round: &RoundOutput) {
        let mut parts = Vec::new();

        if !round.text.is_empty() {
            parts.push(GeminiPart::text(&round.text));
        }
        for call in &round.calls {
            let thought_signature = round
                .replay
                .iter()
                .find(|entry| entry.get("id").and_then(Value::as_str) == Some(call.id.as_str()))
                .and_then(|entry| entry.get("thoughtSignature"))
                .and_then(Value::as_str)
                .map(str::to_string);

            parts.push(GeminiPart {
                function_call: Some(GeminiFunctionCall {
                    id: Some(call.id.clone()),
                    name: call.name.clone(),
                    args: call.arguments.clone(),
                }),
                thought_signature,
                ..GeminiPart::default()
            });
        }

        conversation.push(GeminiContent {
            role: "model".to_string(),
            parts,
        });
    }

    fn push_tool_result(
        &self,
        conversation: &mut Vec<GeminiContent>,
        call: &ToolInvocation,
        result: &Value,
    ) {
        let part = GeminiPart {
            function_response: Some(GeminiFunctionResponse {
                id: Some(call.id.clone()),
                name: call.name.clone(),
                response: function_response_payload(result),
            }),
            ..GeminiPart::default()
        };

        // Responses to one model turn travel together in a single function content
        match conversation.last_mut() {
            Some(last) if last.role == FUNCTION_ROLE => last.parts.push(part),
            _ => conversation.push(GeminiContent {
                role: FUNCTION_ROLE.to_string(),
                parts: vec![part],
            }),
        }
    }
}

/// Reads generateContent chunks.
///
/// Gemini sends each function call whole, so calls get consecutive indices
/// across the chunks of a round. Usage is cumulative and reported once at the end.
#[derive(Debug, Default)]
pub struct GeminiStreamParser {
    started: bool,
    next_index: u32,
    usage: Option<UsageMetadata>,
}

impl GeminiStreamParser {
    fn read_response(&mut self, response: GenerateContentResponse) -> Vec<RoundEvent> {
        let mut events = Vec::new();

        if !self.started {
            self.started = true;
            events.push(RoundEvent::Started {
                message_id: response.response_id.clone(),
            });
        }
        if let Some(usage) = response.usage_metadata {
            self.usage = Some(usage);
        }

        let Some(candidate) = response.candidates.into_iter().next() else {
            return events;
        };

        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(call) = part.function_call {
                let index = self.next_index;
                self.next_index += 1;

                let id = call
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));

                if let Some(signature) = part.thought_signature {
                    events.push(RoundEvent::Replay(json!({
                        "id": id,
                        "thoughtSignature": signature,
                    })));
                }
                events.push(RoundEvent::ToolCallDelta {
                    index,
                    id: Some(id),
                    name: Some(call.name),
                    // Calls without parameters omit `args`; the accumulator reads that as `{}`
                    arguments: (!call.args.is_null()).then(|| call.args.to_string()),
                });
            } else if let Some(text) = part.text {
                // Thought summaries are not part of the answer
                if part.thought != Some(true) && !text.is_empty() {
                    events.push(RoundEvent::Text(text));
                }
            }
        }

        if candidate.finish_reason.as_deref() == Some(MALFORMED_FUNCTION_CALL) {
            let detail = candidate
                .finish_message
                .unwrap_or_else(|| "the model produced an invalid function call".to_string());
            events.push(RoundEvent::Exception(format!(
                "{}: {}",
                MALFORMED_FUNCTION_CALL, detail
            )));
        }

        events
    }
}

impl RoundParser for GeminiStreamParser {
    fn parse_chunk(&mut self, data: &str) -> Result<Vec<RoundEvent>> {
        let response: GenerateContentResponse = serde_json::from_str(data)?;
        Ok(self.read_response(response))
    }

    fn finish(&mut self) -> Vec<RoundEvent> {
        match self.usage.take() {
            Some(usage) => vec![RoundEvent::Usage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count + usage.thoughts_token_count,
            }],
            None => Vec::new(),
        }
    }
}

// ============================================================================
// GEMINI-SPECIFIC WIRE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    response_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    finish_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    thoughts_token_count: u32,
}
