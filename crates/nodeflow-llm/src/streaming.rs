use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

use crate::error::LlmError;

/// Normalized event emitted by every provider adapter.
///
/// `chat_id` is fixed for one adapter invocation (all rounds of its tool loop);
/// `execution_id` is the originating `ChatRequest::id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamItem {
    pub chat_id: String,
    pub execution_id: String,
    #[serde(flatten)]
    pub kind: StreamItemKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamItemKind {
    ChatStart {
        model_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        provider_message_id: Option<String>,
    },

    ChatFragment {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },

    ChatEnd {},

    TokenUsage {
        input_tokens: u32,
        output_tokens: u32,
    },

    ToolCall {
        tool_call_id: String,
        name: String,
        index: u32,
        arguments: Value,
    },

    ToolResult {
        tool_call_id: String,
        result: Value,
        duration_ms: u64,
    },

    ExceptionResult {
        error: String,
    },
}

impl StreamItem {
    pub fn fragment_text(&self) -> Option<&str> {
        match &self.kind {
            StreamItemKind::ChatFragment { content, .. } => Some(content),
            _ => None,
        }
    }

    pub fn is_chat_start(&self) -> bool {
        matches!(self.kind, StreamItemKind::ChatStart { .. })
    }

    pub fn is_chat_end(&self) -> bool {
        matches!(self.kind, StreamItemKind::ChatEnd {})
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self.kind, StreamItemKind::ToolCall { .. })
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self.kind, StreamItemKind::ToolResult { .. })
    }

    /// Short variant label, used in logs
    pub fn label(&self) -> &'static str {
        match self.kind {
            StreamItemKind::ChatStart { .. } => "chat_start",
            StreamItemKind::ChatFragment { .. } => "chat_fragment",
            StreamItemKind::ChatEnd {} => "chat_end",
            StreamItemKind::TokenUsage { .. } => "token_usage",
            StreamItemKind::ToolCall { .. } => "tool_call",
            StreamItemKind::ToolResult { .. } => "tool_result",
            StreamItemKind::ExceptionResult { .. } => "exception_result",
        }
    }
}

/// Stamps the correlation ids onto items.
///
/// Created once per adapter invocation; the only place items get their ids.
#[derive(Debug, Clone)]
pub(crate) struct ItemStamp {
    chat_id: String,
    execution_id: String,
}

impl ItemStamp {
    pub(crate) fn new(execution_id: impl Into<String>) -> Self {
        Self {
            chat_id: uuid::Uuid::new_v4().to_string(),
            execution_id: execution_id.into(),
        }
    }

    pub(crate) fn item(&self, kind: StreamItemKind) -> StreamItem {
        StreamItem {
            chat_id: self.chat_id.clone(),
            execution_id: self.execution_id.clone(),
            kind,
        }
    }

    pub(crate) fn chat_id(&self) -> &str {
        &self.chat_id
    }
}

pub type ItemStream = Pin<Box<dyn Stream<Item = Result<StreamItem, LlmError>> + Send>>;
