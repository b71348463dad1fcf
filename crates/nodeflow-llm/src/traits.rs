use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::streaming::ItemStream;
use crate::types::{ChatRequest, ToolCallback, ToolDefinition};

/// How each round of a tool loop is fetched from the vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Server-sent events, forwarded as they arrive
    Streaming,
    /// One request/response per round
    Single,
}

/// Provider chat adapter.
///
/// Both operations drive the full tool loop and yield the same item sequence;
/// they differ only in how a round reaches the vendor. A transport or API
/// failure ends the stream with an `Err` item. Already-yielded items stay valid.
pub trait ChatProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Streaming chat with tool loop
    fn stream(
        &self,
        request: ChatRequest,
        tools: Vec<ToolDefinition>,
        callback: Arc<dyn ToolCallback>,
        cancel: CancellationToken,
    ) -> ItemStream;

    /// Non-streaming chat with tool loop
    fn call(
        &self,
        request: ChatRequest,
        tools: Vec<ToolDefinition>,
        callback: Arc<dyn ToolCallback>,
        cancel: CancellationToken,
    ) -> ItemStream;

    fn invoke(
        &self,
        delivery: Delivery,
        request: ChatRequest,
        tools: Vec<ToolDefinition>,
        callback: Arc<dyn ToolCallback>,
        cancel: CancellationToken,
    ) -> ItemStream {
        match delivery {
            Delivery::Streaming => self.stream(request, tools, callback, cancel),
            Delivery::Single => self.call(request, tools, callback, cancel),
        }
    }
}
