//! # Nodeflow
//!
//! Agent graph engine: a directed graph of input, model, formatting and output
//! nodes, where model nodes talk to OpenAI, Anthropic or Gemini through one
//! streaming protocol and may loop through tool calls before answering.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nodeflow::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let definition: GraphDefinition = serde_json::from_value(json!({
//!         "nodes": [
//!             {"id": "in", "name": "question", "type": "input"},
//!             {"id": "model", "name": "assistant", "type": "model",
//!              "config": {"provider": "openai", "model": "gpt-4o"}},
//!             {"id": "out", "name": "answer", "type": "output"}
//!         ],
//!         "edges": [{"from": "in", "to": "model"}, {"from": "model", "to": "out"}]
//!     }))?;
//!
//!     let providers = ProviderRegistry::from_configs(ProviderConfig::all_from_env())?;
//!     let graph = GraphBuilder::new(definition).providers(providers).build()?;
//!
//!     let (mut events, handle, _cancel) = graph.spawn_run(RunRequest::from_user_message("2+2?"));
//!     while let Some(event) = events.recv().await {
//!         if let RunEvent::Stream { item, .. } = &event {
//!             if let Some(text) = item.fragment_text() {
//!                 print!("{}", text);
//!             }
//!         }
//!     }
//!
//!     let outcome = handle.await?;
//!     println!("\n{:?}", outcome.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **`nodeflow-llm`**: chat providers, SSE framing and the tool-call loop
//! - **`nodeflow-types`**: graph definitions, node results and run events
//! - **`nodeflow-graph`**: builder, per-run context, node kinds and the executor

pub mod prelude;

pub use nodeflow_graph::{
    AgentContext, EventSink, FunctionTool, Graph, GraphBuilder, GraphError, InMemoryQueue,
    JobQueue, Posture, ProviderRegistry, RunOutcome, Tool, ToolRegistry,
};

pub use nodeflow_llm::{
    AnthropicClient, ChatProvider, ChatRequest, ClientFactory, Delivery, GeminiClient, LlmError,
    Message, OpenAIClient, ProviderConfig, ProviderType, Role, StreamItem, StreamItemKind,
    ToolCallback, ToolDefinition,
};

pub use nodeflow_types::{
    GraphConfig, GraphDefinition, ModelNodeConfig, NodeResult, NodeType, RunEvent, RunRequest,
    RunStatus, StringFormatterConfig,
};

/// Direct access to the underlying crates
pub use nodeflow_graph as graph;
pub use nodeflow_llm as llm;
pub use nodeflow_types as types;
