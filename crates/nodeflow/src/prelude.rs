//! Prelude module for convenient imports
//!
//! ```rust
//! use nodeflow::prelude::*;
//! ```

pub use crate::{
    ChatProvider, ChatRequest, Delivery, EventSink, FunctionTool, Graph, GraphBuilder, GraphConfig,
    GraphDefinition, Message, ModelNodeConfig, NodeResult, NodeType, ProviderConfig,
    ProviderRegistry, ProviderType, RunEvent, RunOutcome, RunRequest, RunStatus, StreamItem,
    StreamItemKind, Tool, ToolDefinition, ToolRegistry,
};
