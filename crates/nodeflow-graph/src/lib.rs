//! Node-graph executor.
//!
//! A [`Graph`] is built from a [`GraphDefinition`](nodeflow_types::GraphDefinition)
//! by [`GraphBuilder`], which validates the definition and wires each node to
//! its logic. Every run gets its own [`AgentContext`]; nodes execute as soon as
//! their inputs are registered and report through the run's [`EventSink`].

pub mod builder;
pub mod context;
pub mod error;
pub mod graph;
pub mod node;
pub mod nodes;
pub mod providers;
pub mod queue;
pub mod sink;
pub mod tools;

pub use builder::GraphBuilder;
pub use context::AgentContext;
pub use error::{GraphError, Result};
pub use graph::{Graph, RunOutcome};
pub use node::{AgentNode, NodeInfo, NodeInput, NodeLogic};
pub use nodes::{InputNode, ModelNode, OutputNode, StringFormatterNode};
pub use providers::ProviderRegistry;
pub use queue::{InMemoryQueue, JobQueue};
pub use sink::{EventSender, EventSink};
pub use tools::{validate_arguments, FunctionTool, Posture, Tool, ToolRegistry, ToolSet};
