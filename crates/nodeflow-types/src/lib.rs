pub mod config;
pub mod definition;
pub mod details;
pub mod events;
pub mod node;
pub mod result;

pub use config::{GraphConfig, ModelNodeConfig, StringFormatterConfig};
pub use definition::{EdgeDefinition, GraphDefinition, NodeDefinition};
pub use details::{ExecutionDetails, InputDetails, RunRequest};
pub use events::{RunEvent, RunStatus};
pub use node::{NodeId, NodeStatus, NodeType};
pub use result::{
    ExceptionNodeResult, InputNodeResult, ModelNodeResult, NodeResult, OutputNodeResult,
    StringFormatterNodeResult, PREVIOUS_NODE_FAILED,
};
