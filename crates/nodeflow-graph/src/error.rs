use nodeflow_llm::ProviderType;
use nodeflow_types::NodeId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Node '{0}' already has a registered result")]
    DuplicateResult(NodeId),

    #[error("Duplicate node id '{0}'")]
    DuplicateNodeId(NodeId),

    #[error("Duplicate node name '{0}'")]
    DuplicateNodeName(String),

    #[error("Edge references unknown node '{0}'")]
    UnknownNode(NodeId),

    #[error("Graph contains a cycle through: {}", .0.join(", "))]
    Cycle(Vec<NodeId>),

    #[error("Node '{node}' has type '{node_type}', which cannot be executed")]
    UnsupportedNodeType { node: NodeId, node_type: String },

    #[error("No provider registered for '{0}'")]
    ProviderNotRegistered(ProviderType),

    #[error("Invalid configuration for node '{node}': {reason}")]
    MissingConfig { node: NodeId, reason: String },

    #[error("Node '{0}' was already started")]
    NodeAlreadyStarted(NodeId),

    #[error("Event sink closed")]
    SinkClosed,

    #[error("Run cancelled")]
    Cancelled,

    #[error("Job queue closed")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, GraphError>;
