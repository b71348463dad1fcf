use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique node identity within a graph
pub type NodeId = String;

/// Node kind tag, as authored in a graph definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Input,
    Model,
    Output,
    StringFormatter,
    /// Authoring-only; the engine has no executable counterpart
    Conditional,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Model => "model",
            Self::Output => "output",
            Self::StringFormatter => "string_formatter",
            Self::Conditional => "conditional",
        }
    }

    pub fn is_executable(&self) -> bool {
        !matches!(self, Self::Conditional)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one node within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum NodeStatus {
    NotStarted = 0,
    InProgress = 1,
    Completed = 2,
}

impl NodeStatus {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::InProgress,
            _ => Self::Completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_serde_names() {
        let parsed: NodeType = serde_json::from_str("\"string_formatter\"").unwrap();
        assert_eq!(parsed, NodeType::StringFormatter);
        assert_eq!(serde_json::to_string(&NodeType::Model).unwrap(), "\"model\"");
        assert!(!NodeType::Conditional.is_executable());
    }

    #[test]
    fn test_status_roundtrips_through_u8() {
        for status in [NodeStatus::NotStarted, NodeStatus::InProgress, NodeStatus::Completed] {
            assert_eq!(NodeStatus::from_u8(status as u8), status);
        }
    }
}
