use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::{NodeId, NodeType};

/// Authored graph, as loaded from JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Kind-specific configuration
    #[serde(default)]
    pub config: Value,
}

/// `from` feeds its result into `to`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub from: NodeId,
    pub to: NodeId,
}

impl GraphDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn node(mut self, id: impl Into<String>, name: impl Into<String>, node_type: NodeType, config: Value) -> Self {
        self.nodes.push(NodeDefinition {
            id: id.into(),
            name: name.into(),
            node_type,
            config,
        });
        self
    }

    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push(EdgeDefinition {
            from: from.into(),
            to: to.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition_from_json() {
        let definition: GraphDefinition = serde_json::from_value(json!({
            "id": "qa",
            "nodes": [
                {"id": "in", "name": "question", "type": "input"},
                {"id": "out", "name": "answer", "type": "output"}
            ],
            "edges": [{"from": "in", "to": "out"}]
        }))
        .unwrap();

        assert_eq!(definition.nodes.len(), 2);
        assert_eq!(definition.nodes[0].node_type, NodeType::Input);
        assert_eq!(definition.nodes[0].config, Value::Null);
        assert_eq!(definition.edges[0].to, "out");
    }
}
