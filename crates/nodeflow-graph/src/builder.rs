use nodeflow_types::{
    GraphConfig, GraphDefinition, ModelNodeConfig, NodeDefinition, NodeId, NodeType,
    StringFormatterConfig,
};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::{GraphError, Result};
use crate::graph::{Graph, NodeTemplate};
use crate::node::{NodeInfo, NodeLogic};
use crate::nodes::{InputNode, ModelNode, OutputNode, StringFormatterNode};
use crate::providers::ProviderRegistry;
use crate::tools::ToolRegistry;

/// Builder for validating a graph definition and wiring its nodes
pub struct GraphBuilder {
    definition: GraphDefinition,
    providers: Arc<ProviderRegistry>,
    tools: Arc<ToolRegistry>,
    config: GraphConfig,
}

impl GraphBuilder {
    pub fn new(definition: GraphDefinition) -> Self {
        Self {
            definition,
            providers: Arc::new(ProviderRegistry::new()),
            tools: Arc::new(ToolRegistry::new()),
            config: GraphConfig::default(),
        }
    }

    /// Set the chat providers available to Model nodes
    pub fn providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = Arc::new(providers);
        self
    }

    /// Set the tools Model nodes may offer
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    /// Set the graph configuration
    pub fn config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate and build the Graph
    pub fn build(self) -> Result<Graph> {
        let definition = &self.definition;
        let mut ids = HashSet::new();
        let mut names = HashSet::new();

        for node in &definition.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(GraphError::DuplicateNodeId(node.id.clone()));
            }
            if !names.insert(node.name.as_str()) {
                return Err(GraphError::DuplicateNodeName(node.name.clone()));
            }
            if !node.node_type.is_executable() {
                return Err(GraphError::UnsupportedNodeType {
                    node: node.id.clone(),
                    node_type: node.node_type.to_string(),
                });
            }
        }

        let mut inputs: HashMap<&str, Vec<NodeId>> = HashMap::new();
        let mut outputs: HashMap<&str, Vec<NodeId>> = HashMap::new();
        for edge in &definition.edges {
            for end in [&edge.from, &edge.to] {
                if !ids.contains(end.as_str()) {
                    return Err(GraphError::UnknownNode(end.clone()));
                }
            }
            outputs.entry(edge.from.as_str()).or_default().push(edge.to.clone());
            inputs.entry(edge.to.as_str()).or_default().push(edge.from.clone());
        }

        let order = topological_order(&definition.nodes, &inputs, &outputs)?;

        let mut templates = Vec::with_capacity(order.len());
        for index in order {
            let node = &definition.nodes[index];
            templates.push(NodeTemplate {
                info: NodeInfo {
                    id: node.id.clone(),
                    name: node.name.clone(),
                    node_type: node.node_type,
                },
                inputs: inputs.remove(node.id.as_str()).unwrap_or_default(),
                outputs: outputs.remove(node.id.as_str()).unwrap_or_default(),
                logic: self.logic_for(node)?,
            });
        }

        tracing::info!(
            graph_id = definition.id.as_deref().unwrap_or("-"),
            nodes = templates.len(),
            edges = definition.edges.len(),
            "Graph built"
        );

        Ok(Graph::new(definition.id.clone(), templates, self.config))
    }

    fn logic_for(&self, node: &NodeDefinition) -> Result<Arc<dyn NodeLogic>> {
        let logic: Arc<dyn NodeLogic> = match node.node_type {
            NodeType::Input => Arc::new(InputNode),
            NodeType::Output => Arc::new(OutputNode),
            NodeType::Model => {
                let config: ModelNodeConfig = parse_config(node)?;
                Arc::new(ModelNode::new(config, Arc::clone(&self.providers), Arc::clone(&self.tools)))
            }
            NodeType::StringFormatter => {
                let config: StringFormatterConfig = parse_config(node)?;
                Arc::new(StringFormatterNode::new(config))
            }
            NodeType::Conditional => {
                return Err(GraphError::UnsupportedNodeType {
                    node: node.id.clone(),
                    node_type: node.node_type.to_string(),
                })
            }
        };
        Ok(logic)
    }
}

fn parse_config<T: DeserializeOwned>(node: &NodeDefinition) -> Result<T> {
    serde_json::from_value(node.config.clone()).map_err(|e| GraphError::MissingConfig {
        node: node.id.clone(),
        reason: e.to_string(),
    })
}

/// Kahn's algorithm; the leftovers of a failed sort are the nodes on or behind a cycle
fn topological_order(
    nodes: &[NodeDefinition],
    inputs: &HashMap<&str, Vec<NodeId>>,
    outputs: &HashMap<&str, Vec<NodeId>>,
) -> Result<Vec<usize>> {
    let position: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.id.as_str(), i))
        .collect();
    let mut pending: Vec<usize> = nodes
        .iter()
        .map(|node| inputs.get(node.id.as_str()).map_or(0, Vec::len))
        .collect();

    let mut ready: VecDeque<usize> = (0..nodes.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(index) = ready.pop_front() {
        order.push(index);
        for next in outputs.get(nodes[index].id.as_str()).into_iter().flatten() {
            let next = position[next.as_str()];
            pending[next] -= 1;
            if pending[next] == 0 {
                ready.push_back(next);
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck = (0..nodes.len())
            .filter(|i| pending[*i] > 0)
            .map(|i| nodes[i].id.clone())
            .collect();
        return Err(GraphError::Cycle(stuck));
    }

    Ok(order)
}
