use anyhow::Result;
use async_trait::async_trait;
use nodeflow_types::{NodeResult, OutputNodeResult};

use crate::context::AgentContext;
use crate::node::{NodeInfo, NodeInput, NodeLogic};

/// Collects upstream results, in input order, for delivery outside the graph
pub struct OutputNode;

#[async_trait]
impl NodeLogic for OutputNode {
    async fn run(&self, _node: &NodeInfo, inputs: &[NodeInput], _ctx: &AgentContext) -> Result<NodeResult> {
        Ok(NodeResult::Output(OutputNodeResult {
            results: inputs.iter().map(|input| input.result.clone()).collect(),
        }))
    }
}
