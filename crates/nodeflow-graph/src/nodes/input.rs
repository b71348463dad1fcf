use anyhow::Result;
use async_trait::async_trait;
use nodeflow_llm::Message;
use nodeflow_types::{InputNodeResult, NodeResult};

use crate::context::AgentContext;
use crate::node::{NodeInfo, NodeInput, NodeLogic};

/// Hands the run's latest inbound message to the graph
pub struct InputNode;

#[async_trait]
impl NodeLogic for InputNode {
    async fn run(&self, _node: &NodeInfo, _inputs: &[NodeInput], ctx: &AgentContext) -> Result<NodeResult> {
        let message = ctx
            .input()
            .latest()
            .cloned()
            .unwrap_or_else(|| Message::user(""));

        Ok(NodeResult::Input(InputNodeResult { message }))
    }
}
