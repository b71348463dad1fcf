use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use nodeflow_llm::{ChatRequest, ItemStream, Message, StreamItemKind, ToolCallback};
use nodeflow_types::{ModelNodeConfig, ModelNodeResult, NodeResult};
use std::sync::Arc;

use crate::context::AgentContext;
use crate::node::{NodeInfo, NodeInput, NodeLogic};
use crate::providers::ProviderRegistry;
use crate::tools::ToolRegistry;

/// Calls a chat provider with the upstream results as the user turn,
/// forwarding every stream item to the run's sink as it arrives
pub struct ModelNode {
    config: ModelNodeConfig,
    providers: Arc<ProviderRegistry>,
    tools: Arc<ToolRegistry>,
}

#[derive(Debug, Default)]
struct StreamSummary {
    text: String,
    chat_id: Option<String>,
    input_tokens: u32,
    output_tokens: u32,
    tool_calls: u32,
}

impl ModelNode {
    pub fn new(config: ModelNodeConfig, providers: Arc<ProviderRegistry>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            config,
            providers,
            tools,
        }
    }

    pub fn config(&self) -> &ModelNodeConfig {
        &self.config
    }

    /// System prompts, then prior history, then one user turn joining the upstream texts
    fn build_messages(&self, inputs: &[NodeInput], ctx: &AgentContext) -> Result<Vec<Message>> {
        let mut messages = Vec::new();

        for prompt_id in &self.config.prompt_ids {
            let prompt = ctx
                .prompt(prompt_id)
                .ok_or_else(|| anyhow!("Prompt '{}' is not in the prompt table", prompt_id))?;
            messages.push(Message::system(prompt));
        }

        if self.config.include_history {
            messages.extend(ctx.input().history().iter().cloned());
        }

        let user_turn = inputs
            .iter()
            .map(|input| input.result.text())
            .collect::<Vec<_>>()
            .join("\n");
        messages.push(Message::user(user_turn));

        Ok(messages)
    }

    fn build_request(&self, inputs: &[NodeInput], ctx: &AgentContext) -> Result<ChatRequest> {
        Ok(ChatRequest::new(self.config.model.clone(), self.build_messages(inputs, ctx)?)
            .with_id(ctx.execution_id())
            .extend_metadata(self.config.metadata.clone()))
    }

    fn create_stream(&self, request: ChatRequest, ctx: &AgentContext) -> Result<ItemStream> {
        let provider = self.providers.get(self.config.provider)?;
        let tool_set = self.tools.permitted(&self.config.tools, ctx.posture());
        let definitions = tool_set.definitions();
        let callback: Arc<dyn ToolCallback> = Arc::new(tool_set);

        tracing::info!(
            provider = %self.config.provider,
            model = %self.config.model,
            tools = definitions.len(),
            delivery = ?self.config.delivery,
            "MODEL_NODE: Creating stream"
        );

        Ok(provider.invoke(
            self.config.delivery,
            request,
            definitions,
            callback,
            ctx.cancel_token().clone(),
        ))
    }

    /// Forward items and accumulate the answer
    async fn process_stream(&self, node: &NodeInfo, mut stream: ItemStream, ctx: &AgentContext) -> Result<StreamSummary> {
        let mut summary = StreamSummary::default();

        while let Some(item) = stream.next().await {
            let item = item?;

            summary.chat_id.get_or_insert_with(|| item.chat_id.clone());
            match &item.kind {
                StreamItemKind::ChatFragment { content, .. } => summary.text.push_str(content),
                StreamItemKind::TokenUsage { input_tokens, output_tokens } => {
                    summary.input_tokens += input_tokens;
                    summary.output_tokens += output_tokens;
                }
                StreamItemKind::ToolCall { .. } => summary.tool_calls += 1,
                _ => {}
            }

            if let Err(e) = ctx.sink().emit_item(&node.id, item, ctx.cancel_token()).await {
                tracing::warn!(node_id = %node.id, "Failed to forward stream item: {}", e);
            }
        }

        Ok(summary)
    }
}

#[async_trait]
impl NodeLogic for ModelNode {
    async fn run(&self, node: &NodeInfo, inputs: &[NodeInput], ctx: &AgentContext) -> Result<NodeResult> {
        let request = self.build_request(inputs, ctx)?;
        let stream = self.create_stream(request, ctx)?;
        let summary = self.process_stream(node, stream, ctx).await?;

        Ok(NodeResult::Model(ModelNodeResult {
            text: summary.text,
            provider: self.config.provider,
            model: self.config.model.clone(),
            chat_id: summary.chat_id,
            input_tokens: summary.input_tokens,
            output_tokens: summary.output_tokens,
            tool_calls: summary.tool_calls,
        }))
    }
}
