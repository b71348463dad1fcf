use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use nodeflow_types::{
    ExceptionNodeResult, NodeId, NodeResult, NodeStatus, NodeType, RunEvent,
};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::context::AgentContext;
use crate::error::GraphError;

/// Identity of a node within its graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub name: String,
    pub node_type: NodeType,
}

/// One resolved dependency, as handed to node logic
#[derive(Debug, Clone)]
pub struct NodeInput {
    pub node_id: NodeId,
    pub node_name: String,
    pub result: NodeResult,
}

/// Node-specific behavior; the lifecycle around it is supplied by [`AgentNode`]
#[async_trait]
pub trait NodeLogic: Send + Sync {
    async fn run(&self, node: &NodeInfo, inputs: &[NodeInput], ctx: &AgentContext) -> Result<NodeResult>;
}

/// A node instance for one run: identity, adjacency and status
pub struct AgentNode {
    info: NodeInfo,
    inputs: Vec<NodeId>,
    outputs: Vec<NodeId>,
    logic: Arc<dyn NodeLogic>,
    status: AtomicU8,
}

impl AgentNode {
    pub fn new(info: NodeInfo, inputs: Vec<NodeId>, outputs: Vec<NodeId>, logic: Arc<dyn NodeLogic>) -> Self {
        Self {
            info,
            inputs,
            outputs,
            logic,
            status: AtomicU8::new(NodeStatus::NotStarted as u8),
        }
    }

    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn node_type(&self) -> NodeType {
        self.info.node_type
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Run the node once: announce it, resolve dependencies, run the logic
    /// (unless a dependency failed), register the result and announce the end.
    ///
    /// Failures of the logic, including panics, become `ExceptionNodeResult`.
    pub async fn execute(&self, ctx: &AgentContext) -> std::result::Result<NodeResult, GraphError> {
        self.status
            .compare_exchange(
                NodeStatus::NotStarted as u8,
                NodeStatus::InProgress as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| GraphError::NodeAlreadyStarted(self.info.id.clone()))?;

        let event_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();

        tracing::info!(node_id = %self.info.id, node = %self.info.name, node_type = %self.info.node_type, "Node started");
        let start = RunEvent::NodeStart {
            event_id: event_id.clone(),
            node_id: self.info.id.clone(),
            node_name: self.info.name.clone(),
            node_type: self.info.node_type,
            execution_id: ctx.execution_id().to_string(),
            timestamp: Utc::now(),
        };
        if let Err(e) = ctx.sink().send(start).await {
            tracing::warn!(node_id = %self.info.id, "Failed to emit node start: {}", e);
        }

        let result = self.resolve_and_run(ctx).await;

        if let NodeResult::Exception(exception) = &result {
            tracing::error!(
                node_id = %self.info.id,
                node = %self.info.name,
                error = exception.error.as_deref().unwrap_or_default(),
                "{}",
                exception.message
            );
        }

        if let Err(e) = ctx.add_result(&self.info.id, result.clone()).await {
            tracing::error!(node_id = %self.info.id, "{}", e);
        }

        let end = RunEvent::NodeEnd {
            event_id,
            node_id: self.info.id.clone(),
            node_name: self.info.name.clone(),
            node_type: self.info.node_type,
            execution_id: ctx.execution_id().to_string(),
            result: result.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        if let Err(e) = ctx.sink().send(end).await {
            tracing::warn!(node_id = %self.info.id, "Failed to emit node end: {}", e);
        }

        self.status.store(NodeStatus::Completed as u8, Ordering::Release);
        tracing::info!(node_id = %self.info.id, duration_ms = started.elapsed().as_millis() as u64, "Node completed");

        Ok(result)
    }

    async fn resolve_and_run(&self, ctx: &AgentContext) -> NodeResult {
        let results = ctx.get_dependent_results(&self.inputs).await;
        if results.iter().any(NodeResult::is_exception) {
            return NodeResult::Exception(ExceptionNodeResult::previous_node_failed());
        }

        let inputs: Vec<NodeInput> = self
            .inputs
            .iter()
            .zip(results)
            .map(|(id, result)| NodeInput {
                node_id: id.clone(),
                node_name: ctx.node_name(id).to_string(),
                result,
            })
            .collect();

        let outcome = AssertUnwindSafe(self.logic.run(&self.info, &inputs, ctx))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => NodeResult::exception(
                format!("Node '{}' failed: {}", self.info.name, e),
                Some(format!("{:#}", e)),
            ),
            Err(panic) => NodeResult::exception(
                format!("Node '{}' panicked", self.info.name),
                Some(panic_message(panic.as_ref())),
            ),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::EventSink;
    use nodeflow_types::{RunRequest, StringFormatterNodeResult, PREVIOUS_NODE_FAILED};
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    struct Counting {
        runs: AtomicUsize,
        behavior: fn() -> Result<NodeResult>,
    }

    #[async_trait]
    impl NodeLogic for Counting {
        async fn run(&self, _node: &NodeInfo, _inputs: &[NodeInput], _ctx: &AgentContext) -> Result<NodeResult> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            (self.behavior)()
        }
    }

    fn ok() -> Result<NodeResult> {
        Ok(NodeResult::StringFormatter(StringFormatterNodeResult { text: "done".to_string() }))
    }

    fn fails() -> Result<NodeResult> {
        anyhow::bail!("backend unavailable")
    }

    fn panics() -> Result<NodeResult> {
        panic!("index out of bounds")
    }

    fn node(id: &str, inputs: &[&str], behavior: fn() -> Result<NodeResult>) -> (AgentNode, Arc<Counting>) {
        let logic = Arc::new(Counting {
            runs: AtomicUsize::new(0),
            behavior,
        });
        let node = AgentNode::new(
            NodeInfo {
                id: id.to_string(),
                name: format!("{}-name", id),
                node_type: NodeType::StringFormatter,
            },
            inputs.iter().map(|s| s.to_string()).collect(),
            Vec::new(),
            logic.clone(),
        );
        (node, logic)
    }

    fn context() -> (AgentContext, mpsc::Receiver<RunEvent>) {
        let (sink, rx) = EventSink::channel(16);
        let ctx = AgentContext::new(
            &RunRequest::from_user_message("hi"),
            HashMap::new(),
            sink,
            CancellationToken::new(),
        );
        (ctx, rx)
    }

    #[tokio::test]
    async fn test_lifecycle_events_and_status() {
        let (ctx, mut rx) = context();
        let (node, _) = node("a", &[], ok);
        assert_eq!(node.status(), NodeStatus::NotStarted);

        let result = node.execute(&ctx).await.unwrap();
        assert_eq!(result.text(), "done");
        assert_eq!(node.status(), NodeStatus::Completed);
        assert_eq!(ctx.result("a").await, Some(result));

        let Some(RunEvent::NodeStart { event_id: start_id, .. }) = rx.recv().await else {
            panic!("expected node start");
        };
        let Some(RunEvent::NodeEnd { event_id: end_id, .. }) = rx.recv().await else {
            panic!("expected node end");
        };
        assert_eq!(start_id, end_id);
    }

    #[tokio::test]
    async fn test_failed_dependency_short_circuits() {
        let (ctx, _rx) = context();
        ctx.add_result("upstream", NodeResult::exception("boom", None)).await.unwrap();
        let (node, logic) = node("b", &["upstream"], ok);

        let result = node.execute(&ctx).await.unwrap();

        assert_eq!(result.text(), PREVIOUS_NODE_FAILED);
        assert_eq!(logic.runs.load(Ordering::SeqCst), 0);
        assert_eq!(node.status(), NodeStatus::Completed);
    }

    #[tokio::test]
    async fn test_errors_and_panics_become_exceptions() {
        let (ctx, _rx) = context();

        let (failing, _) = node("f", &[], fails);
        match failing.execute(&ctx).await.unwrap() {
            NodeResult::Exception(e) => assert!(e.error.unwrap().contains("backend unavailable")),
            other => panic!("expected exception, got {:?}", other),
        }

        let (panicking, _) = node("p", &[], panics);
        match panicking.execute(&ctx).await.unwrap() {
            NodeResult::Exception(e) => assert_eq!(e.error.as_deref(), Some("index out of bounds")),
            other => panic!("expected exception, got {:?}", other),
        }
        assert!(ctx.result("p").await.unwrap().is_exception());
    }

    #[tokio::test]
    async fn test_node_runs_only_once() {
        let (ctx, _rx) = context();
        let (node, logic) = node("once", &[], ok);

        node.execute(&ctx).await.unwrap();
        assert!(matches!(node.execute(&ctx).await, Err(GraphError::NodeAlreadyStarted(_))));
        assert_eq!(logic.runs.load(Ordering::SeqCst), 1);
    }
}
