use chrono::Utc;
use nodeflow_types::{
    GraphConfig, GraphDefinition, NodeId, NodeResult, RunEvent, RunRequest, RunStatus,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::builder::GraphBuilder;
use crate::context::AgentContext;
use crate::node::{AgentNode, NodeInfo, NodeLogic};
use crate::sink::EventSink;

/// Everything needed to instantiate one node for a run
pub(crate) struct NodeTemplate {
    pub info: NodeInfo,
    pub inputs: Vec<NodeId>,
    pub outputs: Vec<NodeId>,
    pub logic: Arc<dyn NodeLogic>,
}

impl NodeTemplate {
    fn instantiate(&self) -> Arc<AgentNode> {
        Arc::new(AgentNode::new(
            self.info.clone(),
            self.inputs.clone(),
            self.outputs.clone(),
            Arc::clone(&self.logic),
        ))
    }
}

/// Final state of one run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub execution_id: String,
    pub status: RunStatus,
    pub results: HashMap<NodeId, NodeResult>,
    pub duration_ms: u64,
}

impl RunOutcome {
    pub fn result(&self, node_id: &str) -> Option<&NodeResult> {
        self.results.get(node_id)
    }
}

/// A validated, immutable node graph. Each run gets fresh node instances,
/// so one Graph can serve many runs, sequentially or at once.
#[derive(Clone)]
pub struct Graph {
    id: Option<String>,
    templates: Arc<[NodeTemplate]>,
    config: GraphConfig,
}

impl Graph {
    pub(crate) fn new(id: Option<String>, templates: Vec<NodeTemplate>, config: GraphConfig) -> Self {
        Self {
            id,
            templates: templates.into(),
            config,
        }
    }

    /// Create a builder for fluent construction
    pub fn builder(definition: GraphDefinition) -> GraphBuilder {
        GraphBuilder::new(definition)
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Node ids in topological order
    pub fn node_ids(&self) -> Vec<&str> {
        self.templates.iter().map(|t| t.info.id.as_str()).collect()
    }

    /// Spawn a run in the background; returns the event receiver, the run
    /// handle and the token that cancels it
    pub fn spawn_run(
        &self,
        request: RunRequest,
    ) -> (mpsc::Receiver<RunEvent>, JoinHandle<RunOutcome>, CancellationToken) {
        let (sink, rx) = EventSink::channel(self.config.event_buffer);
        let cancel = CancellationToken::new();

        let graph = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { graph.execute(request, sink, token).await });

        (rx, handle, cancel)
    }

    /// Run every node whose dependencies are satisfied, in parallel up to
    /// `max_concurrency`, until nothing is left to run or the run is cancelled
    pub async fn execute(&self, request: RunRequest, sink: EventSink, cancel: CancellationToken) -> RunOutcome {
        let started = Instant::now();
        let execution_id = request.execution_id.clone();
        let run_token = cancel.child_token();

        let node_names = self
            .templates
            .iter()
            .map(|t| (t.info.id.clone(), t.info.name.clone()))
            .collect();
        let ctx = Arc::new(
            AgentContext::new(&request, node_names, sink.clone(), run_token.clone()).with_graph_id(self.id.clone()),
        );

        tracing::info!(
            execution_id = %execution_id,
            graph_id = self.id.as_deref().unwrap_or("-"),
            nodes = self.templates.len(),
            "Run started"
        );
        let start = RunEvent::RunStart {
            execution_id: execution_id.clone(),
            graph_id: self.id.clone(),
            timestamp: Utc::now(),
        };
        if let Err(e) = sink.send(start).await {
            tracing::warn!(execution_id = %execution_id, "Failed to emit run start: {}", e);
        }

        let timer = {
            let token = run_token.clone();
            let timeout = self.config.execution_timeout;
            let execution_id = execution_id.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(timeout) => {
                        tracing::warn!(execution_id = %execution_id, timeout_secs = timeout.as_secs(), "Run timed out, cancelling");
                        token.cancel();
                    }
                }
            })
        };

        self.schedule(&ctx, &run_token).await;
        timer.abort();

        let results = ctx.snapshot().await;
        let status = if run_token.is_cancelled() {
            RunStatus::Cancelled
        } else if results.values().any(NodeResult::is_exception) {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(execution_id = %execution_id, status = ?status, duration_ms, "Run finished");
        let end = RunEvent::RunEnd {
            execution_id: execution_id.clone(),
            status,
            duration_ms,
        };
        if let Err(e) = sink.send(end).await {
            tracing::warn!(execution_id = %execution_id, "Failed to emit run end: {}", e);
        }

        RunOutcome {
            execution_id,
            status,
            results,
            duration_ms,
        }
    }

    async fn schedule(&self, ctx: &Arc<AgentContext>, cancel: &CancellationToken) {
        let nodes: Vec<Arc<AgentNode>> = self.templates.iter().map(NodeTemplate::instantiate).collect();
        let position: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, n)| (n.id(), i)).collect();
        let mut pending: Vec<usize> = nodes.iter().map(|n| n.inputs().len()).collect();
        let mut ready: VecDeque<usize> = (0..nodes.len()).filter(|&i| pending[i] == 0).collect();

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks: JoinSet<(usize, bool)> = JoinSet::new();

        loop {
            while !cancel.is_cancelled() {
                let Some(index) = ready.pop_front() else { break };
                let node = Arc::clone(&nodes[index]);
                let ctx = Arc::clone(ctx);
                let semaphore = Arc::clone(&semaphore);
                let token = cancel.clone();

                tasks.spawn(async move {
                    let _permit = tokio::select! {
                        biased;
                        _ = token.cancelled() => return (index, false),
                        permit = semaphore.acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => return (index, false),
                        },
                    };

                    match node.execute(&ctx).await {
                        Ok(_) => (index, true),
                        Err(e) => {
                            tracing::error!(node_id = %node.id(), "{}", e);
                            (index, false)
                        }
                    }
                });
            }

            let Some(joined) = tasks.join_next().await else { break };
            match joined {
                Ok((index, true)) => {
                    for next in nodes[index].outputs() {
                        let Some(&next) = position.get(next.as_str()) else { continue };
                        pending[next] -= 1;
                        if pending[next] == 0 {
                            ready.push_back(next);
                        }
                    }
                }
                Ok((index, false)) => {
                    tracing::debug!(node_id = %nodes[index].id(), "Node skipped");
                }
                Err(e) => tracing::error!("Node task aborted: {}", e),
            }
        }

        if !ready.is_empty() {
            tracing::info!(skipped = ready.len(), "Run cancelled before all nodes were scheduled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_types::NodeType;
    use serde_json::{json, Value};

    fn formatter_chain() -> Graph {
        let definition = GraphDefinition::new()
            .with_id("chain")
            .node("in", "question", NodeType::Input, Value::Null)
            .node("fmt", "shout", NodeType::StringFormatter, json!({"template": "{{ inputs.question | upper }}"}))
            .node("out", "answer", NodeType::Output, Value::Null)
            .edge("in", "fmt")
            .edge("fmt", "out");
        Graph::builder(definition).build().unwrap()
    }

    #[tokio::test]
    async fn test_graph_is_rerunnable() {
        let graph = formatter_chain();

        for message in ["hello", "again"] {
            let (sink, _rx) = EventSink::channel(64);
            let outcome = graph
                .execute(RunRequest::from_user_message(message), sink, CancellationToken::new())
                .await;

            assert_eq!(outcome.status, RunStatus::Success);
            assert_eq!(outcome.result("out").unwrap().text(), message.to_uppercase());
        }
    }

    #[tokio::test]
    async fn test_spawn_run_events_bracket_the_run() {
        let graph = formatter_chain();
        let (mut rx, handle, _cancel) = graph.spawn_run(RunRequest::from_user_message("hi"));

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        let outcome = handle.await.unwrap();

        assert!(matches!(events.first(), Some(RunEvent::RunStart { graph_id: Some(id), .. }) if id == "chain"));
        assert!(events.last().unwrap().is_run_end());
        assert_eq!(events.len(), 2 + 2 * 3);
        assert_eq!(outcome.results.len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let graph = formatter_chain();
        let (sink, _rx) = EventSink::channel(64);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = graph.execute(RunRequest::from_user_message("hi"), sink, cancel).await;

        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert!(outcome.results.is_empty());
    }
}
