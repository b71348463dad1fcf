use nodeflow_types::{ExecutionDetails, InputDetails, NodeId, NodeResult, RunRequest};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{GraphError, Result};
use crate::sink::EventSink;
use crate::tools::Posture;

/// Per-run shared state.
///
/// Node results are write-once: the first registration for a node id wins and
/// any later attempt is rejected. Everything else is read-only for the run.
pub struct AgentContext {
    results: RwLock<HashMap<NodeId, NodeResult>>,
    prompts: HashMap<String, String>,
    input: InputDetails,
    execution: ExecutionDetails,
    sink: EventSink,
    posture: Posture,
    cancel: CancellationToken,
    node_names: HashMap<NodeId, String>,
}

impl AgentContext {
    pub fn new(
        request: &RunRequest,
        node_names: HashMap<NodeId, String>,
        sink: EventSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            results: RwLock::new(HashMap::new()),
            prompts: request.prompts.clone(),
            input: request.input.clone(),
            execution: request.execution_details(),
            sink,
            posture: Posture::new(request.scopes.iter().cloned()),
            cancel,
            node_names,
        }
    }

    pub fn with_graph_id(mut self, graph_id: Option<String>) -> Self {
        self.execution.graph_id = graph_id;
        self
    }

    pub async fn add_result(&self, node_id: &str, result: NodeResult) -> Result<()> {
        let mut results = self.results.write().await;
        if results.contains_key(node_id) {
            return Err(GraphError::DuplicateResult(node_id.to_string()));
        }
        results.insert(node_id.to_string(), result);
        Ok(())
    }

    pub async fn result(&self, node_id: &str) -> Option<NodeResult> {
        self.results.read().await.get(node_id).cloned()
    }

    /// Results for `node_ids`, in order.
    ///
    /// A dependency without a registered result reads as an exception, so the
    /// consumer short-circuits instead of running on partial input.
    pub async fn get_dependent_results(&self, node_ids: &[NodeId]) -> Vec<NodeResult> {
        let results = self.results.read().await;
        node_ids
            .iter()
            .map(|id| {
                results.get(id).cloned().unwrap_or_else(|| {
                    NodeResult::exception(format!("No result registered for node '{}'", id), None)
                })
            })
            .collect()
    }

    /// Text of every registered result, keyed by node name
    pub async fn texts_by_name(&self) -> BTreeMap<String, String> {
        self.results
            .read()
            .await
            .iter()
            .map(|(id, result)| (self.node_name(id).to_string(), result.text()))
            .collect()
    }

    pub async fn snapshot(&self) -> HashMap<NodeId, NodeResult> {
        self.results.read().await.clone()
    }

    pub fn node_name<'a>(&'a self, node_id: &'a str) -> &'a str {
        self.node_names.get(node_id).map(String::as_str).unwrap_or(node_id)
    }

    pub fn prompt(&self, prompt_id: &str) -> Option<&str> {
        self.prompts.get(prompt_id).map(String::as_str)
    }

    pub fn input(&self) -> &InputDetails {
        &self.input
    }

    pub fn execution(&self) -> &ExecutionDetails {
        &self.execution
    }

    pub fn execution_id(&self) -> &str {
        &self.execution.execution_id
    }

    pub fn sink(&self) -> &EventSink {
        &self.sink
    }

    pub fn posture(&self) -> &Posture {
        &self.posture
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_types::StringFormatterNodeResult;
    use std::sync::Arc;

    fn context() -> AgentContext {
        let (sink, _rx) = EventSink::channel(8);
        let names = HashMap::from([("n1".to_string(), "greeting".to_string())]);
        AgentContext::new(
            &RunRequest::from_user_message("hi").with_prompt("p", "Be nice"),
            names,
            sink,
            CancellationToken::new(),
        )
    }

    fn text(value: &str) -> NodeResult {
        NodeResult::StringFormatter(StringFormatterNodeResult {
            text: value.to_string(),
        })
    }

    #[tokio::test]
    async fn test_second_result_is_rejected() {
        let ctx = context();
        ctx.add_result("n1", text("first")).await.unwrap();

        let err = ctx.add_result("n1", text("second")).await.unwrap_err();
        assert!(matches!(err, GraphError::DuplicateResult(id) if id == "n1"));
        assert_eq!(ctx.result("n1").await.unwrap().text(), "first");
    }

    #[tokio::test]
    async fn test_concurrent_writers_register_once() {
        let ctx = Arc::new(context());
        let mut handles = Vec::new();
        for i in 0..16 {
            let ctx = Arc::clone(&ctx);
            handles.push(tokio::spawn(async move { ctx.add_result("n1", text(&i.to_string())).await.is_ok() }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }

    #[tokio::test]
    async fn test_missing_dependency_reads_as_exception() {
        let ctx = context();
        ctx.add_result("n1", text("ok")).await.unwrap();

        let results = ctx.get_dependent_results(&["n1".to_string(), "ghost".to_string()]).await;
        assert!(!results[0].is_exception());
        assert!(results[1].is_exception());
    }

    #[tokio::test]
    async fn test_lookups() {
        let ctx = context();
        ctx.add_result("n1", text("hello")).await.unwrap();

        assert_eq!(ctx.prompt("p"), Some("Be nice"));
        assert_eq!(ctx.node_name("n1"), "greeting");
        assert_eq!(ctx.node_name("n2"), "n2");
        assert_eq!(ctx.texts_by_name().await["greeting"], "hello");
        assert_eq!(ctx.input().latest().unwrap().content, "hi");
    }
}
