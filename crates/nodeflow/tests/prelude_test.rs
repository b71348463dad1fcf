use nodeflow::prelude::*;
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_prelude_runs_a_formatter_graph() {
    let definition = GraphDefinition::new()
        .node("in", "name", NodeType::Input, json!(null))
        .node("greet", "greeting", NodeType::StringFormatter, json!({"template": "Hello, {{ inputs.name }}!"}))
        .node("out", "result", NodeType::Output, json!(null))
        .edge("in", "greet")
        .edge("greet", "out");
    let graph = GraphBuilder::new(definition).build().unwrap();

    let (sink, _rx) = EventSink::channel(32);
    let outcome = graph
        .execute(RunRequest::from_user_message("Ada"), sink, CancellationToken::new())
        .await;

    assert_eq!(outcome.status, RunStatus::Success);
    assert_eq!(outcome.result("out").map(NodeResult::text).as_deref(), Some("Hello, Ada!"));
}
