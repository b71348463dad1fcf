use nodeflow_llm::{ChatRequest, Message, Role, ToolDefinition};
use serde_json::json;

#[test]
fn test_message_constructors() {
    assert_eq!(Message::system("s").role, Role::System);
    assert_eq!(Message::user("u").role(), "user");
    assert_eq!(Message::assistant("a").role(), "assistant");
    assert!(Message::system("s").is_system());
}

#[test]
fn test_message_serialization() {
    let message = Message::user("Hello");
    let json = serde_json::to_value(&message).unwrap();

    assert_eq!(json, json!({"role": "user", "content": "Hello"}));
}

#[test]
fn test_chat_request_gets_fresh_id() {
    let a = ChatRequest::new("gpt-4o", vec![Message::user("Hi")]);
    let b = ChatRequest::new("gpt-4o", vec![Message::user("Hi")]);

    assert_ne!(a.id, b.id);
    assert_eq!(a.with_id("exec-1").id, "exec-1");
}

#[test]
fn test_chat_request_metadata() {
    let request = ChatRequest::new("gpt-4o", vec![Message::user("Hi")])
        .temperature(0.5)
        .max_tokens(100)
        .with_metadata("top_k", 40)
        .with_metadata("custom", "value");

    assert_eq!(request.get_f32("temperature"), Some(0.5));
    assert_eq!(request.get_u32("max_tokens"), Some(100));
    assert_eq!(request.get_u32("top_k"), Some(40));
    assert_eq!(request.get_u32("custom"), None);
    assert_eq!(request.metadata["custom"], "value");
}

#[test]
fn test_chat_request_deserializes_without_metadata() {
    let request: ChatRequest = serde_json::from_value(json!({
        "id": "r1",
        "model": "claude-sonnet-4-5",
        "messages": [{"role": "user", "content": "Hi"}]
    }))
    .unwrap();

    assert!(request.metadata.is_empty());
    assert_eq!(request.messages[0].content, "Hi");
}

#[test]
fn test_tool_definition_required_properties() {
    let tool = ToolDefinition::new(
        "get_weather",
        "Current weather for a city",
        json!({
            "type": "object",
            "properties": {"city": {"type": "string"}, "unit": {"type": "string"}},
            "required": ["city"]
        }),
    );

    assert_eq!(tool.required_properties(), vec!["city"]);

    let open = ToolDefinition::new("now", "", json!({"type": "object"}));
    assert!(open.required_properties().is_empty());
}
