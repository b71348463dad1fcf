use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use nodeflow_llm::{
    ChatProvider, ChatRequest, ClientFactory, LlmError, Message, NoTools, ProviderConfig, StreamItem,
};

fn sse_body(payloads: &[serde_json::Value], done: bool) -> String {
    let mut body: String = payloads
        .iter()
        .map(|p| format!("data: {}\n\n", p))
        .collect();
    if done {
        body.push_str("data: [DONE]\n\n");
    }
    body
}

#[tokio::test]
async fn test_openai_stream_over_http() {
    let mut server = mockito::Server::new_async().await;
    let body = sse_body(
        &[
            json!({"id": "chatcmpl-7", "choices": [{"index": 0, "delta": {"content": "2+2"}, "finish_reason": null}]}),
            json!({"id": "chatcmpl-7", "choices": [{"index": 0, "delta": {"content": " = 4"}, "finish_reason": "stop"}]}),
        ],
        true,
    );
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let provider = ClientFactory::create_provider(ProviderConfig::openai("sk-test").with_base_url(server.url()))
        .unwrap();
    let request = ChatRequest::new("gpt-4o-mini", vec![Message::user("What is 2+2?")]);

    let items: Vec<StreamItem> = provider
        .stream(request, Vec::new(), Arc::new(NoTools), CancellationToken::new())
        .map(|item| item.unwrap())
        .collect()
        .await;

    mock.assert_async().await;
    let text: String = items.iter().filter_map(StreamItem::fragment_text).collect();
    assert_eq!(text, "2+2 = 4");
    assert!(items.first().unwrap().is_chat_start());
    assert!(items.last().unwrap().is_chat_end());
}

#[tokio::test]
async fn test_anthropic_stream_over_http_without_done_marker() {
    let mut server = mockito::Server::new_async().await;
    let events = [
        ("message_start", json!({"type": "message_start", "message": {"id": "msg_1", "usage": {"input_tokens": 4}}})),
        ("content_block_delta", json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "4"}})),
        ("message_stop", json!({"type": "message_stop"})),
    ];
    let body: String = events
        .iter()
        .map(|(name, data)| format!("event: {}\ndata: {}\n\n", name, data))
        .collect();
    let mock = server
        .mock("POST", "/v1/messages")
        .match_header("x-api-key", "ant-test")
        .match_header("anthropic-version", "2023-06-01")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let provider =
        ClientFactory::create_provider(ProviderConfig::anthropic("ant-test").with_base_url(server.url())).unwrap();
    let request = ChatRequest::new("claude-haiku-4-5", vec![Message::user("2+2?")]);

    let items: Vec<StreamItem> = provider
        .stream(request, Vec::new(), Arc::new(NoTools), CancellationToken::new())
        .map(|item| item.unwrap())
        .collect()
        .await;

    mock.assert_async().await;
    let text: String = items.iter().filter_map(StreamItem::fragment_text).collect();
    assert_eq!(text, "4");
}

#[tokio::test]
async fn test_non_success_status_becomes_api_error() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/models/gemini-2.5-flash:generateContent")
        .with_status(401)
        .with_body(r#"{"error":{"message":"API key not valid"}}"#)
        .create_async()
        .await;

    let provider = ClientFactory::create_provider(ProviderConfig::gemini("bad").with_base_url(server.url())).unwrap();
    let request = ChatRequest::new("gemini-2.5-flash", vec![Message::user("Hi")]);

    let results: Vec<_> = provider
        .call(request, Vec::new(), Arc::new(NoTools), CancellationToken::new())
        .collect()
        .await;

    mock.assert_async().await;
    assert_eq!(results.len(), 1);
    match &results[0] {
        Err(LlmError::Api { provider, status, body }) => {
            assert_eq!(*provider, "gemini");
            assert_eq!(*status, 401);
            assert!(body.contains("API key not valid"));
        }
        other => panic!("expected api error, got {:?}", other),
    }
}
