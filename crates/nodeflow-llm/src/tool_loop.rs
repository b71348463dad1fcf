//! Provider-independent "model call -> tool call -> model call" driver.
//!
//! Each vendor contributes a [`Dialect`]: how to render its request, how to
//! read its replies into [`RoundEvent`]s, and how tool traffic is appended to
//! its native transcript. [`ToolLoopProvider`] runs the rounds, stamps the
//! correlation ids and awaits tool callbacks one at a time.

use futures::{stream, Stream, StreamExt};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::buffer_utils::DataStream;
use crate::error::{LlmError, Result};
use crate::streaming::{ItemStamp, ItemStream, StreamItem, StreamItemKind};
use crate::traits::{ChatProvider, Delivery};
use crate::transport::{ChatTransport, HttpRequest};
use crate::types::request::MAX_ROUNDS;
use crate::types::{ChatRequest, ToolCallback, ToolDefinition, ToolInvocation};

/// Inserted between rounds so the next round does not run on from the last text
pub const ROUND_PADDING: &str = "\n\n";

/// A vendor reply, normalized
#[derive(Debug, Clone, PartialEq)]
pub enum RoundEvent {
    Started {
        message_id: Option<String>,
    },
    Text(String),
    /// Tool call piece; pieces sharing an `index` belong to the same call
    ToolCallDelta {
        index: u32,
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    },
    Usage {
        input_tokens: u32,
        output_tokens: u32,
    },
    /// Vendor content that must be echoed back verbatim in the assistant turn
    Replay(Value),
    /// Vendor-reported failure that does not abort the call
    Exception(String),
}

/// Incremental parser for one streamed round
pub trait RoundParser: Send {
    fn parse_chunk(&mut self, data: &str) -> Result<Vec<RoundEvent>>;

    /// Called once the vendor stream ends
    fn finish(&mut self) -> Vec<RoundEvent> {
        Vec::new()
    }
}

/// What one round produced, handed back to the dialect to extend the transcript
#[derive(Debug, Clone, Default)]
pub struct RoundOutput {
    pub text: String,
    pub calls: Vec<ToolInvocation>,
    pub replay: Vec<Value>,
}

/// Vendor-specific translation layer
pub trait Dialect: Send + Sync + 'static {
    /// Vendor-native transcript entry
    type Message: Clone + Send + Sync + 'static;
    type Parser: RoundParser + 'static;

    const PROVIDER: &'static str;

    fn conversation(&self, request: &ChatRequest) -> Vec<Self::Message>;

    fn render(
        &self,
        request: &ChatRequest,
        conversation: &[Self::Message],
        tools: &[ToolDefinition],
        delivery: Delivery,
    ) -> Result<HttpRequest>;

    fn stream_parser(&self) -> Self::Parser;

    fn parse_response(&self, body: Value) -> Result<Vec<RoundEvent>>;

    fn push_assistant_turn(&self, conversation: &mut Vec<Self::Message>, round: &RoundOutput);

    fn push_tool_result(
        &self,
        conversation: &mut Vec<Self::Message>,
        call: &ToolInvocation,
        result: &Value,
    );
}

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Reassembles tool calls from deltas, keyed by stream index
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    partials: BTreeMap<u32, PartialCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        index: u32,
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    ) {
        let entry = self.partials.entry(index).or_default();

        if let Some(id) = id.filter(|id| !id.is_empty()) {
            entry.id.get_or_insert(id);
        }
        if let Some(name) = name.filter(|name| !name.is_empty()) {
            entry.name.get_or_insert(name);
        }
        if let Some(args) = arguments {
            entry.arguments.push_str(&args);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.partials.is_empty()
    }

    /// Completed calls in index order
    pub fn finish(self) -> Result<Vec<ToolInvocation>> {
        self.partials
            .into_iter()
            .map(|(index, partial)| {
                let id = partial.id.ok_or_else(|| {
                    LlmError::MissingToolArgument(format!("tool call at index {} has no id", index))
                })?;
                let name = partial.name.ok_or_else(|| {
                    LlmError::MissingToolArgument(format!("tool call '{}' has no name", id))
                })?;
                let arguments = if partial.arguments.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&partial.arguments)?
                };

                Ok(ToolInvocation {
                    id,
                    name,
                    index,
                    arguments,
                })
            })
            .collect()
    }
}

type RoundEvents = Pin<Box<dyn Stream<Item = Result<RoundEvent>> + Send>>;

/// Chat adapter built from a dialect and a transport
pub struct ToolLoopProvider<D: Dialect> {
    dialect: Arc<D>,
    transport: Arc<dyn ChatTransport>,
}

impl<D: Dialect> ToolLoopProvider<D> {
    pub fn with_transport(dialect: D, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            dialect: Arc::new(dialect),
            transport,
        }
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    fn drive(
        &self,
        delivery: Delivery,
        request: ChatRequest,
        tools: Vec<ToolDefinition>,
        callback: Arc<dyn ToolCallback>,
        cancel: CancellationToken,
    ) -> ItemStream {
        Box::pin(tool_loop(
            Arc::clone(&self.dialect),
            Arc::clone(&self.transport),
            delivery,
            request,
            tools,
            callback,
            cancel,
        ))
    }
}

impl<D: Dialect> ChatProvider for ToolLoopProvider<D> {
    fn provider_name(&self) -> &'static str {
        D::PROVIDER
    }

    fn stream(
        &self,
        request: ChatRequest,
        tools: Vec<ToolDefinition>,
        callback: Arc<dyn ToolCallback>,
        cancel: CancellationToken,
    ) -> ItemStream {
        self.drive(Delivery::Streaming, request, tools, callback, cancel)
    }

    fn call(
        &self,
        request: ChatRequest,
        tools: Vec<ToolDefinition>,
        callback: Arc<dyn ToolCallback>,
        cancel: CancellationToken,
    ) -> ItemStream {
        self.drive(Delivery::Single, request, tools, callback, cancel)
    }
}

async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LlmError::Cancelled),
        result = fut => result,
    }
}

fn parse_stream<P: RoundParser + 'static>(
    mut data: DataStream,
    mut parser: P,
) -> impl Stream<Item = Result<RoundEvent>> + Send {
    async_stream::try_stream! {
        while let Some(chunk) = data.next().await {
            let chunk = chunk?;
            for event in parser.parse_chunk(&chunk)? {
                yield event;
            }
        }
        for event in parser.finish() {
            yield event;
        }
    }
}

async fn open_round<D: Dialect>(
    dialect: &D,
    transport: &dyn ChatTransport,
    http: HttpRequest,
    delivery: Delivery,
) -> Result<RoundEvents> {
    match delivery {
        Delivery::Streaming => {
            let data = transport.stream_sse(D::PROVIDER, http).await?;
            Ok(Box::pin(parse_stream(data, dialect.stream_parser())))
        }
        Delivery::Single => {
            let body = transport.post_json(D::PROVIDER, http).await?;
            let events = dialect.parse_response(body)?;
            Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
        }
    }
}

fn tool_loop<D: Dialect>(
    dialect: Arc<D>,
    transport: Arc<dyn ChatTransport>,
    delivery: Delivery,
    request: ChatRequest,
    tools: Vec<ToolDefinition>,
    callback: Arc<dyn ToolCallback>,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<StreamItem>> + Send {
    async_stream::try_stream! {
        let stamp = ItemStamp::new(request.id.clone());
        let mut conversation = dialect.conversation(&request);
        let mut round_number: u32 = 0;
        let max_rounds = request.get_u32(MAX_ROUNDS).filter(|max| *max > 0);

        tracing::debug!(
            provider = D::PROVIDER,
            chat_id = stamp.chat_id(),
            execution_id = %request.id,
            model = %request.model,
            tools = tools.len(),
            "Starting chat"
        );

        loop {
            if let Some(max) = max_rounds.filter(|max| round_number >= *max) {
                tracing::warn!(provider = D::PROVIDER, chat_id = stamp.chat_id(), max_rounds = max, "Round limit reached");
                yield stamp.item(StreamItemKind::ExceptionResult {
                    error: format!("Max rounds ({}) reached", max),
                });
                break;
            }

            round_number += 1;
            tracing::debug!(provider = D::PROVIDER, chat_id = stamp.chat_id(), round = round_number, "Opening round");

            let http = dialect.render(&request, &conversation, &tools, delivery)?;
            let mut events = until_cancelled(
                &cancel,
                open_round(dialect.as_ref(), transport.as_ref(), http, delivery),
            )
            .await?;

            let mut started = false;
            let mut calls = ToolCallAccumulator::new();
            let mut round = RoundOutput::default();

            loop {
                let next = until_cancelled(&cancel, async { Ok(events.next().await) }).await?;
                let Some(event) = next else { break };
                let event = event?;

                if !started {
                    let message_id = match &event {
                        RoundEvent::Started { message_id } => Some(message_id.clone()),
                        RoundEvent::Text(_) | RoundEvent::Usage { .. } | RoundEvent::Exception(_) => Some(None),
                        RoundEvent::ToolCallDelta { .. } | RoundEvent::Replay(_) => None,
                    };
                    if let Some(provider_message_id) = message_id {
                        started = true;
                        yield stamp.item(StreamItemKind::ChatStart {
                            model_name: request.model.clone(),
                            provider_message_id,
                        });
                    }
                }

                match event {
                    RoundEvent::Started { .. } => {}
                    RoundEvent::Text(delta) => {
                        if !delta.is_empty() {
                            round.text.push_str(&delta);
                            yield stamp.item(StreamItemKind::ChatFragment {
                                content: delta,
                                metadata: None,
                            });
                        }
                    }
                    RoundEvent::ToolCallDelta { index, id, name, arguments } => {
                        calls.push(index, id, name, arguments);
                    }
                    RoundEvent::Usage { input_tokens, output_tokens } => {
                        yield stamp.item(StreamItemKind::TokenUsage { input_tokens, output_tokens });
                    }
                    RoundEvent::Replay(value) => round.replay.push(value),
                    RoundEvent::Exception(error) => {
                        tracing::warn!(provider = D::PROVIDER, chat_id = stamp.chat_id(), "Vendor reported: {}", error);
                        yield stamp.item(StreamItemKind::ExceptionResult { error });
                    }
                }
            }

            if !started {
                yield stamp.item(StreamItemKind::ChatStart {
                    model_name: request.model.clone(),
                    provider_message_id: None,
                });
            }
            yield stamp.item(StreamItemKind::ChatEnd {});

            round.calls = calls.finish()?;
            if round.calls.is_empty() {
                tracing::debug!(provider = D::PROVIDER, chat_id = stamp.chat_id(), rounds = round_number, "Chat finished");
                break;
            }

            yield stamp.item(StreamItemKind::ChatFragment {
                content: ROUND_PADDING.to_string(),
                metadata: None,
            });

            dialect.push_assistant_turn(&mut conversation, &round);

            for call in &round.calls {
                yield stamp.item(StreamItemKind::ToolCall {
                    tool_call_id: call.id.clone(),
                    name: call.name.clone(),
                    index: call.index,
                    arguments: call.arguments.clone(),
                });

                let started_at = Instant::now();
                let outcome = until_cancelled(&cancel, async {
                    Ok(callback.call(&call.name, call.arguments.clone(), &call.id).await)
                })
                .await?;

                let result = match outcome {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!(tool = %call.name, tool_call_id = %call.id, "Tool failed: {:#}", e);
                        json!({ "error": e.to_string() })
                    }
                };

                yield stamp.item(StreamItemKind::ToolResult {
                    tool_call_id: call.id.clone(),
                    result: result.clone(),
                    duration_ms: started_at.elapsed().as_millis() as u64,
                });

                dialect.push_tool_result(&mut conversation, call, &result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_sharing_index_are_concatenated() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(0, Some("call_1".into()), Some("sum".into()), Some("{\"a\":1".into()));
        acc.push(0, None, None, Some("}".into()));

        let calls = acc.finish().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, json!({"a": 1}));
        assert_eq!(calls[0].name, "sum");
    }

    #[test]
    fn test_calls_come_out_in_index_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(1, Some("b".into()), Some("second".into()), Some("{}".into()));
        acc.push(0, Some("a".into()), Some("first".into()), Some("{}".into()));

        let names: Vec<String> = acc.finish().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(0, Some("call_1".into()), None, Some("{}".into()));

        let err = acc.finish().unwrap_err();
        assert!(matches!(err, LlmError::MissingToolArgument(_)));
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(0, None, Some("lookup".into()), None);

        assert!(matches!(acc.finish(), Err(LlmError::MissingToolArgument(_))));
    }

    #[test]
    fn test_empty_arguments_become_empty_object() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(0, Some("call_1".into()), Some("now".into()), None);

        assert_eq!(acc.finish().unwrap()[0].arguments, json!({}));
    }
}
