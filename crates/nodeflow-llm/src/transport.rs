// HTTP seam between the provider dialects and the network

use async_trait::async_trait;
use futures::stream;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::buffer_utils::{sse_data_stream, DataStream};
use crate::error::{LlmError, Result};

/// A fully-rendered vendor request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl HttpRequest {
    pub fn new(url: impl Into<String>, body: Value) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Sends rendered requests to a vendor.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Single JSON request/response
    async fn post_json(&self, provider: &'static str, request: HttpRequest) -> Result<Value>;

    /// Request answered with server-sent events; yields each `data:` payload
    async fn stream_sse(&self, provider: &'static str, request: HttpRequest) -> Result<DataStream>;
}

/// reqwest-backed transport (no SDKs)
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http_client })
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    async fn send(&self, provider: &'static str, request: HttpRequest) -> Result<reqwest::Response> {
        let mut builder = self.http_client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                provider,
                status,
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn post_json(&self, provider: &'static str, request: HttpRequest) -> Result<Value> {
        let response = self.send(provider, request).await?;
        Ok(response.json().await?)
    }

    async fn stream_sse(&self, provider: &'static str, request: HttpRequest) -> Result<DataStream> {
        let response = self.send(provider, request).await?;
        Ok(sse_data_stream(response))
    }
}

/// One canned vendor reply for `MockTransport`
#[derive(Debug, Clone)]
pub enum MockRound {
    /// `data:` payloads of a streamed reply
    Sse(Vec<String>),
    /// Body of a non-streamed reply
    Json(Value),
    /// Non-2xx reply
    Error { status: u16, body: String },
}

impl MockRound {
    pub fn sse<I, S>(payloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Sse(payloads.into_iter().map(Into::into).collect())
    }
}

/// Mock transport for testing.
/// Replays scripted rounds in order and records every request it receives.
#[derive(Default)]
pub struct MockTransport {
    rounds: Mutex<VecDeque<MockRound>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new(rounds: Vec<MockRound>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn remaining_rounds(&self) -> usize {
        self.rounds.lock().map(|rounds| rounds.len()).unwrap_or(0)
    }

    fn next_round(&self, provider: &'static str, request: HttpRequest) -> Result<MockRound> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let round = self.rounds.lock().ok().and_then(|mut rounds| rounds.pop_front());
        match round {
            Some(MockRound::Error { status, body }) => Err(LlmError::Api {
                provider,
                status,
                body,
            }),
            Some(round) => Ok(round),
            None => Err(LlmError::Stream("mock transport has no rounds left".to_string())),
        }
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn post_json(&self, provider: &'static str, request: HttpRequest) -> Result<Value> {
        match self.next_round(provider, request)? {
            MockRound::Json(body) => Ok(body),
            other => Err(LlmError::Stream(format!(
                "expected a JSON round, found {:?}",
                other
            ))),
        }
    }

    async fn stream_sse(&self, provider: &'static str, request: HttpRequest) -> Result<DataStream> {
        match self.next_round(provider, request)? {
            MockRound::Sse(payloads) => Ok(Box::pin(stream::iter(payloads.into_iter().map(Ok)))),
            other => Err(LlmError::Stream(format!(
                "expected an SSE round, found {:?}",
                other
            ))),
        }
    }
}
