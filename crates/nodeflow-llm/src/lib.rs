pub mod anthropic;
pub mod buffer_utils;
pub mod config;
pub mod error;
pub mod gemini;
pub mod openai;
pub mod streaming;
pub mod tool_loop;
pub mod traits;
pub mod transport;
pub mod types;

pub use traits::{ChatProvider, Delivery};

pub use anthropic::AnthropicClient;
pub use config::{ClientFactory, ProviderConfig, ProviderDetails, ProviderType};
pub use error::{LlmError, Result};
pub use gemini::GeminiClient;
pub use openai::OpenAIClient;
pub use streaming::{ItemStream, StreamItem, StreamItemKind};
pub use tool_loop::{Dialect, RoundEvent, RoundOutput, RoundParser, ToolCallAccumulator, ToolLoopProvider};
pub use transport::{ChatTransport, HttpRequest, HttpTransport, MockRound, MockTransport};
pub use types::{ChatRequest, Message, NoTools, Role, ToolCallback, ToolDefinition, ToolInvocation};
