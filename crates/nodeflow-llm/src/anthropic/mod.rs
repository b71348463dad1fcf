mod client;

pub use client::{AnthropicClient, AnthropicDialect, AnthropicMessage, AnthropicStreamParser, ANTHROPIC_API_BASE, ANTHROPIC_VERSION};
