mod client;

pub use client::{OpenAIClient, OpenAIDialect, OpenAIStreamParser, OPENAI_API_BASE};
