use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("JSON error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    /// A tool call reconstructed from the vendor response lacks its id or name.
    #[error("Missing tool argument: {0}")]
    MissingToolArgument(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LlmError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
