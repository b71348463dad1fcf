// Configuration layer for provider-agnostic adapter creation
// Provides a factory for building chat providers from configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::anthropic::{AnthropicClient, AnthropicDialect, ANTHROPIC_VERSION};
use crate::error::{LlmError, Result};
use crate::gemini::{GeminiClient, GeminiDialect};
use crate::openai::{OpenAIClient, OpenAIDialect};
use crate::traits::ChatProvider;
use crate::transport::{ChatTransport, HttpTransport};

/// Type of LLM provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    OpenAI,
    Anthropic,
    Gemini,
}

impl ProviderType {
    pub const ALL: [ProviderType; 3] = [Self::OpenAI, Self::Anthropic, Self::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }

    /// Prefix of the environment variables holding this provider's settings
    fn env_prefix(&self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI",
            Self::Anthropic => "ANTHROPIC",
            Self::Gemini => "GEMINI",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" => Ok(Self::Gemini),
            other => Err(LlmError::Config(format!("unknown provider '{}'", other))),
        }
    }
}

/// Configuration shared by the OpenAI and Gemini providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    pub api_key: String,
    /// Overrides the vendor's default endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ApiKeyConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

/// Configuration for the Anthropic provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_anthropic_version")]
    pub api_version: String,
}

fn default_anthropic_version() -> String {
    ANTHROPIC_VERSION.to_string()
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            api_version: default_anthropic_version(),
        }
    }
}

/// Provider-specific configuration details
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderDetails {
    OpenAI(ApiKeyConfig),
    Anthropic(AnthropicConfig),
    Gemini(ApiKeyConfig),
}

/// Complete provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(flatten)]
    pub details: ProviderDetails,
}

impl ProviderConfig {
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            details: ProviderDetails::OpenAI(ApiKeyConfig::new(api_key)),
        }
    }

    pub fn anthropic(api_key: impl Into<String>) -> Self {
        Self {
            details: ProviderDetails::Anthropic(AnthropicConfig::new(api_key)),
        }
    }

    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self {
            details: ProviderDetails::Gemini(ApiKeyConfig::new(api_key)),
        }
    }

    /// Point the provider at a different endpoint (proxies, test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = Some(base_url.into());
        match &mut self.details {
            ProviderDetails::OpenAI(c) | ProviderDetails::Gemini(c) => c.base_url = base_url,
            ProviderDetails::Anthropic(c) => c.base_url = base_url,
        }
        self
    }

    pub fn provider_type(&self) -> ProviderType {
        match self.details {
            ProviderDetails::OpenAI(_) => ProviderType::OpenAI,
            ProviderDetails::Anthropic(_) => ProviderType::Anthropic,
            ProviderDetails::Gemini(_) => ProviderType::Gemini,
        }
    }

    /// Read `<PREFIX>_API_KEY` and the optional `<PREFIX>_BASE_URL` from the environment
    pub fn from_env(provider: ProviderType) -> Result<Self> {
        Self::from_lookup(provider, |name| std::env::var(name).ok())
    }

    /// Every provider whose API key is present in the environment
    pub fn all_from_env() -> Vec<Self> {
        ProviderType::ALL
            .iter()
            .filter_map(|provider| Self::from_env(*provider).ok())
            .collect()
    }

    fn from_lookup(provider: ProviderType, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let prefix = provider.env_prefix();
        let key_var = format!("{}_API_KEY", prefix);
        let api_key = lookup(&key_var)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| LlmError::Config(format!("{} is not set", key_var)))?;

        let config = match provider {
            ProviderType::OpenAI => Self::openai(api_key),
            ProviderType::Anthropic => Self::anthropic(api_key),
            ProviderType::Gemini => Self::gemini(api_key),
        };

        Ok(match lookup(&format!("{}_BASE_URL", prefix)) {
            Some(base_url) if !base_url.trim().is_empty() => config.with_base_url(base_url),
            _ => config,
        })
    }
}

/// Factory for creating chat providers from configuration
pub struct ClientFactory;

impl ClientFactory {
    pub fn create_provider(config: ProviderConfig) -> Result<Arc<dyn ChatProvider>> {
        Self::create_provider_with_transport(config, Arc::new(HttpTransport::new()?))
    }

    /// Same as `create_provider`, over a caller-supplied transport
    pub fn create_provider_with_transport(
        config: ProviderConfig,
        transport: Arc<dyn ChatTransport>,
    ) -> Result<Arc<dyn ChatProvider>> {
        tracing::debug!(provider = %config.provider_type(), "Creating chat provider");

        let provider: Arc<dyn ChatProvider> = match config.details {
            ProviderDetails::OpenAI(c) => {
                let mut dialect = OpenAIDialect::new(c.api_key);
                if let Some(base_url) = c.base_url {
                    dialect = dialect.with_base_url(base_url);
                }
                Arc::new(OpenAIClient::with_transport(dialect, transport))
            }
            ProviderDetails::Anthropic(c) => {
                let mut dialect = AnthropicDialect::new(c.api_key).with_api_version(c.api_version);
                if let Some(base_url) = c.base_url {
                    dialect = dialect.with_base_url(base_url);
                }
                Arc::new(AnthropicClient::with_transport(dialect, transport))
            }
            ProviderDetails::Gemini(c) => {
                let mut dialect = GeminiDialect::new(c.api_key);
                if let Some(base_url) = c.base_url {
                    dialect = dialect.with_base_url(base_url);
                }
                Arc::new(GeminiClient::with_transport(dialect, transport))
            }
        };

        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_provider_type_from_config() {
        assert_eq!(ProviderConfig::openai("k").provider_type(), ProviderType::OpenAI);
        assert_eq!(ProviderConfig::anthropic("k").provider_type(), ProviderType::Anthropic);
        assert_eq!(ProviderConfig::gemini("k").provider_type(), ProviderType::Gemini);
    }

    #[test]
    fn test_provider_type_parsing() {
        assert_eq!("Gemini".parse::<ProviderType>().unwrap(), ProviderType::Gemini);
        assert!("mistral".parse::<ProviderType>().is_err());
    }

    #[test]
    fn test_lookup_reads_key_and_base_url() {
        let env: HashMap<&str, &str> = [
            ("ANTHROPIC_API_KEY", "sk-ant"),
            ("ANTHROPIC_BASE_URL", "http://localhost:9000"),
        ]
        .into_iter()
        .collect();

        let config =
            ProviderConfig::from_lookup(ProviderType::Anthropic, |name| env.get(name).map(|v| v.to_string()))
                .unwrap();

        let ProviderDetails::Anthropic(details) = config.details else {
            panic!("expected anthropic details");
        };
        assert_eq!(details.api_key, "sk-ant");
        assert_eq!(details.base_url.as_deref(), Some("http://localhost:9000"));
        assert_eq!(details.api_version, ANTHROPIC_VERSION);
    }

    #[test]
    fn test_lookup_without_key_fails() {
        let result = ProviderConfig::from_lookup(ProviderType::Gemini, |_| None);
        assert!(matches!(result, Err(LlmError::Config(_))));
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = ProviderConfig::gemini("test-key").with_base_url("http://proxy");

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "gemini");

        let deserialized: ProviderConfig = serde_json::from_value(json).unwrap();
        assert_eq!(deserialized.provider_type(), ProviderType::Gemini);
    }

    #[test]
    fn test_factory_builds_named_providers() {
        let transport: Arc<dyn ChatTransport> = Arc::new(crate::transport::MockTransport::default());
        for config in [
            ProviderConfig::openai("k"),
            ProviderConfig::anthropic("k"),
            ProviderConfig::gemini("k"),
        ] {
            let expected = config.provider_type();
            let provider =
                ClientFactory::create_provider_with_transport(config, Arc::clone(&transport)).unwrap();
            assert_eq!(provider.provider_name(), expected.as_str());
        }
    }
}
