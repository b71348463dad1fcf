use nodeflow_llm::{ChatProvider, ClientFactory, LlmError, ProviderConfig, ProviderType};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{GraphError, Result};

/// Chat adapters available to Model nodes, by provider type
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderType, Arc<dyn ChatProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an adapter for every config through the client factory
    pub fn from_configs(configs: Vec<ProviderConfig>) -> std::result::Result<Self, LlmError> {
        let mut registry = Self::new();
        for config in configs {
            let provider_type = config.provider_type();
            registry.register(provider_type, ClientFactory::create_provider(config)?);
        }
        Ok(registry)
    }

    pub fn register(&mut self, provider_type: ProviderType, provider: Arc<dyn ChatProvider>) {
        tracing::info!(provider = %provider_type, "Registered chat provider");
        self.providers.insert(provider_type, provider);
    }

    pub fn with_provider(mut self, provider_type: ProviderType, provider: Arc<dyn ChatProvider>) -> Self {
        self.register(provider_type, provider);
        self
    }

    pub fn get(&self, provider_type: ProviderType) -> Result<Arc<dyn ChatProvider>> {
        self.providers
            .get(&provider_type)
            .cloned()
            .ok_or(GraphError::ProviderNotRegistered(provider_type))
    }

    pub fn contains(&self, provider_type: ProviderType) -> bool {
        self.providers.contains_key(&provider_type)
    }

    pub fn registered(&self) -> Vec<ProviderType> {
        self.providers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_llm::openai::OpenAIDialect;
    use nodeflow_llm::{MockTransport, OpenAIClient};

    #[test]
    fn test_lookup_by_type() {
        let client = OpenAIClient::with_transport(OpenAIDialect::new("k"), Arc::new(MockTransport::default()));
        let registry = ProviderRegistry::new().with_provider(ProviderType::OpenAI, Arc::new(client));

        assert!(registry.contains(ProviderType::OpenAI));
        assert_eq!(registry.get(ProviderType::OpenAI).unwrap().provider_name(), "openai");
        assert!(matches!(
            registry.get(ProviderType::Gemini),
            Err(GraphError::ProviderNotRegistered(ProviderType::Gemini))
        ));
    }
}
