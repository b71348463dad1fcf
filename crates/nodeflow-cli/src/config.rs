use ::config::{Config as ConfigLoader, ConfigError, Environment, File, FileFormat};
use nodeflow_llm::ProviderType;
use nodeflow_types::GraphConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub graph: GraphSection,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// `json` or `pretty`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphSection {
    pub max_concurrency: usize,
    pub execution_timeout_secs: u64,
    pub event_buffer: usize,
}

impl Default for GraphSection {
    fn default() -> Self {
        let defaults = GraphConfig::default();
        Self {
            max_concurrency: defaults.max_concurrency,
            execution_timeout_secs: defaults.execution_timeout.as_secs(),
            event_buffer: defaults.event_buffer,
        }
    }
}

impl From<&GraphSection> for GraphConfig {
    fn from(section: &GraphSection) -> Self {
        GraphConfig::new()
            .with_max_concurrency(section.max_concurrency)
            .with_timeout(Duration::from_secs(section.execution_timeout_secs))
            .with_event_buffer(section.event_buffer)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    /// Providers to build from the environment; ones without an API key are skipped
    pub enabled: Vec<ProviderType>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            enabled: ProviderType::ALL.to_vec(),
        }
    }
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. `<dir>/default.toml`
    /// 2. `<dir>/{ENV}.toml` (if ENV is set)
    /// 3. `NODEFLOW__<SECTION>__<KEY>` environment variables
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let config = ConfigLoader::builder()
            .add_source(File::with_name(&dir.join("default").to_string_lossy()).required(false))
            .add_source(File::with_name(&dir.join(&env).to_string_lossy()).required(false))
            .add_source(
                Environment::with_prefix("NODEFLOW")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("providers.enabled")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Parse a single TOML document (useful for testing)
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        ConfigLoader::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_structure() {
        let toml = r#"
            [logging]
            level = "debug"
            format = "json"

            [graph]
            max_concurrency = 8
            execution_timeout_secs = 30
            event_buffer = 64

            [providers]
            enabled = ["anthropic"]
        "#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.providers.enabled, vec![ProviderType::Anthropic]);

        let graph = GraphConfig::from(&config.graph);
        assert_eq!(graph.max_concurrency, 8);
        assert_eq!(graph.execution_timeout, Duration::from_secs(30));
        assert_eq!(graph.event_buffer, 64);
    }

    #[test]
    fn test_missing_sections_fall_back_to_defaults() {
        let config = Config::from_toml("[graph]\nmax_concurrency = 2\n").unwrap();

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.graph.max_concurrency, 2);
        assert_eq!(config.graph.execution_timeout_secs, 300);
        assert_eq!(config.providers.enabled.len(), 3);
    }

    #[test]
    fn test_load_from_missing_directory_uses_defaults() {
        let config = Config::load(Path::new("/nonexistent/nodeflow-config")).unwrap();
        assert!(config.graph.max_concurrency >= 1);
    }
}
