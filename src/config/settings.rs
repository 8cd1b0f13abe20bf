//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub providers: ProvidersSettings,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Provider table configuration: which backends are configured, which one is
/// the default, and the cross-provider fallback order.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvidersSettings {
    /// Identifier of the default provider
    #[serde(default = "default_provider_id")]
    pub default: String,

    /// Ordered cross-provider fallback list (distinct from the per-provider
    /// model-variant cascade)
    #[serde(default)]
    pub fallbacks: Vec<String>,

    /// One entry per configured provider
    #[serde(default)]
    pub entries: Vec<ProviderConfig>,
}

fn default_provider_id() -> String {
    "gemini".to_string()
}

impl Default for ProvidersSettings {
    fn default() -> Self {
        Self {
            default: default_provider_id(),
            fallbacks: vec![],
            entries: vec![],
        }
    }
}

/// Closed, tagged per-provider configuration. Adding a backend means adding
/// a variant here, so unknown provider ids cannot survive deserialization.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderConfig {
    Gemini(GeminiConfig),
    OpenAi(OpenAiConfig),
}

impl ProviderConfig {
    /// Stable identifier used as the registry key
    pub fn id(&self) -> &'static str {
        match self {
            ProviderConfig::Gemini(_) => "gemini",
            ProviderConfig::OpenAi(_) => "openai",
        }
    }
}

/// Gemini-style REST backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeminiConfig {
    pub api_key: String,

    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

/// OpenAI-compatible images API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAiConfig {
    pub api_key: String,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}

/// Generation backends are slow; allow a multi-minute ceiling per call.
fn default_request_timeout_secs() -> u64 {
    300
}

/// Task queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueSettings {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Extra tries after the first failure
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_concurrency() -> usize {
    2
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file and environment
    /// variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/stylegen.yaml")
    }

    /// Load settings from a specific configuration file path, with
    /// `STYLEGEN__`-prefixed environment variables layered on top
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        // Credentials usually arrive via .env in development.
        dotenvy::dotenv().ok();

        let path_str = path.as_ref().to_str().unwrap_or("config/stylegen");

        let config = Config::builder()
            .set_default("queue.max_concurrency", default_max_concurrency() as u64)?
            .set_default("queue.retry_attempts", default_retry_attempts() as u64)?
            .set_default("queue.retry_delay_ms", default_retry_delay_ms())?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            .add_source(File::with_name(path_str).required(false))
            .add_source(
                Environment::with_prefix("STYLEGEN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load just the provider table from a standalone YAML file
    pub fn load_providers_file<P: AsRef<Path>>(path: P) -> Result<ProvidersSettings> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AppError::Config(config::ConfigError::Message(format!(
                "Failed to read providers config: {}",
                e
            )))
        })?;

        let providers: ProvidersSettings = serde_yaml::from_str(&content).map_err(|e| {
            AppError::Config(config::ConfigError::Message(format!(
                "Failed to parse providers config: {}",
                e
            )))
        })?;

        Ok(providers)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.queue.max_concurrency == 0 {
            return Err(AppError::Config(config::ConfigError::Message(
                "queue.max_concurrency must be at least 1".to_string(),
            )));
        }

        let ids: Vec<&str> = self.providers.entries.iter().map(|e| e.id()).collect();

        if !self.providers.entries.is_empty() && !ids.contains(&self.providers.default.as_str()) {
            return Err(AppError::Config(config::ConfigError::Message(format!(
                "default provider '{}' has no configuration entry",
                self.providers.default
            ))));
        }

        for fallback in &self.providers.fallbacks {
            if !ids.contains(&fallback.as_str()) {
                return Err(AppError::Config(config::ConfigError::Message(format!(
                    "fallback provider '{}' has no configuration entry",
                    fallback
                ))));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.queue.max_concurrency, 2);
        assert_eq!(settings.queue.retry_attempts, 3);
        assert_eq!(settings.providers.default, "gemini");
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_provider_config_tag_parsing() {
        let yaml = r#"
default: gemini
fallbacks:
  - openai
entries:
  - provider: gemini
    api_key: AIzaTESTKEY
  - provider: openai
    api_key: sk-testkey
    base_url: https://gateway.internal
"#;
        let providers: ProvidersSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(providers.entries.len(), 2);
        assert_eq!(providers.entries[0].id(), "gemini");
        assert_eq!(providers.entries[1].id(), "openai");
        match &providers.entries[1] {
            ProviderConfig::OpenAi(cfg) => {
                assert_eq!(cfg.base_url, "https://gateway.internal");
                assert_eq!(cfg.timeout_secs, 300);
            }
            other => panic!("unexpected entry: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_provider_tag_rejected() {
        let yaml = r#"
entries:
  - provider: midjourney
    api_key: whatever
"#;
        let parsed: std::result::Result<ProvidersSettings, _> = serde_yaml::from_str(yaml);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate_rejects_unconfigured_default() {
        let mut settings = Settings::default();
        settings.providers.entries = vec![ProviderConfig::OpenAi(OpenAiConfig {
            api_key: "sk-x".to_string(),
            base_url: default_openai_base_url(),
            timeout_secs: 300,
        })];
        settings.providers.default = "gemini".to_string();
        assert!(settings.validate().is_err());
    }
}
