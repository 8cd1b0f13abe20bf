//! Provider registry mapping provider ids to constructed instances

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{ProviderConfig, ProvidersSettings};
use crate::error::{AppError, Result};
use crate::provider::{GeminiProvider, HealthStatus, OpenAiProvider, Provider};

/// Process-wide table of configured providers, with a default and an ordered
/// cross-provider fallback list. Constructed explicitly and passed by handle;
/// there is no global instance.
pub struct ProviderRegistry {
    providers: DashMap<String, Arc<dyn Provider>>,
    configs: HashMap<String, ProviderConfig>,
    default_id: String,
    fallback_ids: Vec<String>,
}

impl ProviderRegistry {
    /// Eagerly construct a provider per configured entry.
    ///
    /// An unknown default or fallback id is a configuration error here, not
    /// at call time.
    pub fn initialize(settings: &ProvidersSettings) -> Result<Self> {
        let mut configs = HashMap::new();
        for entry in &settings.entries {
            configs.insert(entry.id().to_string(), entry.clone());
        }

        if !configs.contains_key(&settings.default) {
            return Err(AppError::Config(config::ConfigError::Message(format!(
                "default provider '{}' is not configured",
                settings.default
            ))));
        }
        for fallback in &settings.fallbacks {
            if !configs.contains_key(fallback) {
                return Err(AppError::Config(config::ConfigError::Message(format!(
                    "fallback provider '{}' is not configured",
                    fallback
                ))));
            }
        }

        let registry = Self {
            providers: DashMap::new(),
            configs,
            default_id: settings.default.clone(),
            fallback_ids: settings.fallbacks.clone(),
        };

        for (id, config) in &registry.configs {
            let provider = Self::construct(config)?;
            registry.providers.insert(id.clone(), provider);
            info!(provider = %id, "Registered provider");
        }

        Ok(registry)
    }

    fn construct(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
        match config {
            ProviderConfig::Gemini(cfg) => Ok(Arc::new(GeminiProvider::new(cfg)?)),
            ProviderConfig::OpenAi(cfg) => Ok(Arc::new(OpenAiProvider::new(cfg)?)),
        }
    }

    /// Get the provider for `id`, or the default when omitted.
    ///
    /// Constructs and caches lazily if configured but not yet instantiated;
    /// returns None for unconfigured ids.
    pub fn get(&self, id: Option<&str>) -> Option<Arc<dyn Provider>> {
        let id = id.unwrap_or(&self.default_id);

        if let Some(provider) = self.providers.get(id) {
            return Some(provider.value().clone());
        }

        let config = self.configs.get(id)?;
        match Self::construct(config) {
            Ok(provider) => {
                self.providers.insert(id.to_string(), provider.clone());
                Some(provider)
            }
            Err(e) => {
                warn!(provider = %id, error = %e, "Failed to construct provider");
                None
            }
        }
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    /// Validated providers in resilience order: the default first, then each
    /// fallback in declared order (skipping the default), skipping any whose
    /// credentials fail structural validation.
    pub fn get_available(&self) -> Vec<Arc<dyn Provider>> {
        let mut available = Vec::new();

        if let Some(default) = self.get(None) {
            if default.validate_config() {
                available.push(default);
            } else {
                warn!(provider = %self.default_id, "Default provider failed config validation");
            }
        }

        for id in &self.fallback_ids {
            if id == &self.default_id {
                continue;
            }
            if let Some(provider) = self.get(Some(id)) {
                if provider.validate_config() {
                    available.push(provider);
                } else {
                    warn!(provider = %id, "Skipping provider with invalid config");
                }
            }
        }

        available
    }

    /// Probe every constructed provider concurrently.
    pub async fn health_check_all(&self) -> Vec<(String, HealthStatus)> {
        let providers: Vec<(String, Arc<dyn Provider>)> = self
            .providers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let checks = providers.iter().map(|(id, provider)| {
            let id = id.clone();
            let provider = provider.clone();
            async move { (id, provider.health_check().await) }
        });

        futures::future::join_all(checks).await
    }

    pub fn contains(&self, id: &str) -> bool {
        self.configs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GeminiConfig, OpenAiConfig};

    fn settings(default: &str, fallbacks: Vec<&str>) -> ProvidersSettings {
        ProvidersSettings {
            default: default.to_string(),
            fallbacks: fallbacks.into_iter().map(String::from).collect(),
            entries: vec![
                ProviderConfig::Gemini(GeminiConfig {
                    api_key: "AIzaTest".to_string(),
                    base_url: "https://generativelanguage.googleapis.com".to_string(),
                    timeout_secs: 300,
                }),
                ProviderConfig::OpenAi(OpenAiConfig {
                    api_key: "sk-test".to_string(),
                    base_url: "https://api.openai.com".to_string(),
                    timeout_secs: 300,
                }),
            ],
        }
    }

    #[test]
    fn test_initialize_and_default_lookup() {
        let registry = ProviderRegistry::initialize(&settings("gemini", vec!["openai"])).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(None).unwrap().info().id, "gemini");
        assert_eq!(registry.get(Some("openai")).unwrap().info().id, "openai");
        assert!(registry.get(Some("unconfigured")).is_none());
    }

    #[test]
    fn test_initialize_rejects_unknown_default() {
        let mut s = settings("gemini", vec![]);
        s.default = "stability".to_string();
        assert!(ProviderRegistry::initialize(&s).is_err());
    }

    #[test]
    fn test_initialize_rejects_unknown_fallback() {
        let s = settings("gemini", vec!["stability"]);
        assert!(ProviderRegistry::initialize(&s).is_err());
    }

    #[test]
    fn test_available_order_default_first() {
        let registry = ProviderRegistry::initialize(&settings("openai", vec!["gemini", "openai"]))
            .unwrap();
        let available = registry.get_available();
        assert_eq!(available.len(), 2);
        assert_eq!(available[0].info().id, "openai");
        assert_eq!(available[1].info().id, "gemini");
    }

    #[test]
    fn test_available_skips_invalid_config() {
        let mut s = settings("gemini", vec!["openai"]);
        s.entries[1] = ProviderConfig::OpenAi(OpenAiConfig {
            api_key: "not-a-key".to_string(),
            base_url: "https://api.openai.com".to_string(),
            timeout_secs: 300,
        });
        let registry = ProviderRegistry::initialize(&s).unwrap();
        let available = registry.get_available();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].info().id, "gemini");
    }
}
