//! Provider module - generation contract, cascading fallback, and registry

pub mod cascade;
pub mod gemini;
pub mod openai;
pub mod prompt;
pub mod registry;
pub mod types;

use async_trait::async_trait;

pub use cascade::{VariantDispatch, VariantRequest};
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use registry::ProviderRegistry;
pub use types::{
    GarmentRole, GenerationParams, GenerationResult, GenerationStatus, ModelVariant,
    ProviderCapabilities, ProviderInfo, ReferenceImage, StyleOptions, VariantKind,
};

/// Outcome of a provider health probe
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub message: String,
}

impl HealthStatus {
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            healthy: true,
            message: message.into(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: message.into(),
        }
    }
}

/// Trait for generation providers.
///
/// One implementation per backend, each internally owning an ordered cascade
/// of model variants (see [`cascade`]).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Descriptive metadata including capabilities and the variant cascade.
    /// No side effects.
    fn info(&self) -> ProviderInfo;

    /// True iff required credentials are structurally well-formed.
    /// Performs no network I/O.
    fn validate_config(&self) -> bool;

    /// Run one generation request through the variant cascade.
    ///
    /// Expected failure modes are returned as `status=error` results with a
    /// stable code, never as panics.
    async fn generate(&self, params: GenerationParams) -> GenerationResult;

    /// Issue a minimal probe request and classify the response. Must not
    /// require valid generation parameters, and must report unhealthy for
    /// structurally invalid credentials without a network call.
    async fn health_check(&self) -> HealthStatus;
}
