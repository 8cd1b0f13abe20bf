//! Configuration module

pub mod settings;

pub use settings::{
    GeminiConfig, LoggingConfig, OpenAiConfig, ProviderConfig, ProvidersSettings, QueueSettings,
    Settings,
};
