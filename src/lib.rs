//! Stylegen
//!
//! Generation orchestration core: turns styled-photo requests into AI
//! backend calls across unreliable, heterogeneous providers. A provider
//! abstraction hides each backend's model variants behind one interface with
//! transparent cascading fallback; a bounded-concurrency task queue
//! serializes batch generation with retry, progress events, and best-effort
//! cancellation.

pub mod config;
pub mod error;
pub mod provider;
pub mod queue;
pub mod telemetry;

pub use error::{AppError, ErrorCode, Result};
pub use provider::{
    GenerationParams, GenerationResult, GenerationStatus, HealthStatus, Provider,
    ProviderCapabilities, ProviderInfo, ProviderRegistry,
};
pub use queue::{QueueConfig, QueueEvent, QueueSnapshot, Task, TaskQueue, TaskStatus};
