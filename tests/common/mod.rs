//! Shared stubs for integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use stylegen::error::{ErrorCode, ProviderError};
use stylegen::provider::cascade::{VariantDispatch, VariantRequest};
use stylegen::provider::types::{
    GenerationParams, GenerationResult, ModelVariant, ProviderCapabilities, ProviderInfo,
    ReferenceImage, VariantKind,
};
use stylegen::provider::{HealthStatus, Provider};

/// A five-variant provider description used by cascade tests
pub fn test_info() -> ProviderInfo {
    ProviderInfo {
        id: "stub".to_string(),
        display_name: "Stub Provider".to_string(),
        description: "test double".to_string(),
        capabilities: ProviderCapabilities {
            multi_image_input: true,
            image_editing: true,
            text_to_image: true,
            max_input_images: 3,
            max_output_images: 6,
            accepted_formats: vec!["image/png".to_string()],
            max_image_bytes: 1000,
        },
        models: vec![
            ModelVariant::new("flagship-edit", VariantKind::ImageEdit, 3),
            ModelVariant::new("plus-edit", VariantKind::ImageEdit, 1),
            ModelVariant::new("base-edit", VariantKind::ImageEdit, 0),
            ModelVariant::new("text-primary", VariantKind::TextToImage, 0),
            ModelVariant::new("text-fallback", VariantKind::TextToImage, 0),
        ],
    }
}

pub fn subject_url() -> String {
    "https://cdn.test/subject.png".to_string()
}

pub fn reference(role: Option<stylegen::provider::GarmentRole>) -> ReferenceImage {
    ReferenceImage {
        image: "https://cdn.test/garment.png".to_string(),
        role,
    }
}

/// Records every variant attempt; fails the variants it is told to fail.
pub struct ScriptedDispatch {
    failing: HashSet<String>,
    pub calls: Mutex<Vec<(String, VariantRequest)>>,
}

impl ScriptedDispatch {
    pub fn new(failing: &[&str]) -> Self {
        Self {
            failing: failing.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn attempted_models(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(id, _)| id.clone()).collect()
    }
}

#[async_trait]
impl VariantDispatch for ScriptedDispatch {
    async fn invoke(
        &self,
        variant: &ModelVariant,
        request: &VariantRequest,
    ) -> Result<Vec<String>, ProviderError> {
        self.calls.lock().push((variant.id.clone(), request.clone()));
        if self.failing.contains(&variant.id) {
            Err(ProviderError::new(
                ErrorCode::BackendError,
                format!("{} unavailable", variant.id),
            ))
        } else {
            Ok(vec![format!("https://img.test/{}.png", variant.id)])
        }
    }
}

/// Provider stub for queue tests: configurable delay and failure mode,
/// tracking call and concurrency counts.
pub struct StubProvider {
    pub delay: Duration,
    fail_code: Option<ErrorCode>,
    panic_once: AtomicBool,
    pub calls: AtomicU32,
    in_flight: AtomicU32,
    pub max_in_flight: AtomicU32,
}

impl StubProvider {
    pub fn succeeding(delay: Duration) -> Self {
        Self::new(delay, None)
    }

    pub fn failing(delay: Duration) -> Self {
        Self::new(delay, Some(ErrorCode::BackendError))
    }

    pub fn failing_with(delay: Duration, code: ErrorCode) -> Self {
        Self::new(delay, Some(code))
    }

    /// Panics on the first generate call, then behaves normally.
    pub fn panicking_once(delay: Duration) -> Self {
        let stub = Self::new(delay, None);
        stub.panic_once.store(true, Ordering::SeqCst);
        stub
    }

    fn new(delay: Duration, fail_code: Option<ErrorCode>) -> Self {
        Self {
            delay,
            fail_code,
            panic_once: AtomicBool::new(false),
            calls: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn info(&self) -> ProviderInfo {
        test_info()
    }

    fn validate_config(&self) -> bool {
        true
    }

    async fn generate(&self, _params: GenerationParams) -> GenerationResult {
        if self.panic_once.swap(false, Ordering::SeqCst) {
            panic!("stub provider blew up");
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.fail_code {
            Some(code) => {
                GenerationResult::failure("stub", "flagship-edit", code, "stub failure", 1)
            }
            None => GenerationResult::success(
                "stub",
                "flagship-edit",
                vec!["https://img.test/out.png".to_string()],
                1,
            ),
        }
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus::healthy("stub")
    }
}
