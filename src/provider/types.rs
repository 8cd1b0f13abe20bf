//! Provider-agnostic request/response types and capability descriptions

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// Semantic role of a reference image within an edit request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GarmentRole {
    UpperGarment,
    LowerGarment,
    Outerwear,
}

impl std::fmt::Display for GarmentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GarmentRole::UpperGarment => write!(f, "upper garment"),
            GarmentRole::LowerGarment => write!(f, "lower garment"),
            GarmentRole::Outerwear => write!(f, "outerwear"),
        }
    }
}

/// A reference image, optionally tagged with the garment it depicts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceImage {
    /// URL or data URI of the image
    pub image: String,

    #[serde(default)]
    pub role: Option<GarmentRole>,
}

/// Free-text styling instructions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StyleOptions {
    #[serde(default)]
    pub pose: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub lighting: Option<String>,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub color_tone: Option<String>,
    /// Custom free-form prompt, appended after the structured instruction
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Request to generate one or more styled images
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Primary subject image (URL or data URI). Absent or empty means
    /// text-to-image mode, in which case reference images are ignored.
    #[serde(default)]
    pub subject_image: Option<String>,

    /// Reference images, truncated to the provider's declared maximum
    #[serde(default)]
    pub reference_images: Vec<ReferenceImage>,

    #[serde(default)]
    pub style: StyleOptions,

    #[serde(default)]
    pub negative_prompt: Option<String>,

    /// Random seed for reproducibility
    #[serde(default)]
    pub seed: Option<i64>,

    #[serde(default = "default_dimension")]
    pub width: u32,

    #[serde(default = "default_dimension")]
    pub height: u32,

    /// Requested number of output images, clamped to provider capability
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_dimension() -> u32 {
    1024
}

fn default_count() -> u32 {
    1
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            subject_image: None,
            reference_images: vec![],
            style: StyleOptions::default(),
            negative_prompt: None,
            seed: None,
            width: default_dimension(),
            height: default_dimension(),
            count: default_count(),
        }
    }
}

impl GenerationParams {
    /// The subject image, with empty strings normalized away
    pub fn subject(&self) -> Option<&str> {
        self.subject_image.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Whether this request is a pure text-to-image request
    pub fn is_text_to_image(&self) -> bool {
        self.subject().is_none()
    }
}

/// Outcome status of a generate call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Success,
    Error,
}

/// Outcome of one generate call.
///
/// `status == Success` implies at least one image (the first is canonical);
/// `status == Error` implies a non-empty message and a code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub status: GenerationStatus,

    /// Output image references (URLs or data URIs)
    #[serde(default)]
    pub images: Vec<String>,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub code: Option<ErrorCode>,

    /// Backend that handled the request
    pub provider: String,

    /// The model variant that ultimately produced this result
    pub model: String,

    /// Wall-clock latency across the whole cascade
    pub elapsed_ms: u64,
}

impl GenerationResult {
    pub fn success(
        provider: impl Into<String>,
        model: impl Into<String>,
        images: Vec<String>,
        elapsed_ms: u64,
    ) -> Self {
        debug_assert!(!images.is_empty(), "success result must carry an image");
        Self {
            status: GenerationStatus::Success,
            images,
            message: None,
            code: None,
            provider: provider.into(),
            model: model.into(),
            elapsed_ms,
        }
    }

    pub fn failure(
        provider: impl Into<String>,
        model: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
        elapsed_ms: u64,
    ) -> Self {
        let message = message.into();
        debug_assert!(!message.is_empty(), "error result must carry a message");
        Self {
            status: GenerationStatus::Error,
            images: vec![],
            message: Some(message),
            code: Some(code),
            provider: provider.into(),
            model: model.into(),
            elapsed_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == GenerationStatus::Success
    }
}

/// Static description of what a provider can do. Never mutated after
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub multi_image_input: bool,
    pub image_editing: bool,
    pub text_to_image: bool,
    pub max_input_images: u32,
    pub max_output_images: u32,
    pub accepted_formats: Vec<String>,
    pub max_image_bytes: u64,
}

/// What a model variant is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    ImageEdit,
    TextToImage,
}

/// One concrete backend model within a provider's cascade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVariant {
    pub id: String,
    pub kind: VariantKind,
    /// How many reference images this variant's payload can carry
    pub max_reference_images: u32,
}

impl ModelVariant {
    pub fn new(id: impl Into<String>, kind: VariantKind, max_reference_images: u32) -> Self {
        Self {
            id: id.into(),
            kind,
            max_reference_images,
        }
    }
}

/// Descriptive provider metadata, including the ordered variant cascade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub capabilities: ProviderCapabilities,
    /// Supported model variants in decreasing order of preference
    pub models: Vec<ModelVariant>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_to_image_detection() {
        let mut params = GenerationParams::default();
        assert!(params.is_text_to_image());

        params.subject_image = Some("  ".to_string());
        assert!(params.is_text_to_image());

        params.subject_image = Some("https://example.com/photo.jpg".to_string());
        assert!(!params.is_text_to_image());
    }

    #[test]
    fn test_result_constructors() {
        let ok = GenerationResult::success("gemini", "m1", vec!["u1".into()], 42);
        assert!(ok.is_success());
        assert_eq!(ok.images.len(), 1);

        let err = GenerationResult::failure("gemini", "m1", ErrorCode::Timeout, "slow", 42);
        assert!(!err.is_success());
        assert_eq!(err.code, Some(ErrorCode::Timeout));
        assert!(err.images.is_empty());
    }

    #[test]
    fn test_garment_role_display() {
        assert_eq!(GarmentRole::UpperGarment.to_string(), "upper garment");
        assert_eq!(GarmentRole::Outerwear.to_string(), "outerwear");
    }
}
