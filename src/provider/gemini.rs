//! Gemini-style REST provider
//!
//! Edit requests go through `generateContent` with inline image parts; pure
//! text-to-image fallbacks go through the Imagen `predict` endpoint. The
//! variant cascade starts at the multi-image flagship and degrades down to
//! text-to-image.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::GeminiConfig;
use crate::error::{AppError, ErrorCode, ProviderError, Result};
use crate::provider::cascade::{self, VariantDispatch, VariantRequest};
use crate::provider::types::{
    GenerationParams, GenerationResult, ModelVariant, ProviderCapabilities, ProviderInfo,
    VariantKind,
};
use crate::provider::{HealthStatus, Provider};

const API_KEY_PREFIX: &str = "AIza";

pub struct GeminiProvider {
    info: ProviderInfo,
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            info: ProviderInfo {
                id: "gemini".to_string(),
                display_name: "Google Gemini".to_string(),
                description: "Gemini image editing with Imagen text-to-image fallback"
                    .to_string(),
                capabilities: ProviderCapabilities {
                    multi_image_input: true,
                    image_editing: true,
                    text_to_image: true,
                    max_input_images: 3,
                    max_output_images: 4,
                    accepted_formats: vec![
                        "image/png".to_string(),
                        "image/jpeg".to_string(),
                        "image/webp".to_string(),
                    ],
                    max_image_bytes: 7_000_000,
                },
                models: vec![
                    ModelVariant::new("gemini-2.5-flash-image", VariantKind::ImageEdit, 3),
                    ModelVariant::new("gemini-2.5-flash-image-preview", VariantKind::ImageEdit, 1),
                    ModelVariant::new(
                        "gemini-2.0-flash-preview-image-generation",
                        VariantKind::ImageEdit,
                        0,
                    ),
                    ModelVariant::new("imagen-4.0-generate-001", VariantKind::TextToImage, 0),
                    ModelVariant::new("imagen-3.0-generate-002", VariantKind::TextToImage, 0),
                ],
            },
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn generate_content(
        &self,
        model: &str,
        request: &VariantRequest,
    ) -> std::result::Result<Vec<String>, ProviderError> {
        let mut parts = vec![ContentPart::text(&request.instruction)];
        if let Some(subject) = &request.subject_image {
            parts.push(ContentPart::image(subject));
        }
        for reference in &request.reference_images {
            parts.push(ContentPart::image(reference));
        }

        let body = GenerateContentRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                candidate_count: request.count,
                seed: request.seed,
                response_modalities: vec!["IMAGE".to_string()],
            },
        };

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        debug!(provider = "gemini", model = %model, "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &text));
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            ProviderError::new(
                ErrorCode::BackendError,
                format!("failed to parse generateContent response: {}", e),
            )
        })?;

        if let Some(feedback) = &parsed.prompt_feedback {
            if let Some(reason) = &feedback.block_reason {
                return Err(ProviderError::new(
                    ErrorCode::ContentPolicy,
                    format!("prompt blocked: {}", reason),
                ));
            }
        }

        let mut images = Vec::new();
        let mut finish_reason = None;
        for candidate in &parsed.candidates {
            if let Some(reason) = &candidate.finish_reason {
                finish_reason = Some(reason.clone());
            }
            if let Some(content) = &candidate.content {
                for part in &content.parts {
                    if let Some(inline) = &part.inline_data {
                        images.push(format!("data:{};base64,{}", inline.mime_type, inline.data));
                    }
                }
            }
        }

        if images.is_empty() {
            if let Some(reason) = finish_reason {
                if reason.contains("SAFETY") {
                    return Err(ProviderError::new(
                        ErrorCode::ContentPolicy,
                        format!("generation stopped: {}", reason),
                    ));
                }
            }
        }

        Ok(images)
    }

    async fn predict(
        &self,
        model: &str,
        request: &VariantRequest,
    ) -> std::result::Result<Vec<String>, ProviderError> {
        let body = PredictRequest {
            instances: vec![PredictInstance {
                prompt: request.instruction.clone(),
            }],
            parameters: PredictParameters {
                sample_count: request.count,
                negative_prompt: request.negative_prompt.clone(),
                seed: request.seed,
            },
        };

        let url = format!("{}/v1beta/models/{}:predict", self.base_url, model);
        debug!(provider = "gemini", model = %model, "Sending predict request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &text));
        }

        let parsed: PredictResponse = response.json().await.map_err(|e| {
            ProviderError::new(
                ErrorCode::BackendError,
                format!("failed to parse predict response: {}", e),
            )
        })?;

        Ok(parsed
            .predictions
            .iter()
            .map(|p| {
                format!(
                    "data:{};base64,{}",
                    p.mime_type.as_deref().unwrap_or("image/png"),
                    p.bytes_base64_encoded
                )
            })
            .collect())
    }
}

#[async_trait]
impl VariantDispatch for GeminiProvider {
    async fn invoke(
        &self,
        variant: &ModelVariant,
        request: &VariantRequest,
    ) -> std::result::Result<Vec<String>, ProviderError> {
        match variant.kind {
            VariantKind::ImageEdit => self.generate_content(&variant.id, request).await,
            VariantKind::TextToImage => self.predict(&variant.id, request).await,
        }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn info(&self) -> ProviderInfo {
        self.info.clone()
    }

    fn validate_config(&self) -> bool {
        !self.api_key.is_empty() && self.api_key.starts_with(API_KEY_PREFIX)
    }

    async fn generate(&self, params: GenerationParams) -> GenerationResult {
        cascade::run(&self.info, self, &params).await
    }

    async fn health_check(&self) -> HealthStatus {
        if !self.validate_config() {
            return HealthStatus::unhealthy("API key missing or malformed");
        }

        let url = format!("{}/v1beta/models", self.base_url);
        match self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                HealthStatus::healthy("models endpoint reachable")
            }
            Ok(response) => {
                HealthStatus::unhealthy(format!("models endpoint returned {}", response.status()))
            }
            Err(e) => HealthStatus::unhealthy(format!("probe failed: {}", e)),
        }
    }
}

// generateContent wire format

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ContentPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(rename = "fileData", skip_serializing_if = "Option::is_none")]
    file_data: Option<FileData>,
}

impl ContentPart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
            file_data: None,
        }
    }

    /// Data URIs become inline parts, anything else is passed by URI.
    fn image(image: &str) -> Self {
        if let Some(rest) = image.strip_prefix("data:") {
            if let Some((meta, data)) = rest.split_once(',') {
                let mime_type = meta.split(';').next().unwrap_or("image/png").to_string();
                return Self {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type,
                        data: data.to_string(),
                    }),
                    file_data: None,
                };
            }
        }
        Self {
            text: None,
            inline_data: None,
            file_data: Some(FileData {
                file_uri: image.to_string(),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileData {
    #[serde(rename = "fileUri")]
    file_uri: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "candidateCount")]
    candidate_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(rename = "responseModalities")]
    response_modalities: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback", default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason", default)]
    block_reason: Option<String>,
}

// Imagen predict wire format

#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: Vec<PredictInstance>,
    parameters: PredictParameters,
}

#[derive(Debug, Serialize)]
struct PredictInstance {
    prompt: String,
}

#[derive(Debug, Serialize)]
struct PredictParameters {
    #[serde(rename = "sampleCount")]
    sample_count: u32,
    #[serde(rename = "negativePrompt", skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(rename = "bytesBase64Encoded")]
    bytes_base64_encoded: String,
    #[serde(rename = "mimeType", default)]
    mime_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(key: &str) -> GeminiProvider {
        GeminiProvider::new(&GeminiConfig {
            api_key: key.to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout_secs: 300,
        })
        .unwrap()
    }

    #[test]
    fn test_validate_config_requires_prefix() {
        assert!(provider("AIzaSyExample").validate_config());
        assert!(!provider("sk-wrong-family").validate_config());
        assert!(!provider("").validate_config());
    }

    #[test]
    fn test_variant_order_flagship_first() {
        let info = provider("AIzaX").info();
        assert_eq!(info.models[0].id, "gemini-2.5-flash-image");
        assert_eq!(info.models[0].max_reference_images, 3);
        assert_eq!(info.models.last().unwrap().kind, VariantKind::TextToImage);
    }

    #[test]
    fn test_image_part_selection() {
        let inline = ContentPart::image("data:image/jpeg;base64,Zm9v");
        assert_eq!(inline.inline_data.unwrap().mime_type, "image/jpeg");

        let remote = ContentPart::image("https://cdn.example.com/subject.png");
        assert_eq!(
            remote.file_data.unwrap().file_uri,
            "https://cdn.example.com/subject.png"
        );
    }
}
