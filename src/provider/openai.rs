//! OpenAI-compatible images API provider
//!
//! Covers the `gpt-image-1` edit model and the DALL-E text-to-image models
//! behind one JSON transport, usable against api.openai.com or any
//! OpenAI-compatible gateway.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::OpenAiConfig;
use crate::error::{AppError, ErrorCode, ProviderError, Result};
use crate::provider::cascade::{self, VariantDispatch, VariantRequest};
use crate::provider::types::{
    GenerationParams, GenerationResult, ModelVariant, ProviderCapabilities, ProviderInfo,
    VariantKind,
};
use crate::provider::{HealthStatus, Provider};

const API_KEY_PREFIX: &str = "sk-";

pub struct OpenAiProvider {
    info: ProviderInfo,
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            info: ProviderInfo {
                id: "openai".to_string(),
                display_name: "OpenAI Images".to_string(),
                description: "gpt-image-1 editing with DALL-E text-to-image fallback".to_string(),
                capabilities: ProviderCapabilities {
                    multi_image_input: true,
                    image_editing: true,
                    text_to_image: true,
                    max_input_images: 3,
                    max_output_images: 6,
                    accepted_formats: vec!["image/png".to_string(), "image/jpeg".to_string()],
                    max_image_bytes: 4_000_000,
                },
                models: vec![
                    ModelVariant::new("gpt-image-1", VariantKind::ImageEdit, 3),
                    ModelVariant::new("dall-e-3", VariantKind::TextToImage, 0),
                    ModelVariant::new("dall-e-2", VariantKind::TextToImage, 0),
                ],
            },
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    async fn post_images(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> std::result::Result<Vec<String>, ProviderError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &text));
        }

        let parsed: ImagesResponse = response.json().await.map_err(|e| {
            ProviderError::new(
                ErrorCode::BackendError,
                format!("failed to parse images response: {}", e),
            )
        })?;

        Ok(parsed
            .data
            .iter()
            .filter_map(|item| {
                item.url.clone().or_else(|| {
                    item.b64_json
                        .as_ref()
                        .map(|b64| format!("data:image/png;base64,{}", b64))
                })
            })
            .collect())
    }

    /// Image-edit call carrying the subject plus reference images.
    ///
    /// The payload is JSON with data-URI image strings, the shape
    /// OpenAI-compatible gateways accept. api.openai.com proper expects
    /// multipart/form-data on this endpoint and rejects this body.
    async fn edit(
        &self,
        model: &str,
        request: &VariantRequest,
    ) -> std::result::Result<Vec<String>, ProviderError> {
        let mut images = Vec::new();
        if let Some(subject) = &request.subject_image {
            images.push(subject.clone());
        }
        images.extend(request.reference_images.iter().cloned());

        let body = EditRequest {
            model: model.to_string(),
            prompt: request.instruction.clone(),
            image: images,
            n: request.count,
            size: format!("{}x{}", request.width, request.height),
        };

        debug!(provider = "openai", model = %model, "Sending image edit request");
        self.post_images("/v1/images/edits", &body).await
    }

    async fn generate_from_text(
        &self,
        model: &str,
        request: &VariantRequest,
    ) -> std::result::Result<Vec<String>, ProviderError> {
        // dall-e-3 only produces one image per call.
        let n = if model == "dall-e-3" { 1 } else { request.count };

        let body = GenerationsRequest {
            model: model.to_string(),
            prompt: request.instruction.clone(),
            n,
            size: format!("{}x{}", request.width, request.height),
            response_format: "url".to_string(),
        };

        debug!(provider = "openai", model = %model, "Sending text-to-image request");
        self.post_images("/v1/images/generations", &body).await
    }
}

#[async_trait]
impl VariantDispatch for OpenAiProvider {
    async fn invoke(
        &self,
        variant: &ModelVariant,
        request: &VariantRequest,
    ) -> std::result::Result<Vec<String>, ProviderError> {
        match variant.kind {
            VariantKind::ImageEdit => self.edit(&variant.id, request).await,
            VariantKind::TextToImage => self.generate_from_text(&variant.id, request).await,
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
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

        let url = format!("{}/v1/models", self.base_url);
        match self.client.get(&url).headers(self.headers()).send().await {
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

#[derive(Debug, Serialize)]
struct EditRequest {
    model: String,
    prompt: String,
    image: Vec<String>,
    n: u32,
    size: String,
}

#[derive(Debug, Serialize)]
struct GenerationsRequest {
    model: String,
    prompt: String,
    n: u32,
    size: String,
    response_format: String,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageItem>,
}

#[derive(Debug, Deserialize)]
struct ImageItem {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(key: &str) -> OpenAiProvider {
        OpenAiProvider::new(&OpenAiConfig {
            api_key: key.to_string(),
            base_url: "https://api.openai.com".to_string(),
            timeout_secs: 300,
        })
        .unwrap()
    }

    #[test]
    fn test_validate_config_requires_prefix() {
        assert!(provider("sk-test").validate_config());
        assert!(!provider("AIzaWrong").validate_config());
        assert!(!provider("").validate_config());
    }

    #[test]
    fn test_cascade_ends_in_text_to_image() {
        let info = provider("sk-test").info();
        assert_eq!(info.models[0].kind, VariantKind::ImageEdit);
        assert_eq!(info.models.last().unwrap().kind, VariantKind::TextToImage);
    }
}
