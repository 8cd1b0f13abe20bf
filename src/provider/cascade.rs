//! Cascading model-variant fallback
//!
//! A provider registers N ordered model variants of decreasing preference.
//! `run` tries them in order, building a variant-specific payload for each,
//! and stops at the first success. There is no retry within a variant; the
//! fallback chain is the retry. Queue-level retries are a separate concern.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{ErrorCode, ProviderError};
use crate::provider::prompt;
use crate::provider::types::{
    GenerationParams, GenerationResult, ModelVariant, ProviderInfo, VariantKind,
};

/// Payload for one model-variant attempt
#[derive(Debug, Clone)]
pub struct VariantRequest {
    /// Composed instruction or prompt text
    pub instruction: String,
    /// Subject image, absent for text-to-image variants
    pub subject_image: Option<String>,
    /// Reference images already truncated to the variant's capacity
    pub reference_images: Vec<String>,
    pub negative_prompt: Option<String>,
    pub seed: Option<i64>,
    pub width: u32,
    pub height: u32,
    /// Output count already clamped to the provider capability
    pub count: u32,
}

/// Transport seam: one network attempt against one model variant.
///
/// Concrete providers implement this over their wire protocol; tests stub it.
#[async_trait]
pub trait VariantDispatch: Send + Sync {
    async fn invoke(
        &self,
        variant: &ModelVariant,
        request: &VariantRequest,
    ) -> std::result::Result<Vec<String>, ProviderError>;
}

/// Run the full cascade for one generate call.
///
/// Never returns an error for expected failure modes; exhaustion yields a
/// `status=error` result carrying the last variant's classification.
pub async fn run<D: VariantDispatch + ?Sized>(
    info: &ProviderInfo,
    dispatch: &D,
    params: &GenerationParams,
) -> GenerationResult {
    let started = Instant::now();
    let provider = info.id.as_str();

    // Fail fast on oversized inline images before any network call.
    if let Some(err) = check_image_sizes(info, params) {
        return GenerationResult::failure(
            provider,
            "none",
            err.code,
            err.message,
            elapsed_ms(started),
        );
    }

    let count = params
        .count
        .clamp(1, info.capabilities.max_output_images.max(1));

    let text_to_image = params.is_text_to_image();
    let chain: Vec<&ModelVariant> = if text_to_image {
        // Image-editing variants are skipped entirely for text-to-image.
        info.models
            .iter()
            .filter(|v| v.kind == VariantKind::TextToImage)
            .collect()
    } else {
        info.models.iter().collect()
    };

    let Some((&last, preferred)) = chain.split_last() else {
        return GenerationResult::failure(
            provider,
            "none",
            ErrorCode::InvalidRequest,
            format!(
                "provider '{}' has no model variant for this request kind",
                provider
            ),
            elapsed_ms(started),
        );
    };

    for &variant in preferred {
        let request = build_request(info, variant, params, count, text_to_image);
        match attempt(dispatch, provider, variant, &request).await {
            Ok(images) => {
                return GenerationResult::success(
                    provider,
                    variant.id.clone(),
                    images,
                    elapsed_ms(started),
                );
            }
            Err(err) => {
                warn!(provider = %provider, model = %variant.id, error = %err, "Model variant failed, trying next");
            }
        }
    }

    // The final variant's outcome decides the call.
    let request = build_request(info, last, params, count, text_to_image);
    match attempt(dispatch, provider, last, &request).await {
        Ok(images) => {
            GenerationResult::success(provider, last.id.clone(), images, elapsed_ms(started))
        }
        Err(err) => {
            warn!(provider = %provider, model = %last.id, error = %err, "Model variant failed, cascade exhausted");
            GenerationResult::failure(
                provider,
                last.id.clone(),
                err.code,
                format!("all model variants failed; last: {}", err.message),
                elapsed_ms(started),
            )
        }
    }
}

/// One variant attempt, normalizing an empty image list to an error.
async fn attempt<D: VariantDispatch + ?Sized>(
    dispatch: &D,
    provider: &str,
    variant: &ModelVariant,
    request: &VariantRequest,
) -> std::result::Result<Vec<String>, ProviderError> {
    debug!(
        provider = %provider,
        model = %variant.id,
        references = request.reference_images.len(),
        "Attempting model variant"
    );

    let images = dispatch.invoke(variant, request).await?;
    if images.is_empty() {
        return Err(ProviderError::new(
            ErrorCode::BackendError,
            "backend returned no images",
        ));
    }
    Ok(images)
}

fn build_request(
    info: &ProviderInfo,
    variant: &ModelVariant,
    params: &GenerationParams,
    count: u32,
    text_to_image: bool,
) -> VariantRequest {
    if text_to_image || variant.kind == VariantKind::TextToImage {
        return VariantRequest {
            instruction: prompt::text_to_image_prompt(params),
            subject_image: None,
            reference_images: vec![],
            negative_prompt: params.negative_prompt.clone(),
            seed: params.seed,
            width: params.width,
            height: params.height,
            count,
        };
    }

    // References beyond the provider capability are silently truncated, then
    // further narrowed to what this variant's payload can carry.
    let limit = (variant.max_reference_images.min(info.capabilities.max_input_images)) as usize;
    let references = &params.reference_images[..params.reference_images.len().min(limit)];

    VariantRequest {
        instruction: prompt::edit_instruction(params, references),
        subject_image: params.subject().map(str::to_string),
        reference_images: references.iter().map(|r| r.image.clone()).collect(),
        negative_prompt: params.negative_prompt.clone(),
        seed: params.seed,
        width: params.width,
        height: params.height,
        count,
    }
}

fn check_image_sizes(info: &ProviderInfo, params: &GenerationParams) -> Option<ProviderError> {
    let limit = info.capabilities.max_image_bytes;
    if limit == 0 {
        return None;
    }

    if let Some(subject) = params.subject() {
        if let Some(size) = inline_image_bytes(subject) {
            if size > limit {
                return Some(ProviderError::new(
                    ErrorCode::ImageTooLarge,
                    format!("subject image is {} bytes, limit is {}", size, limit),
                ));
            }
        }
    }

    for (i, reference) in params.reference_images.iter().enumerate() {
        if let Some(size) = inline_image_bytes(&reference.image) {
            if size > limit {
                return Some(ProviderError::new(
                    ErrorCode::ImageTooLarge,
                    format!(
                        "reference image {} is {} bytes, limit is {}",
                        i + 1,
                        size,
                        limit
                    ),
                ));
            }
        }
    }

    None
}

/// Decoded byte size of an inline data-URI image. URL-referenced images
/// cannot be sized without a network call and are skipped.
fn inline_image_bytes(image: &str) -> Option<u64> {
    use base64::Engine;

    let payload = image.strip_prefix("data:")?.split_once(',')?.1;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(payload.as_bytes())
        .ok()?;
    Some(decoded.len() as u64)
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_image_bytes() {
        // 8 base64 chars decode to 6 bytes
        let uri = "data:image/png;base64,AAAAAAAA";
        assert_eq!(inline_image_bytes(uri), Some(6));
        assert_eq!(inline_image_bytes("https://example.com/a.png"), None);
    }
}
