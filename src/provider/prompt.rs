//! Instruction composition for edit and text-to-image requests
//!
//! Each model variant accepts a different number of reference images, so the
//! instruction text degrades with the variant: with references it names which
//! image maps to which garment role, without them it becomes a pure style
//! transform on the subject image.

use crate::provider::types::{GenerationParams, ReferenceImage};

/// Compose the structured instruction for an image-edit attempt over the
/// reference images actually sent to the variant.
pub fn edit_instruction(params: &GenerationParams, references: &[ReferenceImage]) -> String {
    let mut parts: Vec<String> = Vec::new();

    if references.is_empty() {
        parts.push(
            "Restyle the person in this photo while keeping their identity, face, \
             pose and body shape unchanged."
                .to_string(),
        );
    } else {
        let targets: Vec<String> = references
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let role = r
                    .role
                    .map(|role| role.to_string())
                    .unwrap_or_else(|| "garment".to_string());
                format!("the {} shown in reference image {}", role, i + 1)
            })
            .collect();

        parts.push(format!(
            "Replace the person's clothing with {}.",
            join_natural(&targets)
        ));
        parts.push(
            "Keep the person's identity, face, pose and body shape unchanged.".to_string(),
        );
    }

    append_style_directives(&mut parts, params);
    parts.join(" ")
}

/// Compose the prompt for a text-to-image attempt (no subject image).
pub fn text_to_image_prompt(params: &GenerationParams) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push(
        params
            .style
            .prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| "A full-body fashion photo of a person.".to_string()),
    );

    if let Some(pose) = non_empty(&params.style.pose) {
        parts.push(format!("Pose: {}.", pose));
    }
    if let Some(style) = non_empty(&params.style.style) {
        parts.push(format!("Style: {}.", style));
    }
    if let Some(lighting) = non_empty(&params.style.lighting) {
        parts.push(format!("Lighting: {}.", lighting));
    }
    if let Some(background) = non_empty(&params.style.background) {
        parts.push(format!("Background: {}.", background));
    }
    if let Some(tone) = non_empty(&params.style.color_tone) {
        parts.push(format!("Color tone: {}.", tone));
    }
    if let Some(negative) = non_empty(&params.negative_prompt) {
        parts.push(format!("Avoid: {}.", negative));
    }

    parts.join(" ")
}

fn append_style_directives(parts: &mut Vec<String>, params: &GenerationParams) {
    if let Some(pose) = non_empty(&params.style.pose) {
        parts.push(format!("Pose: {}.", pose));
    }
    if let Some(style) = non_empty(&params.style.style) {
        parts.push(format!("Style: {}.", style));
    }
    if let Some(lighting) = non_empty(&params.style.lighting) {
        parts.push(format!("Lighting: {}.", lighting));
    }
    if let Some(background) = non_empty(&params.style.background) {
        parts.push(format!("Background: {}.", background));
    }
    if let Some(tone) = non_empty(&params.style.color_tone) {
        parts.push(format!("Color tone: {}.", tone));
    }
    if let Some(prompt) = non_empty(&params.style.prompt) {
        parts.push(prompt.to_string());
    }
    if let Some(negative) = non_empty(&params.negative_prompt) {
        parts.push(format!("Avoid: {}.", negative));
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// "a" / "a and b" / "a, b and c"
fn join_natural(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [head @ .., last] => format!("{} and {}", head.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::types::GarmentRole;

    fn reference(role: Option<GarmentRole>) -> ReferenceImage {
        ReferenceImage {
            image: "data:image/png;base64,AAAA".to_string(),
            role,
        }
    }

    #[test]
    fn test_single_reference_instruction() {
        let params = GenerationParams::default();
        let refs = vec![reference(Some(GarmentRole::UpperGarment))];
        let text = edit_instruction(&params, &refs);
        assert!(text.contains("the upper garment shown in reference image 1"));
        assert!(!text.contains(" and "));
    }

    #[test]
    fn test_three_reference_instruction_enumerates_roles() {
        let params = GenerationParams::default();
        let refs = vec![
            reference(Some(GarmentRole::UpperGarment)),
            reference(Some(GarmentRole::LowerGarment)),
            reference(Some(GarmentRole::Outerwear)),
        ];
        let text = edit_instruction(&params, &refs);
        assert!(text.contains("the upper garment shown in reference image 1"));
        assert!(text.contains("the lower garment shown in reference image 2"));
        assert!(text.contains("and the outerwear shown in reference image 3"));
    }

    #[test]
    fn test_untagged_reference_falls_back_to_generic_noun() {
        let params = GenerationParams::default();
        let text = edit_instruction(&params, &[reference(None)]);
        assert!(text.contains("the garment shown in reference image 1"));
    }

    #[test]
    fn test_zero_reference_instruction_is_style_transform() {
        let mut params = GenerationParams::default();
        params.style.style = Some("street fashion".to_string());
        let text = edit_instruction(&params, &[]);
        assert!(text.contains("Restyle the person"));
        assert!(text.contains("Style: street fashion."));
    }

    #[test]
    fn test_text_to_image_prompt_carries_negative() {
        let mut params = GenerationParams::default();
        params.style.prompt = Some("a person in a red coat".to_string());
        params.negative_prompt = Some("blurry, low quality".to_string());
        let text = text_to_image_prompt(&params);
        assert!(text.starts_with("a person in a red coat"));
        assert!(text.contains("Avoid: blurry, low quality."));
    }
}
