//! Template rendering.
//!
//! Binds a promotion's fields into the fixed positional slots of the approved
//! WhatsApp message template. Rendering is pure and deterministic: it is done
//! once per campaign and the result is shared read-only across all delivery
//! workers. Variables do not vary per recipient.

use serde::{Deserialize, Serialize};

use super::promotions::Promotion;

pub const CHANNEL_WHATSAPP: &str = "whatsapp";

/// The approved template a deployment sends with. The slot set is fixed by
/// the provider-side template definition and must not be reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub name: String,
    pub language: String,
    /// Whether the template carries a media header that mandates an image.
    pub requires_media: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedTemplate {
    pub template_name: String,
    pub language: String,
    pub header_image_url: Option<String>,
    /// Positional body slots: {{1}} title, {{2}} description, {{3}} sender name.
    pub body_variables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("promotion is missing required field `{0}`")]
    MissingRequiredField(&'static str),
}

pub fn render(promotion: &Promotion, template: &TemplateSpec) -> Result<RenderedTemplate, RenderError> {
    let title = required(&promotion.title, "title")?;
    let description = required(&promotion.description, "description")?;
    let sender_name = required(&promotion.sender_name, "sender_name")?;

    let image = promotion
        .image_overrides
        .get(CHANNEL_WHATSAPP)
        .cloned()
        .or_else(|| promotion.image_url.clone());
    let header_image_url = if template.requires_media {
        match image {
            Some(url) if !url.trim().is_empty() => Some(url),
            _ => return Err(RenderError::MissingRequiredField("image_url")),
        }
    } else {
        // Text-only template: a header parameter would be rejected upstream.
        None
    };

    Ok(RenderedTemplate {
        template_name: template.name.clone(),
        language: template.language.clone(),
        header_image_url,
        body_variables: vec![title, description, sender_name],
    })
}

fn required(value: &str, field: &'static str) -> Result<String, RenderError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(RenderError::MissingRequiredField(field))
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn promotion() -> Promotion {
        Promotion {
            id: Uuid::new_v4(),
            subscription_id: Uuid::new_v4(),
            title: "Spring sale".to_string(),
            description: "Everything 20% off".to_string(),
            image_url: Some("https://example.com/banner.png".to_string()),
            image_overrides: HashMap::new(),
            sender_name: "Acme".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn media_template() -> TemplateSpec {
        TemplateSpec {
            name: "promotion_announcement".to_string(),
            language: "en_US".to_string(),
            requires_media: true,
        }
    }

    #[test]
    fn test_render_fills_positional_slots() {
        let rendered = render(&promotion(), &media_template()).unwrap();
        assert_eq!(
            rendered.body_variables,
            vec!["Spring sale", "Everything 20% off", "Acme"]
        );
        assert_eq!(
            rendered.header_image_url.as_deref(),
            Some("https://example.com/banner.png")
        );
        assert_eq!(rendered.template_name, "promotion_announcement");
    }

    #[test]
    fn test_render_is_deterministic() {
        let promotion = promotion();
        let template = media_template();
        let first = render(&promotion, &template).unwrap();
        let second = render(&promotion, &template).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_image_on_media_template() {
        let mut promotion = promotion();
        promotion.image_url = None;
        let err = render(&promotion, &media_template()).unwrap_err();
        assert_eq!(err, RenderError::MissingRequiredField("image_url"));
    }

    #[test]
    fn test_blank_image_counts_as_missing() {
        let mut promotion = promotion();
        promotion.image_url = Some("   ".to_string());
        let err = render(&promotion, &media_template()).unwrap_err();
        assert_eq!(err, RenderError::MissingRequiredField("image_url"));
    }

    #[test]
    fn test_missing_title() {
        let mut promotion = promotion();
        promotion.title = String::new();
        let err = render(&promotion, &media_template()).unwrap_err();
        assert_eq!(err, RenderError::MissingRequiredField("title"));
    }

    #[test]
    fn test_channel_override_wins_over_base_image() {
        let mut promotion = promotion();
        promotion.image_overrides.insert(
            CHANNEL_WHATSAPP.to_string(),
            "https://example.com/wa.png".to_string(),
        );
        let rendered = render(&promotion, &media_template()).unwrap();
        assert_eq!(
            rendered.header_image_url.as_deref(),
            Some("https://example.com/wa.png")
        );
    }

    #[test]
    fn test_text_only_template_drops_header() {
        let template = TemplateSpec {
            requires_media: false,
            ..media_template()
        };
        let rendered = render(&promotion(), &template).unwrap();
        assert!(rendered.header_image_url.is_none());

        // No image at all is fine when the template does not mandate media.
        let mut promotion = promotion();
        promotion.image_url = None;
        assert!(render(&promotion, &template).is_ok());
    }
}
