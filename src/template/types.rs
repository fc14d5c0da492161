//! Template types and error definitions

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::ChannelType;
use crate::notification::EventType;

/// Template-specific error type
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid template ID: {0}")]
    InvalidId(String),

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Template {template_id} is missing required variables: {}", missing.join(", "))]
    Render {
        template_id: String,
        missing: Vec<String>,
    },
}

/// Result type for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

/// How the `html` body of a template is written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HtmlFormat {
    /// Final HTML with placeholders
    #[default]
    Html,
    /// Block markup compiled to HTML at render time
    Markup,
}

/// A notification template for one (event type, channel) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTemplate {
    /// Unique template identifier (alphanumeric, dash, underscore, dot)
    pub id: String,

    pub event_type: EventType,

    pub channel: ChannelType,

    /// Subject pattern, used by channels that carry one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Plain text body pattern
    pub text: String,

    /// Rich body pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,

    #[serde(default)]
    pub html_format: HtmlFormat,

    /// Context paths that must be present (dotted paths allowed)
    #[serde(default)]
    pub variables: Vec<String>,

    /// Preferred template when several share an (event type, channel) key
    #[serde(default)]
    pub is_default: bool,
}

impl NotificationTemplate {
    /// Validate the template before registration
    pub fn validate(&self) -> TemplateResult<()> {
        if self.id.is_empty() || self.id.len() > 64 {
            return Err(TemplateError::InvalidId(
                "ID must be 1-64 characters".to_string(),
            ));
        }

        if !self
            .id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(TemplateError::InvalidId(
                "ID must contain only alphanumeric, dash, underscore, or dot".to_string(),
            ));
        }

        if self.text.trim().is_empty() {
            return Err(TemplateError::InvalidTemplate(format!(
                "{}: text body must not be empty",
                self.id
            )));
        }

        if self.html_format == HtmlFormat::Markup && self.html.is_none() {
            return Err(TemplateError::InvalidTemplate(format!(
                "{}: markup format requires an html body",
                self.id
            )));
        }

        if self.variables.iter().any(|v| v.trim().is_empty()) {
            return Err(TemplateError::InvalidTemplate(format!(
                "{}: variable names must not be empty",
                self.id
            )));
        }

        Ok(())
    }
}

/// Output of rendering a template against a context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedMessage {
    pub subject: Option<String>,
    pub text: String,
    pub html: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(id: &str) -> NotificationTemplate {
        NotificationTemplate {
            id: id.to_string(),
            event_type: EventType::HostAlert,
            channel: ChannelType::Sms,
            subject: None,
            text: "Visitor waiting".to_string(),
            html: None,
            html_format: HtmlFormat::Html,
            variables: vec![],
            is_default: false,
        }
    }

    #[test]
    fn test_validate_accepts_dotted_id() {
        assert!(template("host-alert.sms_v2").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_ids() {
        assert!(matches!(
            template("").validate(),
            Err(TemplateError::InvalidId(_))
        ));
        assert!(matches!(
            template("has space").validate(),
            Err(TemplateError::InvalidId(_))
        ));
        assert!(matches!(
            template(&"x".repeat(65)).validate(),
            Err(TemplateError::InvalidId(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_text() {
        let mut t = template("empty");
        t.text = "   ".to_string();
        assert!(matches!(
            t.validate(),
            Err(TemplateError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn test_validate_markup_requires_html() {
        let mut t = template("markup");
        t.html_format = HtmlFormat::Markup;
        assert!(t.validate().is_err());

        t.html = Some("[text]hi[/text]".to_string());
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_deserialize_from_config_shape() {
        let t: NotificationTemplate = serde_json::from_value(serde_json::json!({
            "id": "checkout-chat",
            "event_type": "CHECKOUT_ALERT",
            "channel": "CHAT",
            "text": "{{visitor.name}} checked out",
            "variables": ["visitor.name"]
        }))
        .unwrap();

        assert_eq!(t.event_type, EventType::CheckoutAlert);
        assert_eq!(t.channel, ChannelType::Chat);
        assert_eq!(t.html_format, HtmlFormat::Html);
        assert!(!t.is_default);
    }

    #[test]
    fn test_render_error_lists_missing() {
        let err = TemplateError::Render {
            template_id: "t".to_string(),
            missing: vec!["visitor.name".to_string(), "host.email".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Template t is missing required variables: visitor.name, host.email"
        );
    }
}
