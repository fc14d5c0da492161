//! Notification template engine.
//!
//! This module provides:
//! - Templates keyed by (event type, channel) with `{{variable}}` placeholders
//! - A registry with default-template resolution
//! - Required-variable validation before substitution
//! - A small block markup compiled to HTML at render time
//!
//! # Example
//!
//! ```ignore
//! let registry = TemplateRegistry::new();
//! registry.register(NotificationTemplate {
//!     id: "host-alert-sms".to_string(),
//!     event_type: EventType::HostAlert,
//!     channel: ChannelType::Sms,
//!     subject: None,
//!     text: "{{visitor.name}} is waiting at reception".to_string(),
//!     html: None,
//!     html_format: HtmlFormat::Html,
//!     variables: vec!["visitor.name".to_string()],
//!     is_default: true,
//! })?;
//!
//! let rendered = registry.render("host-alert-sms", &json!({"visitor": {"name": "Ada"}}))?;
//! ```

mod defaults;
pub mod markup;
mod registry;
pub mod substitution;
mod types;

pub use defaults::builtin_templates;
pub use registry::{create_template_registry, render_template, TemplateRegistry};
pub use types::{
    HtmlFormat, NotificationTemplate, RenderedMessage, TemplateError, TemplateResult,
};
