//! Template registry keyed by id and by (event type, channel)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;

use super::markup;
use super::substitution::{missing_variables, substitute_string};
use super::types::{
    HtmlFormat, NotificationTemplate, RenderedMessage, TemplateError, TemplateResult,
};
use crate::channel::ChannelType;
use crate::notification::EventType;

/// In-memory template registry.
///
/// Templates are immutable once registered. Candidates for a key keep their
/// registration order so resolution is deterministic.
pub struct TemplateRegistry {
    templates: DashMap<String, NotificationTemplate>,
    by_type: DashMap<(EventType, ChannelType), Vec<(u64, String)>>,
    sequence: AtomicU64,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
            by_type: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Registry pre-loaded with the built-in templates
    pub fn with_builtin() -> TemplateResult<Self> {
        let registry = Self::new();
        registry.register_builtin()?;
        Ok(registry)
    }

    /// Register the built-in templates.
    ///
    /// An id already taken by a configured template is kept as configured;
    /// any other rejection is an error.
    pub fn register_builtin(&self) -> TemplateResult<usize> {
        let mut registered = 0;
        for template in super::builtin_templates() {
            match self.register(template) {
                Ok(()) => registered += 1,
                Err(TemplateError::AlreadyExists(id)) => {
                    tracing::info!(template_id = %id, "Built-in template overridden by configuration");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(registered)
    }

    /// Register a new template
    pub fn register(&self, template: NotificationTemplate) -> TemplateResult<()> {
        template.validate()?;

        let key = (template.event_type, template.channel);
        let id = template.id.clone();

        match self.templates.entry(id.clone()) {
            Entry::Occupied(_) => return Err(TemplateError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(template);
            }
        }

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.by_type.entry(key).or_default().push((seq, id.clone()));

        tracing::debug!(
            template_id = %id,
            event_type = %key.0,
            channel = %key.1,
            "Template registered"
        );
        Ok(())
    }

    /// Get a template by ID
    pub fn get(&self, id: &str) -> TemplateResult<NotificationTemplate> {
        self.templates
            .get(id)
            .map(|t| t.clone())
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }

    /// Candidate templates for an event type, optionally narrowed to a
    /// channel, in registration order
    pub fn templates_by_type(
        &self,
        event_type: EventType,
        channel: Option<ChannelType>,
    ) -> Vec<NotificationTemplate> {
        let mut ids: Vec<(u64, String)> = match channel {
            Some(channel) => self
                .by_type
                .get(&(event_type, channel))
                .map(|ids| ids.clone())
                .unwrap_or_default(),
            None => self
                .by_type
                .iter()
                .filter(|entry| entry.key().0 == event_type)
                .flat_map(|entry| entry.value().clone())
                .collect(),
        };
        ids.sort_by_key(|(seq, _)| *seq);

        ids.into_iter()
            .filter_map(|(_, id)| self.templates.get(&id).map(|t| t.clone()))
            .collect()
    }

    /// The template to use for an (event type, channel) pair: the one flagged
    /// default, else the first registered
    pub fn resolve(
        &self,
        event_type: EventType,
        channel: ChannelType,
    ) -> Option<NotificationTemplate> {
        let candidates = self.templates_by_type(event_type, Some(channel));
        candidates
            .iter()
            .find(|t| t.is_default)
            .or_else(|| candidates.first())
            .cloned()
    }

    /// Render a template by id
    pub fn render(&self, id: &str, context: &Value) -> TemplateResult<RenderedMessage> {
        let template = self.get(id)?;
        render_template(&template, context)
    }

    pub fn count(&self) -> usize {
        self.templates.len()
    }

    pub fn list(&self) -> Vec<NotificationTemplate> {
        self.templates
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

/// Render an already-resolved template.
///
/// Declared variables are checked before any substitution happens.
pub fn render_template(
    template: &NotificationTemplate,
    context: &Value,
) -> TemplateResult<RenderedMessage> {
    let missing = missing_variables(&template.variables, context);
    if !missing.is_empty() {
        return Err(TemplateError::Render {
            template_id: template.id.clone(),
            missing,
        });
    }

    let subject = template
        .subject
        .as_deref()
        .map(|s| substitute_string(s, context, false));
    let text = substitute_string(&template.text, context, false);

    let html = template.html.as_deref().map(|source| {
        let compiled = match template.html_format {
            HtmlFormat::Html => source.to_string(),
            HtmlFormat::Markup => match markup::compile(source) {
                Ok(html) => html,
                Err(e) => {
                    tracing::warn!(
                        template_id = %template.id,
                        error = %e,
                        "Markup compilation failed, using uncompiled body"
                    );
                    source.to_string()
                }
            },
        };
        substitute_string(&compiled, context, true)
    });

    Ok(RenderedMessage {
        subject,
        text,
        html,
    })
}

/// Create an Arc-wrapped registry with the built-in templates
pub fn create_template_registry() -> TemplateResult<Arc<TemplateRegistry>> {
    Ok(Arc::new(TemplateRegistry::with_builtin()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::builtin_templates;
    use serde_json::json;

    fn template(id: &str, channel: ChannelType, is_default: bool) -> NotificationTemplate {
        NotificationTemplate {
            id: id.to_string(),
            event_type: EventType::HostAlert,
            channel,
            subject: Some("{{visitor.name}} has arrived".to_string()),
            text: "{{visitor.name}} is waiting for you".to_string(),
            html: None,
            html_format: HtmlFormat::Html,
            variables: vec!["visitor.name".to_string()],
            is_default,
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = TemplateRegistry::new();
        registry
            .register(template("host-sms", ChannelType::Sms, false))
            .unwrap();

        assert_eq!(registry.get("host-sms").unwrap().channel, ChannelType::Sms);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_register_duplicate_rejected() {
        let registry = TemplateRegistry::new();
        registry
            .register(template("dup", ChannelType::Sms, false))
            .unwrap();
        let result = registry.register(template("dup", ChannelType::Email, false));
        assert!(matches!(result, Err(TemplateError::AlreadyExists(_))));
        assert!(registry.resolve(EventType::HostAlert, ChannelType::Email).is_none());
    }

    #[test]
    fn test_render_unknown_id() {
        let registry = TemplateRegistry::new();
        let result = registry.render("missing", &json!({}));
        assert!(matches!(result, Err(TemplateError::NotFound(_))));
    }

    #[test]
    fn test_resolve_prefers_default() {
        let registry = TemplateRegistry::new();
        registry
            .register(template("first", ChannelType::Email, false))
            .unwrap();
        registry
            .register(template("preferred", ChannelType::Email, true))
            .unwrap();

        let resolved = registry
            .resolve(EventType::HostAlert, ChannelType::Email)
            .unwrap();
        assert_eq!(resolved.id, "preferred");
    }

    #[test]
    fn test_resolve_falls_back_to_first_registered() {
        let registry = TemplateRegistry::new();
        for id in ["a-first", "b-second", "c-third"] {
            registry
                .register(template(id, ChannelType::Chat, false))
                .unwrap();
        }
        let resolved = registry
            .resolve(EventType::HostAlert, ChannelType::Chat)
            .unwrap();
        assert_eq!(resolved.id, "a-first");
    }

    #[test]
    fn test_templates_by_type_across_channels_keeps_order() {
        let registry = TemplateRegistry::new();
        registry.register(template("t1", ChannelType::Sms, false)).unwrap();
        registry.register(template("t2", ChannelType::Email, false)).unwrap();
        registry.register(template("t3", ChannelType::Sms, false)).unwrap();

        let ids: Vec<String> = registry
            .templates_by_type(EventType::HostAlert, None)
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);

        let sms = registry.templates_by_type(EventType::HostAlert, Some(ChannelType::Sms));
        assert_eq!(sms.len(), 2);
        assert!(registry
            .templates_by_type(EventType::CheckoutAlert, None)
            .is_empty());
    }

    #[test]
    fn test_render_missing_required_variable() {
        let registry = TemplateRegistry::new();
        registry.register(template("t", ChannelType::Sms, false)).unwrap();

        let result = registry.render("t", &json!({"host": {"name": "Grace"}}));
        match result {
            Err(TemplateError::Render { missing, .. }) => {
                assert_eq!(missing, vec!["visitor.name".to_string()]);
            }
            other => panic!("expected render error, got {:?}", other),
        }
    }

    #[test]
    fn test_render_ignores_extra_variables() {
        let registry = TemplateRegistry::new();
        registry.register(template("t", ChannelType::Email, false)).unwrap();

        let rendered = registry
            .render("t", &json!({"visitor": {"name": "Ada", "company": "ACME"}, "unused": 1}))
            .unwrap();
        assert_eq!(rendered.subject.as_deref(), Some("Ada has arrived"));
        assert_eq!(rendered.text, "Ada is waiting for you");
        assert!(rendered.html.is_none());
    }

    #[test]
    fn test_render_html_escapes_values() {
        let registry = TemplateRegistry::new();
        let mut t = template("html", ChannelType::Email, false);
        t.html = Some("<p>{{visitor.name}}</p>".to_string());
        registry.register(t).unwrap();

        let rendered = registry
            .render("html", &json!({"visitor": {"name": "Tom & Jerry"}}))
            .unwrap();
        assert_eq!(rendered.text, "Tom & Jerry is waiting for you");
        assert_eq!(rendered.html.as_deref(), Some("<p>Tom &amp; Jerry</p>"));
    }

    #[test]
    fn test_render_markup_compiles() {
        let registry = TemplateRegistry::new();
        let mut t = template("markup", ChannelType::Email, false);
        t.html = Some("[heading]{{visitor.name}}[/heading]".to_string());
        t.html_format = HtmlFormat::Markup;
        registry.register(t).unwrap();

        let html = registry
            .render("markup", &json!({"visitor": {"name": "Ada"}}))
            .unwrap()
            .html
            .unwrap();
        assert!(html.contains("<h1>Ada</h1>"));
    }

    #[test]
    fn test_render_markup_error_falls_back() {
        let registry = TemplateRegistry::new();
        let mut t = template("broken", ChannelType::Email, false);
        t.html = Some("[heading]{{visitor.name}}".to_string());
        t.html_format = HtmlFormat::Markup;
        registry.register(t).unwrap();

        let rendered = registry
            .render("broken", &json!({"visitor": {"name": "Ada"}}))
            .unwrap();
        assert_eq!(rendered.html.as_deref(), Some("[heading]Ada"));
    }

    #[test]
    fn test_configured_template_wins_over_builtin() {
        let registry = TemplateRegistry::new();
        registry
            .register(template("custom-host-sms", ChannelType::Sms, false))
            .unwrap();
        registry.register_builtin().unwrap();

        let resolved = registry
            .resolve(EventType::HostAlert, ChannelType::Sms)
            .unwrap();
        assert_eq!(resolved.id, "custom-host-sms");
    }

    #[test]
    fn test_with_builtin_covers_default_chains() {
        let registry = TemplateRegistry::with_builtin().unwrap();
        assert_eq!(registry.count(), builtin_templates().len());
        for (event, channel) in [
            (EventType::HostAlert, ChannelType::Sms),
            (EventType::HostAlert, ChannelType::Email),
            (EventType::HostAlert, ChannelType::Chat),
            (EventType::VisitorConfirmation, ChannelType::Email),
            (EventType::VisitorConfirmation, ChannelType::Sms),
            (EventType::CheckoutAlert, ChannelType::Chat),
            (EventType::CheckoutAlert, ChannelType::Email),
            (EventType::VisitReminder, ChannelType::Email),
            (EventType::VisitReminder, ChannelType::Sms),
        ] {
            assert!(
                registry.resolve(event, channel).is_some(),
                "missing built-in for {} / {}",
                event,
                channel
            );
        }
    }

    #[test]
    fn test_builtin_plain_channels_render_text_only() {
        let registry = TemplateRegistry::with_builtin().unwrap();
        let sms = registry
            .resolve(EventType::HostAlert, ChannelType::Sms)
            .unwrap();
        assert_eq!(sms.html_format, HtmlFormat::Html);

        let rendered = registry
            .render(
                &sms.id,
                &json!({"visitor": {"name": "Ada"}, "location": {"name": "Lobby"}}),
            )
            .unwrap();
        assert_eq!(
            rendered.text,
            "Ada has arrived and is waiting for you at Lobby."
        );
        assert!(rendered.html.is_none());
    }

    #[test]
    fn test_builtin_id_taken_by_configuration_is_kept() {
        let registry = TemplateRegistry::new();
        let mut custom = template("builtin.host_alert.sms", ChannelType::Sms, false);
        custom.text = "Custom {{visitor.name}}".to_string();
        registry.register(custom).unwrap();

        let registered = registry.register_builtin().unwrap();
        assert_eq!(registered, builtin_templates().len() - 1);
        assert_eq!(
            registry.get("builtin.host_alert.sms").unwrap().text,
            "Custom {{visitor.name}}"
        );
    }
}
