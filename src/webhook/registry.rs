use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::error::WebhookError;
use super::types::{SubscriptionConfig, WebhookSubscription};

/// Webhook subscriptions keyed by id
pub struct WebhookRegistry {
    subscriptions: DashMap<String, WebhookSubscription>,
    default_max_retries: u32,
}

impl WebhookRegistry {
    pub fn new(default_max_retries: u32) -> Self {
        Self {
            subscriptions: DashMap::new(),
            default_max_retries,
        }
    }

    /// Insert or replace a subscription.
    ///
    /// Replacing keeps the observability counters of the previous entry.
    pub fn register_webhook(&self, id: &str, config: SubscriptionConfig) -> Result<(), WebhookError> {
        let invalid = |reason: &str| WebhookError::InvalidSubscription {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        if id.is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if !(config.url.starts_with("http://") || config.url.starts_with("https://")) {
            return Err(invalid("url must be http or https"));
        }
        if config.secret.is_empty() {
            return Err(invalid("secret must not be empty"));
        }

        let mut subscription = WebhookSubscription {
            id: id.to_string(),
            org_id: config.org_id,
            url: config.url,
            secret: config.secret,
            subscribed_events: config.subscribed_events,
            is_active: config.is_active,
            max_retries: config.max_retries.unwrap_or(self.default_max_retries),
            last_success_at: None,
            last_failure_at: None,
            failure_count: 0,
        };

        if let Some(previous) = self.subscriptions.get(id) {
            subscription.last_success_at = previous.last_success_at;
            subscription.last_failure_at = previous.last_failure_at;
            subscription.failure_count = previous.failure_count;
        }

        tracing::info!(
            subscription_id = %id,
            org_id = %subscription.org_id,
            events = subscription.subscribed_events.len(),
            active = subscription.is_active,
            "Webhook subscription registered"
        );
        self.subscriptions.insert(id.to_string(), subscription);
        Ok(())
    }

    pub fn unregister_webhook(&self, id: &str) -> Result<WebhookSubscription, WebhookError> {
        let (_, removed) = self
            .subscriptions
            .remove(id)
            .ok_or_else(|| WebhookError::NotFound(id.to_string()))?;
        tracing::info!(subscription_id = %id, "Webhook subscription removed");
        Ok(removed)
    }

    pub fn get(&self, id: &str) -> Option<WebhookSubscription> {
        self.subscriptions.get(id).map(|s| s.clone())
    }

    /// Active subscriptions of `org_id` subscribed to `event`, optionally
    /// restricted to `target_ids`. Sorted by id.
    pub fn select(
        &self,
        org_id: &str,
        event: &str,
        target_ids: Option<&[String]>,
    ) -> Vec<WebhookSubscription> {
        let mut selected: Vec<_> = self
            .subscriptions
            .iter()
            .filter(|entry| entry.matches(org_id, event))
            .filter(|entry| target_ids.map_or(true, |ids| ids.contains(&entry.id)))
            .map(|entry| entry.value().clone())
            .collect();
        selected.sort_by(|a, b| a.id.cmp(&b.id));
        selected
    }

    pub fn record_success(&self, id: &str, at: DateTime<Utc>) {
        if let Some(mut sub) = self.subscriptions.get_mut(id) {
            sub.last_success_at = Some(at);
        }
    }

    pub fn record_failure(&self, id: &str, at: DateTime<Utc>) {
        if let Some(mut sub) = self.subscriptions.get_mut(id) {
            sub.last_failure_at = Some(at);
            sub.failure_count += 1;
        }
    }

    pub fn list(&self) -> Vec<WebhookSubscription> {
        let mut all: Vec<_> = self.subscriptions.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT: &str = "visit.checked_in";

    fn config(org: &str) -> SubscriptionConfig {
        SubscriptionConfig::new(org, "https://example.com/hook", "secret", &[EVENT])
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = WebhookRegistry::new(3);
        registry.register_webhook("wh-1", config("org-1")).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("wh-1").unwrap().max_retries, 3);

        registry.unregister_webhook("wh-1").unwrap();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.unregister_webhook("wh-1"),
            Err(WebhookError::NotFound(_))
        ));
    }

    #[test]
    fn test_register_rejects_invalid() {
        let registry = WebhookRegistry::new(3);
        let bad_url = SubscriptionConfig {
            url: "ftp://example.com".to_string(),
            ..config("org-1")
        };
        assert!(registry.register_webhook("wh-1", bad_url).is_err());

        let no_secret = SubscriptionConfig {
            secret: String::new(),
            ..config("org-1")
        };
        assert!(registry.register_webhook("wh-1", no_secret).is_err());
        assert!(registry.register_webhook("", config("org-1")).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_select_filters() {
        let registry = WebhookRegistry::new(3);
        registry.register_webhook("wh-b", config("org-1")).unwrap();
        registry.register_webhook("wh-a", config("org-1")).unwrap();
        registry.register_webhook("wh-other-org", config("org-2")).unwrap();
        registry
            .register_webhook("wh-inactive", config("org-1").inactive())
            .unwrap();
        registry
            .register_webhook(
                "wh-other-event",
                SubscriptionConfig::new("org-1", "https://x.io", "s", &["visit.checked_out"]),
            )
            .unwrap();

        let ids: Vec<_> = registry
            .select("org-1", EVENT, None)
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["wh-a", "wh-b"]);

        let targets = vec!["wh-b".to_string(), "wh-inactive".to_string()];
        let ids: Vec<_> = registry
            .select("org-1", EVENT, Some(&targets))
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["wh-b"]);
    }

    #[test]
    fn test_observability_survives_reregistration() {
        let registry = WebhookRegistry::new(3);
        registry.register_webhook("wh-1", config("org-1")).unwrap();

        let now = Utc::now();
        registry.record_failure("wh-1", now);
        registry.record_failure("wh-1", now);
        registry.record_success("wh-1", now);

        registry
            .register_webhook("wh-1", config("org-1").max_retries(5))
            .unwrap();
        let sub = registry.get("wh-1").unwrap();
        assert_eq!(sub.failure_count, 2);
        assert_eq!(sub.last_success_at, Some(now));
        assert_eq!(sub.max_retries, 5);
    }
}
