use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const HEADER_SIGNATURE: &str = "X-Webhook-Signature";
pub const HEADER_EVENT: &str = "X-Webhook-Event";
pub const HEADER_TIMESTAMP: &str = "X-Webhook-Timestamp";
pub const HEADER_NONCE: &str = "X-Webhook-Nonce";

/// Subscription settings supplied by the management interface
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    pub org_id: String,
    pub url: String,
    pub secret: String,
    pub subscribed_events: HashSet<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Overrides the dispatcher's retry budget
    #[serde(default)]
    pub max_retries: Option<u32>,
}

fn default_active() -> bool {
    true
}

impl SubscriptionConfig {
    pub fn new(
        org_id: impl Into<String>,
        url: impl Into<String>,
        secret: impl Into<String>,
        events: &[&str],
    ) -> Self {
        Self {
            org_id: org_id.into(),
            url: url.into(),
            secret: secret.into(),
            subscribed_events: events.iter().map(|e| e.to_string()).collect(),
            is_active: true,
            max_retries: None,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// A registered webhook endpoint
#[derive(Debug, Clone, Serialize)]
pub struct WebhookSubscription {
    pub id: String,
    pub org_id: String,
    pub url: String,
    #[serde(skip_serializing)]
    pub secret: String,
    pub subscribed_events: HashSet<String>,
    pub is_active: bool,
    pub max_retries: u32,
    // Observability only; never consulted when selecting targets
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub failure_count: u64,
}

impl WebhookSubscription {
    /// Whether a broadcast of `event` to `org_id` should reach this endpoint
    pub fn matches(&self, org_id: &str, event: &str) -> bool {
        self.is_active && self.org_id == org_id && self.subscribed_events.contains(event)
    }
}

/// JSON body of every webhook POST
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "orgId")]
    pub org_id: String,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Delivered { status: u16 },
    Rejected { status: u16 },
    TransportFailed { error: String },
    TimedOut,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Delivered { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            AttemptOutcome::Delivered { status } => format!("delivered with status {}", status),
            AttemptOutcome::Rejected { status } => format!("endpoint responded {}", status),
            AttemptOutcome::TransportFailed { error } => error.clone(),
            AttemptOutcome::TimedOut => "request timed out".to_string(),
        }
    }
}

/// One POST of a delivery retry loop
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryAttempt {
    pub subscription_id: String,
    /// 1-based
    pub attempt: u32,
    pub signature: String,
    pub nonce: String,
    pub outcome: AttemptOutcome,
}

/// Final result of delivering one broadcast to one subscription
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub subscription_id: String,
    pub delivered: bool,
    pub attempts: Vec<DeliveryAttempt>,
}

impl DeliveryReport {
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    pub fn last_error(&self) -> Option<String> {
        self.attempts
            .last()
            .filter(|a| !a.outcome.is_success())
            .map(|a| a.outcome.describe())
    }
}
