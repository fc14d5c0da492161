//! Notification job and dispatch result types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::ChannelType;
use crate::ratelimit::RateCap;

/// Category of a visitor-management event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    #[serde(alias = "host_alert")]
    HostAlert,
    #[serde(alias = "visitor_confirmation")]
    VisitorConfirmation,
    #[serde(alias = "checkout_alert")]
    CheckoutAlert,
    #[serde(alias = "visit_reminder")]
    VisitReminder,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::HostAlert => "HOST_ALERT",
            EventType::VisitorConfirmation => "VISITOR_CONFIRMATION",
            EventType::CheckoutAlert => "CHECKOUT_ALERT",
            EventType::VisitReminder => "VISIT_REMINDER",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of dispatch work.
///
/// `current_index` and `retry_count` are the only fields that change after
/// creation; the fallback chain is fixed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationJob {
    pub id: String,
    pub event_type: EventType,
    pub template_data: Value,
    pub fallback_chain: Vec<ChannelType>,
    pub current_index: usize,
    pub retry_count: u32,
    pub max_retries: u32,
    pub subject_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
}

impl NotificationJob {
    /// Whether the chain walk has run past the last channel
    pub fn is_exhausted(&self) -> bool {
        self.current_index >= self.fallback_chain.len()
    }

    /// Rewind the chain for a whole-chain retry
    pub fn rewind_for_retry(&mut self, scheduled_at: DateTime<Utc>) {
        self.current_index = 0;
        self.retry_count += 1;
        self.scheduled_at = scheduled_at;
    }
}

/// Parameters of one emission
#[derive(Debug, Clone)]
pub struct EmitRequest {
    pub event_type: EventType,
    pub context: Value,
    pub subject_key: String,
    pub scope_key: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub job_id: Option<String>,
    pub max_retries: Option<u32>,
}

impl EmitRequest {
    pub fn new(event_type: EventType, context: Value, subject_key: impl Into<String>) -> Self {
        Self {
            event_type,
            context,
            subject_key: subject_key.into(),
            scope_key: None,
            scheduled_at: None,
            job_id: None,
            max_retries: None,
        }
    }

    /// Lifetime-capped accounting key (e.g. one visit)
    pub fn scope(mut self, scope_key: impl Into<String>) -> Self {
        self.scope_key = Some(scope_key.into());
        self
    }

    /// Deliver no earlier than this instant
    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    /// Use a caller-supplied job id instead of a generated one
    pub fn job_id(mut self, id: impl Into<String>) -> Self {
        self.job_id = Some(id.into());
        self
    }

    /// Override the configured whole-chain retry budget
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Why an emission did not produce a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    NoFallbackConfigured,
    RateLimited { cap: RateCap },
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoFallbackConfigured => "no_fallback_configured",
            SkipReason::RateLimited { .. } => "rate_limited",
        }
    }
}

/// Result of `emit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EmitOutcome {
    Enqueued { job_id: String },
    Skipped(SkipReason),
}

impl EmitOutcome {
    pub fn job_id(&self) -> Option<&str> {
        match self {
            EmitOutcome::Enqueued { job_id } => Some(job_id),
            EmitOutcome::Skipped(_) => None,
        }
    }
}

/// What happened at one position of the fallback chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepResult {
    Delivered { message_id: Option<String> },
    /// No provider registered for the channel; skipped without an attempt
    NoProvider,
    /// Context held no usable address for the channel
    NoRecipient,
    Failed { error: String },
    /// The provider panicked instead of returning a failure
    ProviderThrew { message: String },
    TimedOut,
}

impl StepResult {
    /// Whether a provider `send` was invoked for this step
    pub fn attempted(&self) -> bool {
        !matches!(self, StepResult::NoProvider | StepResult::NoRecipient)
    }

    pub fn describe(&self) -> String {
        match self {
            StepResult::Delivered { .. } => "delivered".to_string(),
            StepResult::NoProvider => "no provider registered".to_string(),
            StepResult::NoRecipient => "no recipient in context".to_string(),
            StepResult::Failed { error } => error.clone(),
            StepResult::ProviderThrew { message } => format!("provider panicked: {}", message),
            StepResult::TimedOut => "provider timed out".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub index: usize,
    pub channel: ChannelType,
    pub provider: Option<String>,
    pub result: StepResult,
}

/// Result of one walk of the fallback chain
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Delivered {
        channel: ChannelType,
        provider: String,
        message_id: Option<String>,
        template_id: String,
        steps: Vec<StepRecord>,
    },
    AllProvidersFailed {
        last_error: Option<String>,
        steps: Vec<StepRecord>,
    },
}

impl JobOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, JobOutcome::Delivered { .. })
    }

    pub fn steps(&self) -> &[StepRecord] {
        match self {
            JobOutcome::Delivered { steps, .. } | JobOutcome::AllProvidersFailed { steps, .. } => {
                steps
            }
        }
    }

    /// Providers actually invoked, in order
    pub fn attempted_providers(&self) -> Vec<&str> {
        self.steps()
            .iter()
            .filter(|s| s.result.attempted())
            .filter_map(|s| s.provider.as_deref())
            .collect()
    }
}

/// What the worker did with a job after running it
#[derive(Debug, Clone, PartialEq)]
pub enum JobDisposition {
    Delivered,
    RetryScheduled {
        retry_count: u32,
        delay: std::time::Duration,
    },
    Exhausted,
    /// Configuration error; the job is dropped without retry
    Failed(String),
}
