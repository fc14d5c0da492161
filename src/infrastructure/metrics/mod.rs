//! Prometheus metrics for the dispatch service.
//!
//! This module provides metrics for monitoring:
//! - Notification emission, skips and chain walks
//! - Provider attempts per channel and outcome
//! - Rate limiting decisions per cap
//! - Job queue depth and retries
//! - Webhook deliveries, retries and signature rejections

mod helpers;

pub use helpers::{
    encode_metrics, DispatchMetrics, QueueMetrics, RateLimitMetrics, WebhookMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "vd";

lazy_static! {
    // ============================================================================
    // Notification Metrics
    // ============================================================================

    /// Notifications accepted and enqueued, by event type
    pub static ref NOTIFICATIONS_EMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_emitted_total", METRIC_PREFIX),
        "Total notifications enqueued for delivery",
        &["event_type"]
    ).unwrap();

    /// Emissions skipped before enqueueing, by reason
    pub static ref NOTIFICATIONS_SKIPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_skipped_total", METRIC_PREFIX),
        "Total notifications skipped at emit time",
        &["reason"]
    ).unwrap();

    /// Provider send attempts by channel, provider and outcome
    pub static ref PROVIDER_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_provider_attempts_total", METRIC_PREFIX),
        "Total provider send attempts",
        &["channel", "provider", "outcome"]
    ).unwrap();

    /// Provider send latency in seconds
    pub static ref PROVIDER_SEND_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_provider_send_latency_seconds", METRIC_PREFIX),
        "Provider send latency in seconds",
        &["channel"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Jobs reaching a terminal state, by outcome
    pub static ref JOBS_TERMINAL_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_jobs_terminal_total", METRIC_PREFIX),
        "Total jobs that reached a terminal state",
        &["outcome"]
    ).unwrap();

    /// Whole-chain retries scheduled
    pub static ref JOB_RETRIES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_job_retries_total", METRIC_PREFIX),
        "Total whole-chain job retries scheduled"
    ).unwrap();

    // ============================================================================
    // Rate Limit Metrics
    // ============================================================================

    /// Rate limit allowed decisions
    pub static ref RATELIMIT_ALLOWED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_ratelimit_allowed_total", METRIC_PREFIX),
        "Total sends allowed by the rate limiter"
    ).unwrap();

    /// Rate limit denials by cap
    pub static ref RATELIMIT_DENIED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_ratelimit_denied_total", METRIC_PREFIX),
        "Total sends denied by the rate limiter",
        &["cap"]
    ).unwrap();

    /// Subjects currently tracked by the rate limiter
    pub static ref RATELIMIT_TRACKED_SUBJECTS: IntGauge = register_int_gauge!(
        format!("{}_ratelimit_tracked_subjects", METRIC_PREFIX),
        "Number of subjects with live rate windows"
    ).unwrap();

    // ============================================================================
    // Queue Metrics
    // ============================================================================

    /// Jobs waiting in the queue (scheduled, not yet claimed)
    pub static ref QUEUE_SCHEDULED: IntGauge = register_int_gauge!(
        format!("{}_queue_scheduled_jobs", METRIC_PREFIX),
        "Jobs scheduled and waiting to be claimed"
    ).unwrap();

    /// Jobs currently claimed by workers
    pub static ref QUEUE_IN_FLIGHT: IntGauge = register_int_gauge!(
        format!("{}_queue_in_flight_jobs", METRIC_PREFIX),
        "Jobs claimed by a worker and not yet completed"
    ).unwrap();

    /// Leases recovered after a worker crash or timeout
    pub static ref QUEUE_RECOVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_queue_recovered_total", METRIC_PREFIX),
        "Total expired job leases returned to the queue"
    ).unwrap();

    // ============================================================================
    // Webhook Metrics
    // ============================================================================

    /// Webhook deliveries by final outcome
    pub static ref WEBHOOK_DELIVERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_webhook_deliveries_total", METRIC_PREFIX),
        "Total webhook deliveries by final outcome",
        &["outcome"]
    ).unwrap();

    /// Webhook retry attempts
    pub static ref WEBHOOK_RETRIES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_webhook_retries_total", METRIC_PREFIX),
        "Total webhook delivery retries"
    ).unwrap();

    /// Webhook request latency in seconds
    pub static ref WEBHOOK_REQUEST_LATENCY: Histogram = register_histogram!(
        format!("{}_webhook_request_latency_seconds", METRIC_PREFIX),
        "Webhook request latency in seconds",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Inbound signature rejections by reason
    pub static ref WEBHOOK_SIGNATURE_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_webhook_signature_rejected_total", METRIC_PREFIX),
        "Total rejected webhook signature validations",
        &["reason"]
    ).unwrap();

    /// Nonce store wholesale clears
    pub static ref WEBHOOK_NONCE_CLEARS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_webhook_nonce_clears_total", METRIC_PREFIX),
        "Total times the replay nonce store was cleared wholesale"
    ).unwrap();
}
