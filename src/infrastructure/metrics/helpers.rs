//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{
    JOBS_TERMINAL_TOTAL, JOB_RETRIES_TOTAL, NOTIFICATIONS_EMITTED_TOTAL,
    NOTIFICATIONS_SKIPPED_TOTAL, PROVIDER_ATTEMPTS_TOTAL, PROVIDER_SEND_LATENCY,
    QUEUE_IN_FLIGHT, QUEUE_RECOVERED_TOTAL, QUEUE_SCHEDULED, RATELIMIT_ALLOWED_TOTAL,
    RATELIMIT_DENIED_TOTAL, RATELIMIT_TRACKED_SUBJECTS, WEBHOOK_DELIVERIES_TOTAL,
    WEBHOOK_NONCE_CLEARS_TOTAL, WEBHOOK_REQUEST_LATENCY, WEBHOOK_RETRIES_TOTAL,
    WEBHOOK_SIGNATURE_REJECTED_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording notification dispatch metrics
pub struct DispatchMetrics;

impl DispatchMetrics {
    pub fn record_emitted(event_type: &str) {
        NOTIFICATIONS_EMITTED_TOTAL
            .with_label_values(&[event_type])
            .inc();
    }

    pub fn record_skipped(reason: &str) {
        NOTIFICATIONS_SKIPPED_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record one provider attempt and its latency
    pub fn record_attempt(channel: &str, provider: &str, success: bool, elapsed: Duration) {
        let outcome = if success { "success" } else { "failure" };
        PROVIDER_ATTEMPTS_TOTAL
            .with_label_values(&[channel, provider, outcome])
            .inc();
        PROVIDER_SEND_LATENCY
            .with_label_values(&[channel])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_terminal(outcome: &str) {
        JOBS_TERMINAL_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn record_retry_scheduled() {
        JOB_RETRIES_TOTAL.inc();
    }
}

/// Helper struct for recording rate limit metrics
pub struct RateLimitMetrics;

impl RateLimitMetrics {
    pub fn record_allowed() {
        RATELIMIT_ALLOWED_TOTAL.inc();
    }

    pub fn record_denied(cap: &str) {
        RATELIMIT_DENIED_TOTAL.with_label_values(&[cap]).inc();
    }

    pub fn set_tracked_subjects(count: usize) {
        RATELIMIT_TRACKED_SUBJECTS.set(count as i64);
    }
}

/// Helper struct for job queue metrics
pub struct QueueMetrics;

impl QueueMetrics {
    pub fn set_depth(scheduled: usize, in_flight: usize) {
        QUEUE_SCHEDULED.set(scheduled as i64);
        QUEUE_IN_FLIGHT.set(in_flight as i64);
    }

    pub fn record_recovered(count: usize) {
        QUEUE_RECOVERED_TOTAL.inc_by(count as u64);
    }
}

/// Helper struct for webhook metrics
pub struct WebhookMetrics;

impl WebhookMetrics {
    pub fn record_delivered() {
        WEBHOOK_DELIVERIES_TOTAL.with_label_values(&["delivered"]).inc();
    }

    pub fn record_exhausted() {
        WEBHOOK_DELIVERIES_TOTAL.with_label_values(&["exhausted"]).inc();
    }

    pub fn record_retry() {
        WEBHOOK_RETRIES_TOTAL.inc();
    }

    pub fn record_request_latency(elapsed: Duration) {
        WEBHOOK_REQUEST_LATENCY.observe(elapsed.as_secs_f64());
    }

    pub fn record_signature_rejected(reason: &str) {
        WEBHOOK_SIGNATURE_REJECTED_TOTAL
            .with_label_values(&[reason])
            .inc();
    }

    pub fn record_nonce_clear() {
        WEBHOOK_NONCE_CLEARS_TOTAL.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_recorded_metrics() {
        DispatchMetrics::record_emitted("HOST_ALERT");
        RateLimitMetrics::record_denied("hourly");
        WebhookMetrics::record_delivered();

        let output = encode_metrics().unwrap();
        assert!(output.contains("vd_notifications_emitted_total"));
        assert!(output.contains("vd_ratelimit_denied_total"));
        assert!(output.contains("vd_webhook_deliveries_total"));
    }
}
