//! Signed webhook fan-out and inbound signature checks.
//!
//! A broadcast serializes one envelope, signs it per subscription and hands
//! each target to its own task. The task retries with the policy's backoff
//! and records the result on the subscription. Inbound deliveries are
//! checked with [`WebhookDispatcher::verify_delivery`], which also consumes
//! the nonce.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::config::WebhookSettings;
use crate::metrics::WebhookMetrics;

use super::error::{SignatureError, WebhookError};
use super::nonce::NonceStore;
use super::registry::WebhookRegistry;
use super::signing;
use super::transport::{WebhookRequest, WebhookTransport};
use super::types::{
    AttemptOutcome, DeliveryAttempt, DeliveryReport, WebhookEnvelope, WebhookSubscription,
    HEADER_EVENT, HEADER_NONCE, HEADER_SIGNATURE, HEADER_TIMESTAMP,
};

/// Webhook counters
#[derive(Debug, Default)]
pub struct WebhookStats {
    pub broadcasts: AtomicU64,
    pub deliveries: AtomicU64,
    pub delivered: AtomicU64,
    pub exhausted: AtomicU64,
    pub attempts: AtomicU64,
    pub retries: AtomicU64,
    pub signatures_rejected: AtomicU64,
    pub replays_rejected: AtomicU64,
}

impl WebhookStats {
    pub fn snapshot(&self) -> WebhookStatsSnapshot {
        WebhookStatsSnapshot {
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            signatures_rejected: self.signatures_rejected.load(Ordering::Relaxed),
            replays_rejected: self.replays_rejected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookStatsSnapshot {
    pub broadcasts: u64,
    pub deliveries: u64,
    pub delivered: u64,
    pub exhausted: u64,
    pub attempts: u64,
    pub retries: u64,
    pub signatures_rejected: u64,
    pub replays_rejected: u64,
}

/// Deliveries started by one broadcast.
///
/// Dropping the handle does not cancel anything.
pub struct BroadcastHandle {
    nonce: String,
    subscription_ids: Vec<String>,
    tasks: Vec<JoinHandle<DeliveryReport>>,
}

impl BroadcastHandle {
    /// Nonce shared by every delivery of this broadcast
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn subscription_ids(&self) -> &[String] {
        &self.subscription_ids
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every delivery to finish its retry loop
    pub async fn wait(self) -> Vec<DeliveryReport> {
        join_all(self.tasks)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(report) => Some(report),
                Err(e) => {
                    tracing::error!(error = %e, "Webhook delivery task failed");
                    None
                }
            })
            .collect()
    }
}

/// Signs and delivers events to webhook subscriptions
pub struct WebhookDispatcher {
    registry: Arc<WebhookRegistry>,
    transport: Arc<dyn WebhookTransport>,
    nonces: NonceStore,
    settings: WebhookSettings,
    clock: Arc<dyn Clock>,
    stats: WebhookStats,
}

impl WebhookDispatcher {
    pub fn new(
        settings: WebhookSettings,
        registry: Arc<WebhookRegistry>,
        transport: Arc<dyn WebhookTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            transport,
            nonces: NonceStore::new(settings.max_nonces),
            settings,
            clock,
            stats: WebhookStats::default(),
        }
    }

    pub fn registry(&self) -> &Arc<WebhookRegistry> {
        &self.registry
    }

    pub fn nonces(&self) -> &NonceStore {
        &self.nonces
    }

    pub fn stats(&self) -> WebhookStatsSnapshot {
        self.stats.snapshot()
    }

    /// Fan an event out to every matching subscription of `org_id`.
    ///
    /// Each subscription is delivered on its own task. The envelope and its
    /// nonce are built once and reused by every target and every retry.
    #[tracing::instrument(skip(self, data, target_ids), fields(event = %event, org_id = %org_id))]
    pub fn broadcast(
        self: &Arc<Self>,
        event: &str,
        data: Value,
        org_id: &str,
        target_ids: Option<&[String]>,
    ) -> Result<BroadcastHandle, WebhookError> {
        let targets = self.registry.select(org_id, event, target_ids);
        let envelope = WebhookEnvelope {
            event: event.to_string(),
            data,
            timestamp: self.clock.now(),
            org_id: org_id.to_string(),
            nonce: generate_nonce(),
        };
        let body = serde_json::to_vec(&envelope)?;
        let timestamp = envelope.timestamp.timestamp().to_string();

        self.stats.broadcasts.fetch_add(1, Ordering::Relaxed);
        if targets.is_empty() {
            tracing::debug!("No webhook subscriptions match broadcast");
        } else {
            tracing::info!(targets = targets.len(), nonce = %envelope.nonce, "Broadcasting webhook event");
        }

        let subscription_ids = targets.iter().map(|s| s.id.clone()).collect();
        let tasks = targets
            .into_iter()
            .map(|subscription| {
                let dispatcher = Arc::clone(self);
                let request = WebhookRequest {
                    url: subscription.url.clone(),
                    headers: vec![
                        (HEADER_SIGNATURE, signing::sign(&body, &subscription.secret)),
                        (HEADER_EVENT, envelope.event.clone()),
                        (HEADER_TIMESTAMP, timestamp.clone()),
                        (HEADER_NONCE, envelope.nonce.clone()),
                        ("User-Agent", self.settings.user_agent.clone()),
                    ],
                    body: body.clone(),
                };
                tokio::spawn(async move { dispatcher.deliver(subscription, request).await })
            })
            .collect();

        Ok(BroadcastHandle {
            nonce: envelope.nonce,
            subscription_ids,
            tasks,
        })
    }

    /// POST until a 2xx response or the subscription's retry budget is spent
    async fn deliver(&self, subscription: WebhookSubscription, request: WebhookRequest) -> DeliveryReport {
        self.stats.deliveries.fetch_add(1, Ordering::Relaxed);

        let policy = self
            .settings
            .retry
            .clone()
            .with_max_retries(subscription.max_retries);
        let request_timeout = Duration::from_millis(self.settings.request_timeout_ms);
        let signature = request.header(HEADER_SIGNATURE).unwrap_or_default().to_string();
        let nonce = request.header(HEADER_NONCE).unwrap_or_default().to_string();
        let max_attempts = subscription.max_retries + 1;
        let mut attempts = Vec::new();

        for attempt in 1..=max_attempts {
            let started = Instant::now();
            let outcome = match tokio::time::timeout(request_timeout, self.transport.post(&request)).await {
                Err(_) => AttemptOutcome::TimedOut,
                Ok(Err(e)) => AttemptOutcome::TransportFailed { error: e.to_string() },
                Ok(Ok(status)) if (200..300).contains(&status) => AttemptOutcome::Delivered { status },
                Ok(Ok(status)) => AttemptOutcome::Rejected { status },
            };
            WebhookMetrics::record_request_latency(started.elapsed());
            self.stats.attempts.fetch_add(1, Ordering::Relaxed);

            let success = outcome.is_success();
            attempts.push(DeliveryAttempt {
                subscription_id: subscription.id.clone(),
                attempt,
                signature: signature.clone(),
                nonce: nonce.clone(),
                outcome: outcome.clone(),
            });

            if success {
                self.registry.record_success(&subscription.id, self.clock.now());
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                WebhookMetrics::record_delivered();
                tracing::info!(
                    subscription_id = %subscription.id,
                    attempt = attempt,
                    "Webhook delivered"
                );
                return DeliveryReport {
                    subscription_id: subscription.id,
                    delivered: true,
                    attempts,
                };
            }

            if attempt < max_attempts {
                let delay = policy.delay_for_attempt(attempt);
                self.stats.retries.fetch_add(1, Ordering::Relaxed);
                WebhookMetrics::record_retry();
                tracing::warn!(
                    subscription_id = %subscription.id,
                    attempt = attempt,
                    error = %outcome.describe(),
                    delay_ms = delay.as_millis() as u64,
                    "Webhook delivery failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        let report = DeliveryReport {
            subscription_id: subscription.id.clone(),
            delivered: false,
            attempts,
        };
        self.registry.record_failure(&subscription.id, self.clock.now());
        self.stats.exhausted.fetch_add(1, Ordering::Relaxed);
        WebhookMetrics::record_exhausted();
        tracing::error!(
            subscription_id = %subscription.id,
            url = %subscription.url,
            attempts = report.attempt_count(),
            last_error = ?report.last_error(),
            "Webhook delivery failed after all retries"
        );
        report
    }

    /// Verify an inbound delivery.
    ///
    /// When a nonce is given it must not have been accepted before; it is
    /// recorded only once the signature checks out.
    pub fn verify_delivery(
        &self,
        payload: &[u8],
        signature_header: &str,
        secret: &str,
        nonce: Option<&str>,
    ) -> Result<(), SignatureError> {
        let result = signing::verify(payload, signature_header, secret).and_then(|()| match nonce {
            Some(nonce) if !self.nonces.insert(nonce) => Err(SignatureError::Replayed),
            _ => Ok(()),
        });

        if let Err(e) = &result {
            let counter = match e {
                SignatureError::Replayed => &self.stats.replays_rejected,
                _ => &self.stats.signatures_rejected,
            };
            counter.fetch_add(1, Ordering::Relaxed);
            WebhookMetrics::record_signature_rejected(e.as_str());
            tracing::warn!(reason = %e, "Webhook signature rejected");
        }
        result
    }

    /// Boolean form of [`verify_delivery`](Self::verify_delivery)
    pub fn validate_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
        secret: &str,
        nonce: Option<&str>,
    ) -> bool {
        self.verify_delivery(payload, signature_header, secret, nonce)
            .is_ok()
    }
}

/// 128-bit random hex token
fn generate_nonce() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::retry::RetryPolicy;
    use crate::webhook::transport::TransportError;
    use crate::webhook::SubscriptionConfig;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    const EVENT: &str = "visit.checked_in";

    #[derive(Clone, Copy)]
    enum Endpoint {
        Ok,
        Status(u16),
        Refuse,
        Hang,
        /// Fails this many times, then succeeds
        FlakyFor(usize),
    }

    struct FakeTransport {
        endpoints: HashMap<String, Endpoint>,
        requests: Mutex<Vec<WebhookRequest>>,
        delivered: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl WebhookTransport for FakeTransport {
        async fn post(&self, request: &WebhookRequest) -> Result<u16, TransportError> {
            let seen = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(request.clone());
                requests.iter().filter(|r| r.url == request.url).count()
            };
            let result = match self.endpoints.get(&request.url).copied().unwrap_or(Endpoint::Ok) {
                Endpoint::Ok => Ok(200),
                Endpoint::Status(status) => Ok(status),
                Endpoint::Refuse => Err(TransportError::Other("connection refused".to_string())),
                Endpoint::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(200)
                }
                Endpoint::FlakyFor(n) if seen <= n => Ok(503),
                Endpoint::FlakyFor(_) => Ok(204),
            };
            if matches!(result, Ok(s) if (200..300).contains(&s)) {
                let _ = self.delivered.send(request.url.clone());
            }
            result
        }
    }

    struct Harness {
        dispatcher: Arc<WebhookDispatcher>,
        transport: Arc<FakeTransport>,
        delivered: mpsc::UnboundedReceiver<String>,
    }

    fn harness(endpoints: &[(&str, Endpoint)]) -> Harness {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(FakeTransport {
            endpoints: endpoints
                .iter()
                .map(|(url, e)| (url.to_string(), *e))
                .collect(),
            requests: Mutex::new(Vec::new()),
            delivered: tx,
        });
        let settings = WebhookSettings {
            retry: RetryPolicy {
                max_retries: 3,
                initial_delay_ms: 1_000,
                multiplier: 2.0,
                max_delay_ms: 60_000,
                jitter_factor: 0.0,
            },
            request_timeout_ms: 5_000,
            max_nonces: 100,
            user_agent: "VisitorDispatch-Webhooks/1.0".to_string(),
        };
        let registry = Arc::new(WebhookRegistry::new(settings.retry.max_retries));
        let dispatcher = Arc::new(WebhookDispatcher::new(
            settings,
            registry,
            transport.clone(),
            Arc::new(ManualClock::starting_now()),
        ));
        Harness {
            dispatcher,
            transport,
            delivered: rx,
        }
    }

    fn subscribe(h: &Harness, id: &str, url: &str) {
        h.dispatcher
            .registry()
            .register_webhook(id, SubscriptionConfig::new("org-1", url, format!("{}-secret", id), &[EVENT]))
            .unwrap();
    }

    #[tokio::test]
    async fn test_broadcast_signs_each_target() {
        let h = harness(&[]);
        subscribe(&h, "a", "https://a.example/hook");
        subscribe(&h, "b", "https://b.example/hook");

        let handle = h
            .dispatcher
            .broadcast(EVENT, json!({"visitId": "v-1"}), "org-1", None)
            .unwrap();
        let nonce = handle.nonce().to_string();
        assert_eq!(handle.subscription_ids(), ["a".to_string(), "b".to_string()]);

        let reports = handle.wait().await;
        assert!(reports.iter().all(|r| r.delivered && r.attempt_count() == 1));

        let requests = h.transport.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        // Same body and nonce for every target, distinct signatures
        assert_eq!(requests[0].body, requests[1].body);
        assert!(requests.iter().all(|r| r.header(HEADER_NONCE) == Some(nonce.as_str())));
        assert_ne!(requests[0].header(HEADER_SIGNATURE), requests[1].header(HEADER_SIGNATURE));

        for request in &requests {
            let id = if request.url.contains("a.example") { "a" } else { "b" };
            let signature = request.header(HEADER_SIGNATURE).unwrap();
            assert!(signing::verify(&request.body, signature, &format!("{}-secret", id)).is_ok());
            assert_eq!(request.header(HEADER_EVENT), Some(EVENT));
            assert_eq!(request.header("user-agent"), Some("VisitorDispatch-Webhooks/1.0"));
        }

        let envelope: WebhookEnvelope = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(envelope.nonce, nonce);
        assert_eq!(envelope.org_id, "org-1");
        assert_eq!(
            requests[0].header(HEADER_TIMESTAMP),
            Some(envelope.timestamp.timestamp().to_string().as_str())
        );
    }

    #[tokio::test]
    async fn test_broadcast_without_targets() {
        let h = harness(&[]);
        subscribe(&h, "a", "https://a.example/hook");

        let handle = h
            .dispatcher
            .broadcast(EVENT, json!({}), "org-2", None)
            .unwrap();
        assert!(handle.is_empty());
        assert!(handle.wait().await.is_empty());
        assert_eq!(h.dispatcher.stats().broadcasts, 1);
    }

    #[tokio::test]
    async fn test_broadcast_to_targets_only() {
        let h = harness(&[]);
        subscribe(&h, "a", "https://a.example/hook");
        subscribe(&h, "b", "https://b.example/hook");

        let targets = vec!["b".to_string()];
        let reports = h
            .dispatcher
            .broadcast(EVENT, json!({}), "org-1", Some(&targets))
            .unwrap()
            .wait()
            .await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].subscription_id, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_backoff_reusing_envelope() {
        let url = "https://flaky.example/hook";
        let h = harness(&[(url, Endpoint::FlakyFor(2))]);
        subscribe(&h, "flaky", url);

        let started = tokio::time::Instant::now();
        let reports = h
            .dispatcher
            .broadcast(EVENT, json!({}), "org-1", None)
            .unwrap()
            .wait()
            .await;

        assert!(reports[0].delivered);
        assert_eq!(reports[0].attempt_count(), 3);
        // 1s then 2s between attempts
        assert_eq!(started.elapsed(), Duration::from_secs(3));

        let requests = h.transport.requests.lock().unwrap().clone();
        assert!(requests.windows(2).all(|w| w[0].body == w[1].body
            && w[0].header(HEADER_SIGNATURE) == w[1].header(HEADER_SIGNATURE)));

        let sub = h.dispatcher.registry().get("flaky").unwrap();
        assert!(sub.last_success_at.is_some());
        assert_eq!(sub.failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_retry_budget() {
        let refused = "https://down.example/hook";
        let rejected = "https://teapot.example/hook";
        let h = harness(&[(refused, Endpoint::Refuse), (rejected, Endpoint::Status(418))]);
        subscribe(&h, "down", refused);
        h.dispatcher
            .registry()
            .register_webhook(
                "teapot",
                SubscriptionConfig::new("org-1", rejected, "k", &[EVENT]).max_retries(1),
            )
            .unwrap();

        let reports = h
            .dispatcher
            .broadcast(EVENT, json!({}), "org-1", None)
            .unwrap()
            .wait()
            .await;

        let down = reports.iter().find(|r| r.subscription_id == "down").unwrap();
        assert!(!down.delivered);
        assert_eq!(down.attempt_count(), 4);
        assert_eq!(down.last_error().as_deref(), Some("connection refused"));

        let teapot = reports.iter().find(|r| r.subscription_id == "teapot").unwrap();
        assert_eq!(teapot.attempt_count(), 2);
        assert_eq!(
            teapot.attempts[1].outcome,
            AttemptOutcome::Rejected { status: 418 }
        );

        let sub = h.dispatcher.registry().get("down").unwrap();
        assert_eq!(sub.failure_count, 1);
        assert!(sub.last_failure_at.is_some());
        assert_eq!(h.dispatcher.stats().exhausted, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_endpoint_times_out() {
        let url = "https://slow.example/hook";
        let h = harness(&[(url, Endpoint::Hang)]);
        h.dispatcher
            .registry()
            .register_webhook("slow", SubscriptionConfig::new("org-1", url, "k", &[EVENT]).max_retries(0))
            .unwrap();

        let reports = h
            .dispatcher
            .broadcast(EVENT, json!({}), "org-1", None)
            .unwrap()
            .wait()
            .await;
        assert_eq!(reports[0].attempts[0].outcome, AttemptOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_slow_target_does_not_delay_others() {
        let slow = "https://slow.example/hook";
        let fast = "https://fast.example/hook";
        let mut h = harness(&[(slow, Endpoint::Hang), (fast, Endpoint::Ok)]);
        // Registered first so it would be served first if deliveries were sequential
        subscribe(&h, "a-slow", slow);
        subscribe(&h, "b-fast", fast);

        let _handle = h
            .dispatcher
            .broadcast(EVENT, json!({}), "org-1", None)
            .unwrap();

        let delivered = tokio::time::timeout(Duration::from_secs(1), h.delivered.recv())
            .await
            .expect("fast endpoint should not wait for the slow one")
            .unwrap();
        assert_eq!(delivered, fast);
    }

    #[test]
    fn test_validate_signature_and_replay() {
        let h = harness(&[]);
        let body = br#"{"event":"visit.checked_in","nonce":"n-1"}"#;
        let signature = signing::sign(body, "secret");

        assert!(h.dispatcher.validate_signature(body, &signature, "secret", Some("n-1")));
        assert!(!h.dispatcher.validate_signature(body, &signature, "secret", Some("n-1")));
        assert_eq!(
            h.dispatcher.verify_delivery(body, &signature, "secret", Some("n-1")),
            Err(SignatureError::Replayed)
        );

        // Without a nonce the same pair keeps validating
        assert!(h.dispatcher.validate_signature(body, &signature, "secret", None));
        assert!(h.dispatcher.validate_signature(body, &signature, "secret", None));

        let stats = h.dispatcher.stats();
        assert_eq!(stats.replays_rejected, 2);
    }

    #[test]
    fn test_bad_signature_does_not_burn_nonce() {
        let h = harness(&[]);
        let body = b"payload";
        let good = signing::sign(body, "secret");
        let bad = signing::sign(body, "other");

        assert!(!h.dispatcher.validate_signature(body, &bad, "secret", Some("n-2")));
        assert!(!h.dispatcher.nonces().contains("n-2"));
        assert!(h.dispatcher.validate_signature(body, &good, "secret", Some("n-2")));
        assert!(!h.dispatcher.validate_signature(b"payloaD", &good, "secret", None));
        assert_eq!(h.dispatcher.stats().signatures_rejected, 2);
    }
}
