//! Notification service: emission and fallback-chain execution

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::channel::{message_metadata, ChannelMessage, ChannelProvider, ChannelType, ProviderRegistry};
use crate::clock::Clock;
use crate::config::NotificationConfig;
use crate::metrics::DispatchMetrics;
use crate::queue::{JobQueueBackend, QueueBackendError};
use crate::ratelimit::{RateLimitResult, SendRateLimiter};
use crate::template::{render_template, TemplateRegistry};

use super::error::DispatchError;
use super::types::{
    EmitOutcome, EmitRequest, EventType, JobDisposition, JobOutcome, NotificationJob, SkipReason,
    StepRecord, StepResult,
};

/// Counters for the notification service
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub emitted: AtomicU64,
    pub skipped_no_chain: AtomicU64,
    pub skipped_rate_limited: AtomicU64,
    pub delivered: AtomicU64,
    pub retries_scheduled: AtomicU64,
    pub exhausted: AtomicU64,
    pub failed: AtomicU64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            emitted: self.emitted.load(Ordering::Relaxed),
            skipped_no_chain: self.skipped_no_chain.load(Ordering::Relaxed),
            skipped_rate_limited: self.skipped_rate_limited.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatch statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatchStatsSnapshot {
    pub emitted: u64,
    pub skipped_no_chain: u64,
    pub skipped_rate_limited: u64,
    pub delivered: u64,
    pub retries_scheduled: u64,
    pub exhausted: u64,
    pub failed: u64,
}

/// Emits notification jobs and executes them against the fallback chain.
///
/// All collaborators are injected; the service itself holds no global state.
pub struct NotificationService {
    config: NotificationConfig,
    providers: Arc<ProviderRegistry>,
    templates: Arc<TemplateRegistry>,
    rate_limiter: Arc<SendRateLimiter>,
    queue: Arc<dyn JobQueueBackend>,
    clock: Arc<dyn Clock>,
    stats: DispatchStats,
}

impl NotificationService {
    pub fn new(
        config: NotificationConfig,
        providers: Arc<ProviderRegistry>,
        templates: Arc<TemplateRegistry>,
        rate_limiter: Arc<SendRateLimiter>,
        queue: Arc<dyn JobQueueBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            providers,
            templates,
            rate_limiter,
            queue,
            clock,
            stats: DispatchStats::default(),
        }
    }

    /// Configured fallback chain for an event type
    pub fn fallback_chain(&self, event_type: EventType) -> Option<&[ChannelType]> {
        self.config
            .fallback_chains
            .get(&event_type)
            .map(Vec::as_slice)
            .filter(|chain| !chain.is_empty())
    }

    pub fn queue(&self) -> &Arc<dyn JobQueueBackend> {
        &self.queue
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }

    /// Emit an event for delivery.
    ///
    /// Returns `Skipped` without enqueuing when the event type has no fallback
    /// chain or the rate limiter denies the subject.
    pub async fn emit(
        &self,
        event_type: EventType,
        context: Value,
        subject_key: &str,
        scope_key: Option<&str>,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<EmitOutcome, DispatchError> {
        let mut request = EmitRequest::new(event_type, context, subject_key);
        request.scope_key = scope_key.map(str::to_string);
        request.scheduled_at = scheduled_at;
        self.emit_request(request).await
    }

    /// Emit with the full set of options
    #[tracing::instrument(
        skip(self, request),
        fields(event_type = %request.event_type, subject_key = %request.subject_key)
    )]
    pub async fn emit_request(&self, request: EmitRequest) -> Result<EmitOutcome, DispatchError> {
        let Some(chain) = self.fallback_chain(request.event_type) else {
            tracing::error!("No fallback chain configured for event type, skipping");
            return Ok(self.skip(SkipReason::NoFallbackConfigured));
        };
        let fallback_chain = chain.to_vec();

        if let RateLimitResult::Denied { cap, limit } = self
            .rate_limiter
            .check(&request.subject_key, request.scope_key.as_deref())
        {
            tracing::info!(cap = %cap, limit = limit, "Notification rate limited, skipping");
            return Ok(self.skip(SkipReason::RateLimited { cap }));
        }

        let now = self.clock.now();
        let scheduled_at = request.scheduled_at.unwrap_or(now).max(now);
        let delay = (scheduled_at - now).to_std().unwrap_or(Duration::ZERO);

        let job = NotificationJob {
            id: request
                .job_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            event_type: request.event_type,
            template_data: request.context,
            fallback_chain,
            current_index: 0,
            retry_count: 0,
            max_retries: request.max_retries.unwrap_or(self.config.retry.max_retries),
            subject_key: request.subject_key,
            scope_key: request.scope_key,
            created_at: now,
            scheduled_at,
        };
        let job_id = job.id.clone();

        self.queue.enqueue(job, delay).await?;

        self.stats.emitted.fetch_add(1, Ordering::Relaxed);
        DispatchMetrics::record_emitted(request.event_type.as_str());
        tracing::info!(job_id = %job_id, delay_ms = delay.as_millis() as u64, "Notification enqueued");

        Ok(EmitOutcome::Enqueued { job_id })
    }

    fn skip(&self, reason: SkipReason) -> EmitOutcome {
        let counter = match reason {
            SkipReason::NoFallbackConfigured => &self.stats.skipped_no_chain,
            SkipReason::RateLimited { .. } => &self.stats.skipped_rate_limited,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        DispatchMetrics::record_skipped(reason.as_str());
        EmitOutcome::Skipped(reason)
    }

    /// Walk the fallback chain from `job.current_index` until a provider
    /// delivers or the chain is exhausted.
    ///
    /// Steps run strictly in order. A channel with no registered provider is
    /// skipped without counting as an attempt; every other failure advances
    /// to the next channel immediately.
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id, event_type = %job.event_type))]
    pub async fn process_job(&self, job: &mut NotificationJob) -> Result<JobOutcome, DispatchError> {
        let mut steps = Vec::new();
        let mut last_error: Option<String> = None;

        while !job.is_exhausted() {
            let index = job.current_index;
            let channel = job.fallback_chain[index];

            let Some(provider) = self.providers.resolve(channel) else {
                tracing::debug!(channel = %channel, "No provider registered for channel, advancing");
                steps.push(StepRecord {
                    index,
                    channel,
                    provider: None,
                    result: StepResult::NoProvider,
                });
                job.current_index += 1;
                continue;
            };

            let template = self
                .templates
                .resolve(job.event_type, channel)
                .ok_or(DispatchError::TemplateMissing {
                    event_type: job.event_type,
                    channel,
                })?;

            let recipient = self.config.recipients.extract(
                channel,
                &job.template_data,
                self.config.chat_default_destination.as_deref(),
            );
            let Some(recipient) = recipient else {
                tracing::warn!(channel = %channel, "No recipient found in context, advancing");
                steps.push(StepRecord {
                    index,
                    channel,
                    provider: Some(provider.name().to_string()),
                    result: StepResult::NoRecipient,
                });
                last_error = Some(StepResult::NoRecipient.describe());
                job.current_index += 1;
                continue;
            };

            let rendered = render_template(&template, &job.template_data)?;
            let message = ChannelMessage {
                recipient,
                subject: rendered.subject,
                text: rendered.text,
                html: rendered.html,
                metadata: message_metadata(job.event_type.as_str(), &job.id, channel),
            };

            let result = self.attempt(provider.as_ref(), &message).await;
            steps.push(StepRecord {
                index,
                channel,
                provider: Some(provider.name().to_string()),
                result: result.clone(),
            });

            if let StepResult::Delivered { message_id } = &result {
                tracing::info!(
                    channel = %channel,
                    provider = %provider.name(),
                    template_id = %template.id,
                    steps = steps.len(),
                    "Notification delivered"
                );
                return Ok(JobOutcome::Delivered {
                    channel,
                    provider: provider.name().to_string(),
                    message_id: message_id.clone(),
                    template_id: template.id,
                    steps,
                });
            }

            tracing::warn!(
                channel = %channel,
                provider = %provider.name(),
                error = %result.describe(),
                "Provider failed, advancing fallback chain"
            );
            last_error = Some(result.describe());
            job.current_index += 1;
        }

        tracing::warn!(
            last_error = ?last_error,
            retry_count = job.retry_count,
            "All providers in fallback chain failed"
        );
        Ok(JobOutcome::AllProvidersFailed { last_error, steps })
    }

    /// One bounded provider call. Panics and timeouts become step failures.
    async fn attempt(&self, provider: &dyn ChannelProvider, message: &ChannelMessage) -> StepResult {
        let timeout = Duration::from_millis(self.config.provider_timeout_ms);
        let started = Instant::now();

        let send = AssertUnwindSafe(provider.send(message)).catch_unwind();
        let result = match tokio::time::timeout(timeout, send).await {
            Err(_) => StepResult::TimedOut,
            Ok(Err(panic)) => StepResult::ProviderThrew {
                message: panic_message(panic.as_ref()),
            },
            Ok(Ok(outcome)) if outcome.success => StepResult::Delivered {
                message_id: outcome.message_id,
            },
            Ok(Ok(outcome)) => StepResult::Failed {
                error: outcome
                    .error
                    .unwrap_or_else(|| "provider reported failure".to_string()),
            },
        };

        DispatchMetrics::record_attempt(
            provider.channel_type().as_str(),
            provider.name(),
            matches!(result, StepResult::Delivered { .. }),
            started.elapsed(),
        );
        result
    }

    /// Run a claimed job and settle it with the queue.
    ///
    /// Exhausted chains are retried from the first channel after a backoff
    /// delay while `retry_count < max_retries`. Configuration errors drop the
    /// job without retry.
    pub async fn handle_job(
        &self,
        mut job: NotificationJob,
    ) -> Result<JobDisposition, QueueBackendError> {
        let job_id = job.id.clone();

        match self.process_job(&mut job).await {
            Ok(JobOutcome::Delivered { .. }) => {
                self.queue.complete(&job_id).await?;
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                DispatchMetrics::record_terminal("delivered");
                Ok(JobDisposition::Delivered)
            }
            Ok(JobOutcome::AllProvidersFailed { last_error, .. }) => {
                if job.retry_count < job.max_retries {
                    let retry_count = job.retry_count + 1;
                    let delay = self.config.retry.delay_for_attempt(retry_count);
                    let next_at = self.clock.now()
                        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                    job.rewind_for_retry(next_at);

                    self.queue.reschedule(job, delay).await?;
                    self.stats.retries_scheduled.fetch_add(1, Ordering::Relaxed);
                    DispatchMetrics::record_retry_scheduled();
                    tracing::info!(
                        job_id = %job_id,
                        retry_count = retry_count,
                        delay_ms = delay.as_millis() as u64,
                        "Fallback chain exhausted, retrying whole chain later"
                    );
                    Ok(JobDisposition::RetryScheduled { retry_count, delay })
                } else {
                    self.queue.complete(&job_id).await?;
                    self.stats.exhausted.fetch_add(1, Ordering::Relaxed);
                    DispatchMetrics::record_terminal("exhausted");
                    tracing::error!(
                        job_id = %job_id,
                        event_type = %job.event_type,
                        subject_key = %job.subject_key,
                        retry_count = job.retry_count,
                        last_error = ?last_error,
                        "Notification failed: all providers in fallback chain failed"
                    );
                    Ok(JobDisposition::Exhausted)
                }
            }
            Err(e) => {
                self.queue.complete(&job_id).await?;
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                DispatchMetrics::record_terminal("failed");
                tracing::error!(
                    job_id = %job_id,
                    event_type = %job.event_type,
                    error = %e,
                    "Notification job failed with a configuration error"
                );
                Ok(JobDisposition::Failed(e.to_string()))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
