use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::channel::{build_providers, ChannelProvider, ProviderRegistry};
use crate::clock::{system_clock, Clock};
use crate::config::Settings;
use crate::error::AppError;
use crate::notification::NotificationService;
use crate::queue::{create_queue_backend, JobQueueBackend};
use crate::ratelimit::SendRateLimiter;
use crate::redis::RedisPool;
use crate::template::TemplateRegistry;
use crate::webhook::{ReqwestTransport, WebhookDispatcher, WebhookRegistry, WebhookTransport};
use crate::worker::WorkerPool;

/// Everything the service needs, constructed once at startup and shared by
/// the workers and the ops endpoints.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub clock: Arc<dyn Clock>,
    pub providers: Arc<ProviderRegistry>,
    pub templates: Arc<TemplateRegistry>,
    pub rate_limiter: Arc<SendRateLimiter>,
    pub queue: Arc<dyn JobQueueBackend>,
    pub redis_pool: Option<Arc<RedisPool>>,
    pub notifications: Arc<NotificationService>,
    pub workers: Arc<WorkerPool>,
    pub webhooks: Arc<WebhookDispatcher>,
    pub start_time: Instant,
}

impl AppState {
    /// Build state from settings with HTTP providers and transport
    pub fn from_settings(settings: Settings) -> Result<Self, AppError> {
        let provider_timeout = Duration::from_millis(settings.notification.provider_timeout_ms);
        let providers = build_providers(&settings.providers, provider_timeout)?;
        let transport = Arc::new(ReqwestTransport::new(
            Duration::from_millis(settings.webhook.request_timeout_ms),
            &settings.webhook.user_agent,
        )?);

        Self::with_components(settings, providers, transport, system_clock())
    }

    /// Build state around explicit providers, transport and clock
    pub fn with_components(
        settings: Settings,
        providers: Vec<Arc<dyn ChannelProvider>>,
        transport: Arc<dyn WebhookTransport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        settings.validate()?;

        let provider_registry = Arc::new(ProviderRegistry::new());
        for provider in providers {
            // Rejected providers are logged by the registry and never selected
            let _ = provider_registry.register(provider);
        }
        if provider_registry.is_empty() {
            tracing::warn!("No channel providers registered; every notification will exhaust its chain");
        }

        // Configured templates first so they take precedence over built-ins
        let templates = Arc::new(TemplateRegistry::new());
        for template in settings.templates.iter().cloned() {
            templates.register(template)?;
        }
        let builtin = templates.register_builtin()?;
        tracing::info!(
            configured = settings.templates.len(),
            builtin = builtin,
            "Templates registered"
        );

        let rate_limiter = Arc::new(SendRateLimiter::with_clock(
            settings.ratelimit.clone(),
            clock.clone(),
        ));

        let redis_pool = if settings.queue.backend == "redis" {
            Some(Arc::new(RedisPool::new(&settings.queue.redis_url)?))
        } else {
            None
        };
        let queue = create_queue_backend(&settings.queue, redis_pool.clone(), clock.clone());

        let notifications = Arc::new(NotificationService::new(
            settings.notification.clone(),
            provider_registry.clone(),
            templates.clone(),
            rate_limiter.clone(),
            queue.clone(),
            clock.clone(),
        ));
        let workers = Arc::new(WorkerPool::new(settings.worker.clone(), notifications.clone()));

        let webhook_registry = Arc::new(WebhookRegistry::new(settings.webhook.retry.max_retries));
        let webhooks = Arc::new(WebhookDispatcher::new(
            settings.webhook.clone(),
            webhook_registry,
            transport,
            clock.clone(),
        ));

        Ok(Self {
            settings: Arc::new(settings),
            clock,
            providers: provider_registry,
            templates,
            rate_limiter,
            queue,
            redis_pool,
            notifications,
            workers,
            webhooks,
            start_time: Instant::now(),
        })
    }
}
