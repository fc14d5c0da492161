//! Health check and statistics endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::error::AppError;
use crate::notification::DispatchStatsSnapshot;
use crate::queue::QueueBackendStats;
use crate::ratelimit::RateLimiterStats;
use crate::server::AppState;
use crate::webhook::WebhookStatsSnapshot;
use crate::worker::WorkerStats;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub queue: QueueHealthResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisHealthResponse>,
}

#[derive(Debug, Serialize)]
pub struct QueueHealthResponse {
    pub backend: String,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct RedisHealthResponse {
    pub connected: bool,
}

#[derive(Debug, Serialize)]
pub struct ProviderEntry {
    pub channel: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub notifications: DispatchStatsSnapshot,
    pub workers: WorkerStats,
    pub queue: QueueBackendStats,
    pub rate_limiter: RateLimiterStats,
    pub webhooks: WebhookStatsSnapshot,
    pub webhook_subscriptions: usize,
    pub providers: Vec<ProviderEntry>,
    pub templates: usize,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let queue_available = state.queue.stats().await.is_ok();

    let redis = match &state.redis_pool {
        Some(pool) => {
            let connected = match pool.ping().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "Redis health check failed");
                    false
                }
            };
            Some(RedisHealthResponse { connected })
        }
        None => None,
    };

    let healthy = queue_available && redis.as_ref().map_or(true, |r| r.connected);
    let (status, label) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
            queue: QueueHealthResponse {
                backend: state.queue.backend_type().to_string(),
                available: queue_available,
            },
            redis,
        }),
    )
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let queue = state.queue.stats().await?;

    Ok(Json(StatsResponse {
        notifications: state.notifications.stats(),
        workers: state.workers.stats(),
        queue,
        rate_limiter: state.rate_limiter.stats(),
        webhooks: state.webhooks.stats(),
        webhook_subscriptions: state.webhooks.registry().len(),
        providers: state
            .providers
            .list()
            .into_iter()
            .map(|(channel, name)| ProviderEntry {
                channel: channel.to_string(),
                name,
            })
            .collect(),
        templates: state.templates.count(),
    }))
}
