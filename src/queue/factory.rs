//! Queue backend factory

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::QueueConfig;
use crate::redis::RedisPool;

use super::backend::JobQueueBackend;
use super::memory_backend::MemoryJobQueue;
use super::redis_backend::RedisJobQueue;

/// Create a queue backend based on configuration.
///
/// Returns the appropriate backend implementation based on the `backend` setting:
/// - `"redis"`: Returns a `RedisJobQueue` if a Redis pool is provided
/// - `"memory"` (default): Returns a `MemoryJobQueue`
///
/// # Example
///
/// ```rust,ignore
/// let queue = create_queue_backend(&settings.queue, Some(redis_pool.clone()), clock.clone());
/// ```
pub fn create_queue_backend(
    settings: &QueueConfig,
    redis_pool: Option<Arc<RedisPool>>,
    clock: Arc<dyn Clock>,
) -> Arc<dyn JobQueueBackend> {
    let visibility_timeout = Duration::from_secs(settings.visibility_timeout_seconds);

    match settings.backend.as_str() {
        "redis" => {
            if let Some(pool) = redis_pool {
                tracing::info!(
                    backend = "redis",
                    prefix = %settings.redis_prefix,
                    "Creating Redis job queue"
                );
                Arc::new(RedisJobQueue::new(
                    pool,
                    settings.redis_prefix.clone(),
                    visibility_timeout,
                    clock,
                ))
            } else {
                tracing::warn!(
                    "Redis backend requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryJobQueue::new(visibility_timeout, clock))
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory job queue");
            Arc::new(MemoryJobQueue::new(visibility_timeout, clock))
        }
    }
}
