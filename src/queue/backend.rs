//! Backend trait for the delayed job queue.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::notification::NotificationJob;

/// Errors that can occur during queue backend operations.
#[derive(Debug, Error)]
pub enum QueueBackendError {
    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend is temporarily unavailable
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Statistics about the queue backend.
#[derive(Debug, Clone, Serialize)]
pub struct QueueBackendStats {
    /// Backend type identifier
    pub backend_type: String,

    /// Jobs waiting for their due time (or due and unclaimed)
    pub scheduled: usize,

    /// Scheduled jobs whose due time has passed
    pub due: usize,

    /// Jobs claimed by a worker and not yet completed
    pub in_flight: usize,
}

/// Backend trait for delayed job storage.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (`Send + Sync`) as they are shared
/// by every worker task.
#[async_trait]
pub trait JobQueueBackend: Send + Sync {
    /// Backend type identifier
    fn backend_type(&self) -> &'static str;

    /// Schedule a job to become due after `delay`.
    ///
    /// Enqueuing an id that is already scheduled replaces the earlier entry.
    async fn enqueue(&self, job: NotificationJob, delay: Duration) -> Result<(), QueueBackendError>;

    /// Claim up to `limit` due jobs, oldest due time first.
    async fn dequeue_due(&self, limit: usize) -> Result<Vec<NotificationJob>, QueueBackendError>;

    /// Forget a claimed job that reached a terminal state.
    async fn complete(&self, job_id: &str) -> Result<(), QueueBackendError>;

    /// Release a claimed job and schedule it again with its updated state.
    async fn reschedule(&self, job: NotificationJob, delay: Duration) -> Result<(), QueueBackendError>;

    /// Remove a job that is scheduled but not yet claimed.
    ///
    /// Returns `false` if the job is unknown or already running.
    async fn remove(&self, job_id: &str) -> Result<bool, QueueBackendError>;

    /// Make claimed jobs whose lease expired due again.
    ///
    /// # Returns
    ///
    /// The number of jobs recovered.
    async fn recover_stale(&self) -> Result<usize, QueueBackendError>;

    /// Get queue statistics.
    async fn stats(&self) -> Result<QueueBackendStats, QueueBackendError>;
}
