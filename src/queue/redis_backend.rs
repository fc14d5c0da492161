//! Redis-based job queue backend.
//!
//! Layout under `{prefix}`:
//! - `{prefix}:scheduled` sorted set, job id scored by due time (ms)
//! - `{prefix}:inflight` sorted set, job id scored by lease deadline (ms)
//! - `{prefix}:jobs` hash, job id to serialized job
//! - `{prefix}:dead` hash, job id to payloads that could not be decoded
//!
//! Claiming and lease recovery run as Lua scripts so a job moves between the
//! two sets atomically. Jobs survive restarts; a worker that dies mid-job
//! leaves a lease that expires and is recovered.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::Script;

use crate::clock::Clock;
use crate::notification::NotificationJob;
use crate::redis::{PoolError, RedisPool};

use super::backend::{JobQueueBackend, QueueBackendError, QueueBackendStats};

const CLAIM_SCRIPT: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
local jobs = {}
for _, id in ipairs(ids) do
    redis.call('ZREM', KEYS[1], id)
    local job = redis.call('HGET', KEYS[3], id)
    if job then
        redis.call('ZADD', KEYS[2], ARGV[3], id)
        table.insert(jobs, id)
        table.insert(jobs, job)
    end
end
return jobs
"#;

const RECOVER_SCRIPT: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', '(' .. ARGV[1])
for _, id in ipairs(ids) do
    redis.call('ZREM', KEYS[1], id)
    redis.call('ZADD', KEYS[2], ARGV[1], id)
end
return #ids
"#;

const REMOVE_SCRIPT: &str = r#"
if redis.call('ZREM', KEYS[1], ARGV[1]) == 1 then
    redis.call('HDEL', KEYS[2], ARGV[1])
    return 1
end
return 0
"#;

/// Durable job queue on Redis sorted sets.
pub struct RedisJobQueue {
    pool: Arc<RedisPool>,
    prefix: String,
    visibility_timeout: Duration,
    clock: Arc<dyn Clock>,
    claim_script: Script,
    recover_script: Script,
    remove_script: Script,
}

impl RedisJobQueue {
    pub fn new(
        pool: Arc<RedisPool>,
        prefix: String,
        visibility_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            prefix,
            visibility_timeout,
            clock,
            claim_script: Script::new(CLAIM_SCRIPT),
            recover_script: Script::new(RECOVER_SCRIPT),
            remove_script: Script::new(REMOVE_SCRIPT),
        }
    }

    fn scheduled_key(&self) -> String {
        format!("{}:scheduled", self.prefix)
    }

    fn inflight_key(&self) -> String {
        format!("{}:inflight", self.prefix)
    }

    fn jobs_key(&self) -> String {
        format!("{}:jobs", self.prefix)
    }

    fn dead_key(&self) -> String {
        format!("{}:dead", self.prefix)
    }

    /// Park an undecodable payload under the dead-letter key so it is never
    /// claimed or recovered again
    async fn dead_letter(&self, job_id: &str, payload: &str) -> Result<(), QueueBackendError> {
        let (inflight, jobs, dead) = (self.inflight_key(), self.jobs_key(), self.dead_key());

        self.pool
            .execute(|mut conn| async move {
                let _: () = redis::pipe()
                    .atomic()
                    .cmd("HSET")
                    .arg(&dead)
                    .arg(job_id)
                    .arg(payload)
                    .ignore()
                    .cmd("ZREM")
                    .arg(&inflight)
                    .arg(job_id)
                    .ignore()
                    .cmd("HDEL")
                    .arg(&jobs)
                    .arg(job_id)
                    .ignore()
                    .query_async(&mut conn)
                    .await?;
                Ok(())
            })
            .await
            .map_err(Self::map_error)
    }

    /// Convert pool error to queue backend error.
    fn map_error(err: PoolError) -> QueueBackendError {
        match err {
            PoolError::Redis(e) => QueueBackendError::Redis(e),
            PoolError::ConnectionUnavailable(msg) => QueueBackendError::Unavailable(msg),
        }
    }

    /// Store the job and make it due at `due_ms`, releasing any lease
    async fn schedule(&self, job: &NotificationJob, due_ms: i64) -> Result<(), QueueBackendError> {
        let payload = serde_json::to_string(job)?;
        let (jobs, scheduled, inflight) = (self.jobs_key(), self.scheduled_key(), self.inflight_key());
        let id = job.id.as_str();

        self.pool
            .execute(|mut conn| async move {
                let _: () = redis::pipe()
                    .atomic()
                    .cmd("HSET")
                    .arg(&jobs)
                    .arg(id)
                    .arg(&payload)
                    .ignore()
                    .cmd("ZADD")
                    .arg(&scheduled)
                    .arg(due_ms)
                    .arg(id)
                    .ignore()
                    .cmd("ZREM")
                    .arg(&inflight)
                    .arg(id)
                    .ignore()
                    .query_async(&mut conn)
                    .await?;
                Ok(())
            })
            .await
            .map_err(Self::map_error)
    }
}

#[async_trait]
impl JobQueueBackend for RedisJobQueue {
    fn backend_type(&self) -> &'static str {
        "redis"
    }

    async fn enqueue(&self, job: NotificationJob, delay: Duration) -> Result<(), QueueBackendError> {
        let due_ms = self.clock.now_millis() + delay.as_millis() as i64;
        self.schedule(&job, due_ms).await?;

        tracing::debug!(job_id = %job.id, due_ms = due_ms, "Job enqueued to Redis");
        Ok(())
    }

    async fn dequeue_due(&self, limit: usize) -> Result<Vec<NotificationJob>, QueueBackendError> {
        let now = self.clock.now_millis();
        let lease_deadline = now + self.visibility_timeout.as_millis() as i64;
        let keys = [self.scheduled_key(), self.inflight_key(), self.jobs_key()];
        let script = &self.claim_script;

        let raw: Vec<String> = self
            .pool
            .execute(|mut conn| async move {
                script
                    .key(&keys[0])
                    .key(&keys[1])
                    .key(&keys[2])
                    .arg(now)
                    .arg(limit)
                    .arg(lease_deadline)
                    .invoke_async(&mut conn)
                    .await
            })
            .await
            .map_err(Self::map_error)?;

        let (jobs, undecodable) = decode_claimed(raw);
        for (job_id, payload, error) in undecodable {
            tracing::error!(
                job_id = %job_id,
                error = %error,
                prefix = %self.prefix,
                "Queued job payload is not decodable, moving it to the dead-letter key"
            );
            self.dead_letter(&job_id, &payload).await?;
        }

        Ok(jobs)
    }

    async fn complete(&self, job_id: &str) -> Result<(), QueueBackendError> {
        let (inflight, jobs) = (self.inflight_key(), self.jobs_key());

        self.pool
            .execute(|mut conn| async move {
                let _: () = redis::pipe()
                    .atomic()
                    .cmd("ZREM")
                    .arg(&inflight)
                    .arg(job_id)
                    .ignore()
                    .cmd("HDEL")
                    .arg(&jobs)
                    .arg(job_id)
                    .ignore()
                    .query_async(&mut conn)
                    .await?;
                Ok(())
            })
            .await
            .map_err(Self::map_error)
    }

    async fn reschedule(&self, job: NotificationJob, delay: Duration) -> Result<(), QueueBackendError> {
        let due_ms = self.clock.now_millis() + delay.as_millis() as i64;
        self.schedule(&job, due_ms).await
    }

    async fn remove(&self, job_id: &str) -> Result<bool, QueueBackendError> {
        let keys = [self.scheduled_key(), self.jobs_key()];
        let script = &self.remove_script;

        let removed: i64 = self
            .pool
            .execute(|mut conn| async move {
                script
                    .key(&keys[0])
                    .key(&keys[1])
                    .arg(job_id)
                    .invoke_async(&mut conn)
                    .await
            })
            .await
            .map_err(Self::map_error)?;

        Ok(removed == 1)
    }

    async fn recover_stale(&self) -> Result<usize, QueueBackendError> {
        let now = self.clock.now_millis();
        let keys = [self.inflight_key(), self.scheduled_key()];
        let script = &self.recover_script;

        let recovered: usize = self
            .pool
            .execute(|mut conn| async move {
                script
                    .key(&keys[0])
                    .key(&keys[1])
                    .arg(now)
                    .invoke_async(&mut conn)
                    .await
            })
            .await
            .map_err(Self::map_error)?;

        if recovered > 0 {
            tracing::warn!(recovered = recovered, "Recovered jobs with expired leases");
        }
        Ok(recovered)
    }

    async fn stats(&self) -> Result<QueueBackendStats, QueueBackendError> {
        let now = self.clock.now_millis();
        let (scheduled, inflight) = (self.scheduled_key(), self.inflight_key());

        let (scheduled_count, due_count, in_flight_count): (usize, usize, usize) = self
            .pool
            .execute(|mut conn| async move {
                redis::pipe()
                    .cmd("ZCARD")
                    .arg(&scheduled)
                    .cmd("ZCOUNT")
                    .arg(&scheduled)
                    .arg("-inf")
                    .arg(now)
                    .cmd("ZCARD")
                    .arg(&inflight)
                    .query_async(&mut conn)
                    .await
            })
            .await
            .map_err(Self::map_error)?;

        Ok(QueueBackendStats {
            backend_type: self.backend_type().to_string(),
            scheduled: scheduled_count,
            due: due_count,
            in_flight: in_flight_count,
        })
    }
}

/// Split the claim script's flat `[id, payload, ...]` reply into decoded
/// jobs and `(id, payload, error)` for payloads that do not decode
fn decode_claimed(raw: Vec<String>) -> (Vec<NotificationJob>, Vec<(String, String, String)>) {
    let mut jobs = Vec::with_capacity(raw.len() / 2);
    let mut undecodable = Vec::new();

    let mut entries = raw.into_iter();
    while let (Some(id), Some(payload)) = (entries.next(), entries.next()) {
        match serde_json::from_str::<NotificationJob>(&payload) {
            Ok(job) => jobs.push(job),
            Err(e) => undecodable.push((id, payload, e.to_string())),
        }
    }

    (jobs, undecodable)
}
