//! In-memory job queue backend.
//!
//! Jobs are lost on restart. Suitable for single-process deployments and
//! tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::notification::NotificationJob;

use super::backend::{JobQueueBackend, QueueBackendError, QueueBackendStats};

/// Ordering key: due time, then insertion sequence
type ScheduleKey = (i64, u64);

#[derive(Default)]
struct QueueState {
    schedule: BTreeMap<ScheduleKey, String>,
    scheduled: HashMap<String, (ScheduleKey, NotificationJob)>,
    /// job id -> (lease deadline ms, job)
    in_flight: HashMap<String, (i64, NotificationJob)>,
    sequence: u64,
}

impl QueueState {
    fn insert_scheduled(&mut self, job: NotificationJob, due_ms: i64) {
        if let Some((old_key, _)) = self.scheduled.remove(&job.id) {
            self.schedule.remove(&old_key);
        }

        let key = (due_ms, self.sequence);
        self.sequence += 1;
        self.schedule.insert(key, job.id.clone());
        self.scheduled.insert(job.id.clone(), (key, job));
    }
}

/// Process-local job queue.
pub struct MemoryJobQueue {
    state: Mutex<QueueState>,
    visibility_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryJobQueue {
    pub fn new(visibility_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            visibility_timeout,
            clock,
        }
    }

    fn due_ms(&self, delay: Duration) -> i64 {
        self.clock.now_millis() + delay.as_millis() as i64
    }
}

#[async_trait]
impl JobQueueBackend for MemoryJobQueue {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn enqueue(&self, job: NotificationJob, delay: Duration) -> Result<(), QueueBackendError> {
        let due_ms = self.due_ms(delay);
        let mut state = self.state.lock().await;

        tracing::debug!(job_id = %job.id, due_ms = due_ms, "Job enqueued");
        state.insert_scheduled(job, due_ms);
        Ok(())
    }

    async fn dequeue_due(&self, limit: usize) -> Result<Vec<NotificationJob>, QueueBackendError> {
        let now = self.clock.now_millis();
        let lease_deadline = now + self.visibility_timeout.as_millis() as i64;
        let mut state = self.state.lock().await;

        let due_keys: Vec<ScheduleKey> = state
            .schedule
            .range(..=(now, u64::MAX))
            .take(limit)
            .map(|(key, _)| *key)
            .collect();

        let mut claimed = Vec::with_capacity(due_keys.len());
        for key in due_keys {
            let Some(id) = state.schedule.remove(&key) else {
                continue;
            };
            if let Some((_, job)) = state.scheduled.remove(&id) {
                state.in_flight.insert(id, (lease_deadline, job.clone()));
                claimed.push(job);
            }
        }

        Ok(claimed)
    }

    async fn complete(&self, job_id: &str) -> Result<(), QueueBackendError> {
        self.state.lock().await.in_flight.remove(job_id);
        Ok(())
    }

    async fn reschedule(&self, job: NotificationJob, delay: Duration) -> Result<(), QueueBackendError> {
        let due_ms = self.due_ms(delay);
        let mut state = self.state.lock().await;

        state.in_flight.remove(&job.id);
        state.insert_scheduled(job, due_ms);
        Ok(())
    }

    async fn remove(&self, job_id: &str) -> Result<bool, QueueBackendError> {
        let mut state = self.state.lock().await;

        match state.scheduled.remove(job_id) {
            Some((key, _)) => {
                state.schedule.remove(&key);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn recover_stale(&self) -> Result<usize, QueueBackendError> {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().await;

        let stale: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, (deadline, _))| *deadline < now)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            if let Some((_, job)) = state.in_flight.remove(id) {
                tracing::warn!(job_id = %id, "Job lease expired, making it due again");
                state.insert_scheduled(job, now);
            }
        }

        Ok(stale.len())
    }

    async fn stats(&self) -> Result<QueueBackendStats, QueueBackendError> {
        let now = self.clock.now_millis();
        let state = self.state.lock().await;

        Ok(QueueBackendStats {
            backend_type: self.backend_type().to_string(),
            scheduled: state.scheduled.len(),
            due: state.schedule.range(..=(now, u64::MAX)).count(),
            in_flight: state.in_flight.len(),
        })
    }
}
