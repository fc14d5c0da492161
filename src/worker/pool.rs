use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinHandle;

use crate::config::WorkerConfig;
use crate::notification::{JobDisposition, NotificationService};
use crate::queue::QueueBackendError;

/// Polls the queue for due jobs and runs them.
///
/// [`run`](Self::run) is spawned once per configured worker; the pollers
/// share the pool's counters. Each claimed job is handled by exactly one
/// poller until it is completed or rescheduled, and the queue lease
/// guarantees this across processes.
pub struct WorkerPool {
    config: WorkerConfig,
    service: Arc<NotificationService>,
    polls: AtomicU64,
    processed: AtomicU64,
    poll_errors: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub concurrency: usize,
    pub polls: u64,
    pub processed: u64,
    pub poll_errors: u64,
}

impl WorkerPool {
    pub fn new(config: WorkerConfig, service: Arc<NotificationService>) -> Self {
        Self {
            config,
            service,
            polls: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            poll_errors: AtomicU64::new(0),
        }
    }

    /// Claim and run up to `batch_size` due jobs.
    ///
    /// Jobs are claimed one at a time so each lease starts when its job
    /// starts. Returns the number of jobs handled.
    pub async fn run_once(&self) -> Result<usize, QueueBackendError> {
        self.polls.fetch_add(1, Ordering::Relaxed);

        let mut count = 0;
        while count < self.config.batch_size.max(1) {
            let Some(job) = self.service.queue().dequeue_due(1).await?.pop() else {
                break;
            };
            count += 1;

            let job_id = job.id.clone();
            match self.service.handle_job(job).await {
                Ok(JobDisposition::Delivered) => {
                    tracing::debug!(job_id = %job_id, "Job delivered");
                }
                Ok(disposition) => {
                    tracing::debug!(job_id = %job_id, disposition = ?disposition, "Job settled");
                }
                Err(e) => {
                    // The lease expires and the job is recovered later
                    tracing::error!(job_id = %job_id, error = %e, "Failed to settle job with queue");
                }
            }
            self.processed.fetch_add(1, Ordering::Relaxed);
        }

        if count > 0 {
            tracing::debug!(jobs = count, "Handled due notification jobs");
        }
        Ok(count)
    }

    /// Poll until shutdown is signalled.
    ///
    /// A full batch is followed immediately by another poll; otherwise the
    /// worker waits for the poll interval.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms.max(1));

        tracing::info!(
            concurrency = self.config.concurrency,
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval_ms,
            "Notification worker started"
        );

        loop {
            // A claimed batch always runs to completion; shutdown is only
            // observed between polls
            if !matches!(shutdown.try_recv(), Err(TryRecvError::Empty)) {
                tracing::info!("Notification worker received shutdown signal");
                break;
            }

            let handled = self.run_once().await;

            let wait = match handled {
                Ok(n) if n >= self.config.batch_size.max(1) => None,
                Ok(_) => Some(poll_interval),
                Err(e) => {
                    self.poll_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %e, "Failed to poll job queue");
                    Some(poll_interval)
                }
            };

            if let Some(wait) = wait {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::info!("Notification worker received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }

        tracing::info!("Notification worker stopped");
    }

    /// Spawn `concurrency` pollers sharing this pool
    pub fn spawn(self: &Arc<Self>, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        (0..self.config.concurrency.max(1))
            .map(|_| tokio::spawn(Arc::clone(self).run(shutdown.subscribe())))
            .collect()
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            concurrency: self.config.concurrency,
            polls: self.polls.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            poll_errors: self.poll_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::{Behavior, ScriptedProvider};
    use crate::channel::{ChannelType, ProviderRegistry};
    use crate::clock::ManualClock;
    use crate::config::NotificationConfig;
    use crate::notification::EventType;
    use crate::queue::{JobQueueBackend, MemoryJobQueue};
    use crate::ratelimit::{RateLimitConfig, SendRateLimiter};
    use crate::channel::{ChannelMessage, ChannelProvider, SendOutcome};
    use crate::template::create_template_registry;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// SMS provider that takes 40s of queue time per send, then runs the
    /// lease recovery a maintenance pass would run meanwhile.
    struct SlowProvider {
        clock: Arc<ManualClock>,
        queue: Arc<MemoryJobQueue>,
        recovered: Mutex<usize>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ChannelProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow-sms"
        }

        fn channel_type(&self) -> ChannelType {
            ChannelType::Sms
        }

        fn validate_config(&self) -> bool {
            true
        }

        async fn send(&self, _message: &ChannelMessage) -> SendOutcome {
            *self.calls.lock().unwrap() += 1;
            self.clock.advance(chrono::Duration::seconds(40));
            let recovered = self.queue.recover_stale().await.unwrap();
            *self.recovered.lock().unwrap() += recovered;
            SendOutcome::delivered(None)
        }
    }

    fn setup(behavior: Behavior) -> (Arc<WorkerPool>, Arc<MemoryJobQueue>, Arc<ScriptedProvider>) {
        let clock = Arc::new(ManualClock::starting_now());
        let queue = Arc::new(MemoryJobQueue::new(Duration::from_secs(60), clock.clone()));
        let providers = Arc::new(ProviderRegistry::new());
        let sms = Arc::new(ScriptedProvider::new("sms", ChannelType::Sms, behavior));
        providers.register(sms.clone()).unwrap();

        let service = Arc::new(NotificationService::new(
            NotificationConfig::default(),
            providers,
            create_template_registry().unwrap(),
            Arc::new(SendRateLimiter::with_clock(RateLimitConfig::default(), clock.clone())),
            queue.clone(),
            clock,
        ));

        let config = WorkerConfig {
            concurrency: 4,
            poll_interval_ms: 10,
            batch_size: 8,
            ..WorkerConfig::default()
        };
        (Arc::new(WorkerPool::new(config, service)), queue, sms)
    }

    async fn emit(pool: &WorkerPool, n: usize) {
        for i in 0..n {
            pool.service
                .emit(
                    EventType::HostAlert,
                    json!({"visitor": {"name": "Ada"}, "host": {"phone": "+15550001111"}}),
                    &format!("visit-{}", i),
                    None,
                    None,
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_run_once_drains_due_jobs() {
        let (pool, queue, sms) = setup(Behavior::Succeed);
        emit(&pool, 3).await;

        assert_eq!(pool.run_once().await.unwrap(), 3);
        assert_eq!(sms.calls(), 3);
        assert_eq!(pool.run_once().await.unwrap(), 0);

        let stats = queue.stats().await.unwrap();
        assert_eq!((stats.scheduled, stats.in_flight), (0, 0));
        assert_eq!(pool.stats().processed, 3);
    }

    #[tokio::test]
    async fn test_run_once_respects_batch_size() {
        let (pool, _queue, sms) = setup(Behavior::Succeed);
        emit(&pool, 10).await;

        assert_eq!(pool.run_once().await.unwrap(), 8);
        assert_eq!(pool.run_once().await.unwrap(), 2);
        assert_eq!(sms.calls(), 10);
    }

    #[tokio::test]
    async fn test_failed_job_is_rescheduled_not_lost() {
        let (pool, queue, _sms) = setup(Behavior::Fail);
        emit(&pool, 1).await;

        assert_eq!(pool.run_once().await.unwrap(), 1);
        let stats = queue.stats().await.unwrap();
        assert_eq!((stats.scheduled, stats.in_flight), (1, 0));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (pool, _queue, sms) = setup(Behavior::Succeed);
        emit(&pool, 2).await;

        let (tx, _) = broadcast::channel(1);
        let handles = pool.spawn(&tx);
        assert_eq!(handles.len(), 4);

        for _ in 0..100 {
            if sms.calls() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(sms.calls(), 2);

        tx.send(()).unwrap();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .unwrap()
                .unwrap();
        }
        // Each job ran on exactly one poller
        assert_eq!(sms.calls(), 2);
    }

    #[tokio::test]
    async fn test_running_job_is_never_handed_to_another_worker() {
        let clock = Arc::new(ManualClock::starting_now());
        let queue = Arc::new(MemoryJobQueue::new(Duration::from_secs(60), clock.clone()));
        let slow = Arc::new(SlowProvider {
            clock: clock.clone(),
            queue: queue.clone(),
            recovered: Mutex::new(0),
            calls: Mutex::new(0),
        });
        let providers = Arc::new(ProviderRegistry::new());
        providers.register(slow.clone()).unwrap();

        let service = Arc::new(NotificationService::new(
            NotificationConfig::default(),
            providers,
            create_template_registry().unwrap(),
            Arc::new(SendRateLimiter::with_clock(RateLimitConfig::default(), clock.clone())),
            queue.clone(),
            clock.clone(),
        ));
        let pool = WorkerPool::new(WorkerConfig::default(), service);
        emit(&pool, 2).await;

        // Two sends of 40s each outlast a single 60s lease taken up front
        assert_eq!(pool.run_once().await.unwrap(), 2);
        assert_eq!(*slow.calls.lock().unwrap(), 2);
        // Neither running job was returned to the queue
        assert_eq!(*slow.recovered.lock().unwrap(), 0);

        let stats = queue.stats().await.unwrap();
        assert_eq!((stats.scheduled, stats.in_flight), (0, 0));
    }
}
