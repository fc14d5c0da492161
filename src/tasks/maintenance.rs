use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::metrics::QueueMetrics;
use crate::queue::JobQueueBackend;
use crate::ratelimit::SendRateLimiter;

/// Result of one maintenance pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct MaintenanceReport {
    pub evicted_subjects: usize,
    pub recovered_jobs: usize,
    pub scheduled: usize,
    pub in_flight: usize,
}

/// Periodic housekeeping: evicts idle rate windows, re-queues jobs whose
/// lease expired (crashed workers) and refreshes queue depth gauges.
pub struct MaintenanceTask {
    interval: Duration,
    rate_limiter: Arc<SendRateLimiter>,
    queue: Arc<dyn JobQueueBackend>,
    shutdown: broadcast::Receiver<()>,
}

impl MaintenanceTask {
    pub fn new(
        interval: Duration,
        rate_limiter: Arc<SendRateLimiter>,
        queue: Arc<dyn JobQueueBackend>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            interval,
            rate_limiter,
            queue,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(self.interval);
        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            queue_backend = self.queue.backend_type(),
            "Maintenance task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Maintenance task received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    self.run_once().await;
                }
            }
        }

        tracing::info!("Maintenance task stopped");
    }

    /// One maintenance pass. Queue errors are logged and the pass continues.
    pub async fn run_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport {
            evicted_subjects: self.rate_limiter.sweep(),
            ..MaintenanceReport::default()
        };

        match self.queue.recover_stale().await {
            Ok(recovered) => {
                report.recovered_jobs = recovered;
                if recovered > 0 {
                    QueueMetrics::record_recovered(recovered);
                    tracing::warn!(recovered = recovered, "Re-queued jobs with expired leases");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to recover stale jobs"),
        }

        match self.queue.stats().await {
            Ok(stats) => {
                QueueMetrics::set_depth(stats.scheduled, stats.in_flight);
                report.scheduled = stats.scheduled;
                report.in_flight = stats.in_flight;
            }
            Err(e) => tracing::warn!(error = %e, "Failed to read queue stats"),
        }

        tracing::debug!(
            evicted_subjects = report.evicted_subjects,
            recovered_jobs = report.recovered_jobs,
            scheduled = report.scheduled,
            in_flight = report.in_flight,
            "Maintenance pass completed"
        );
        report
    }
}
