//! Graceful shutdown of background tasks.
//!
//! 1. Broadcast the shutdown signal so workers stop claiming jobs
//! 2. Wait for running tasks to finish their current batch
//! 3. Abort tasks that outlive the drain timeout
//!
//! Jobs claimed but unfinished at abort time stay leased; the Redis queue
//! hands them out again after the visibility timeout. The memory queue loses
//! them.

use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time allowed for tasks to stop after the signal (default: 15 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(15),
        }
    }
}

pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::with_config(shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(shutdown_tx: broadcast::Sender<()>, config: ShutdownConfig) -> Self {
        Self {
            shutdown_tx,
            tasks: Vec::new(),
            config,
        }
    }

    /// Track a background task to wait for
    pub fn track(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks.push((name, handle));
    }

    #[tracing::instrument(name = "graceful_shutdown", skip(self), fields(tasks = self.tasks.len()))]
    pub async fn execute(self, reason: &str) -> ShutdownResult {
        let start = Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Signaling background tasks to stop");
        let _ = self.shutdown_tx.send(());

        let deadline = start + self.config.drain_timeout;
        for (name, mut handle) in self.tasks {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, &mut handle).await {
                Ok(Ok(())) => result.tasks_stopped += 1,
                Ok(Err(e)) => {
                    tracing::error!(task = name, error = %e, "Background task ended abnormally");
                    result.tasks_failed += 1;
                }
                Err(_) => {
                    tracing::warn!(task = name, "Background task did not stop in time, aborting");
                    handle.abort();
                    result.tasks_aborted += 1;
                }
            }
        }

        result.duration = start.elapsed();
        result.success = result.tasks_aborted == 0 && result.tasks_failed == 0;

        tracing::info!(
            tasks_stopped = result.tasks_stopped,
            tasks_aborted = result.tasks_aborted,
            tasks_failed = result.tasks_failed,
            duration_ms = result.duration.as_millis(),
            "Graceful shutdown completed"
        );

        result
    }
}

#[derive(Debug, Default)]
pub struct ShutdownResult {
    pub success: bool,
    pub tasks_stopped: usize,
    pub tasks_aborted: usize,
    pub tasks_failed: usize,
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cooperative_tasks_stop() {
        let (tx, _) = broadcast::channel(1);
        let mut shutdown = GracefulShutdown::new(tx.clone());

        for name in ["worker", "maintenance"] {
            let mut rx = tx.subscribe();
            shutdown.track(name, tokio::spawn(async move {
                let _ = rx.recv().await;
            }));
        }

        let result = shutdown.execute("test").await;
        assert!(result.success);
        assert_eq!(result.tasks_stopped, 2);
    }

    #[tokio::test]
    async fn test_stuck_task_is_aborted() {
        let (tx, _) = broadcast::channel(1);
        let mut shutdown = GracefulShutdown::with_config(
            tx,
            ShutdownConfig {
                drain_timeout: Duration::from_millis(50),
            },
        );
        shutdown.track("stuck", tokio::spawn(std::future::pending::<()>()));

        let result = shutdown.execute("test").await;
        assert!(!result.success);
        assert_eq!(result.tasks_aborted, 1);
    }

    #[test]
    fn test_shutdown_config_defaults() {
        assert_eq!(ShutdownConfig::default().drain_timeout, Duration::from_secs(15));
    }
}
