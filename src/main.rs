use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use visitor_dispatch::config::Settings;
use visitor_dispatch::server::{create_app, AppState};
use visitor_dispatch::shutdown::GracefulShutdown;
use visitor_dispatch::tasks::MaintenanceTask;
use visitor_dispatch::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;

    // Keep the guard alive so spans are flushed on exit
    let _telemetry = init_telemetry(&settings.log, &settings.otel)?;
    tracing::info!(
        queue_backend = %settings.queue.backend,
        workers = settings.worker.concurrency,
        "Configuration loaded"
    );

    let state = AppState::from_settings(settings.clone())?;
    tracing::info!(
        providers = state.providers.len(),
        templates = state.templates.count(),
        "Application state initialized"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut shutdown = GracefulShutdown::new(shutdown_tx.clone());

    for handle in state.workers.spawn(&shutdown_tx) {
        shutdown.track("worker", handle);
    }

    let maintenance = MaintenanceTask::new(
        Duration::from_secs(settings.worker.maintenance_interval_seconds.max(1)),
        state.rate_limiter.clone(),
        state.queue.clone(),
        shutdown_tx.subscribe(),
    );
    shutdown.track("maintenance", tokio::spawn(maintenance.run()));

    let app = create_app(state);
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Ops server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.execute("process signal").await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
