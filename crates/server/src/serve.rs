//! `serve`: intake router, dispatch workers and the export cron in one process.

use adu_dispatch::WorkerPool;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::export_scheduler::{parse_cron, run_export_loop};
use crate::router::build_router;
use crate::startup::Components;

pub async fn serve(components: Components) -> anyhow::Result<()> {
    let Components {
        state,
        queue,
        dispatcher,
        exporter,
    } = components;
    let config = &state.config;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pool = WorkerPool::new(dispatcher, queue, config.dispatch.workers);
    let workers = tokio::spawn({
        let rx = shutdown_rx.clone();
        async move { pool.run(rx).await }
    });

    let exporter_task = match parse_cron(&config.export.cron) {
        Ok(schedule) => {
            info!(cron = %config.export.cron, "batch export scheduled");
            Some(tokio::spawn(run_export_loop(
                exporter,
                schedule,
                shutdown_rx.clone(),
            )))
        }
        Err(e) => {
            warn!(cron = %config.export.cron, error = %e, "invalid CSV_EXPORT_CRON, batch export disabled");
            None
        }
    };

    let app = build_router(state.clone());
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down dispatch workers");
    let _ = shutdown_tx.send(true);
    match workers.await {
        Ok(stats) => info!(handled = stats.total(), "dispatch workers finished"),
        Err(e) => error!(error = %e, "dispatch worker task failed"),
    }
    if let Some(task) = exporter_task {
        if let Err(e) = task.await {
            error!(error = %e, "export scheduler task failed");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
