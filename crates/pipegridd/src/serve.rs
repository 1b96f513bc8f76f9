//! `pipegridd serve`: scheduler loops plus the REST API.
//!
//! Startup:
//! 1. Opens the pipeline store under the data directory
//! 2. Builds the scheduler context and registers the static inventory
//! 3. Reloads pipelines from the last dump
//! 4. Starts the placement and reconciliation loops
//! 5. Serves the API until ctrl-c, then stops the loops and dumps

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use pipegrid_core::PipegridConfig;
use pipegrid_scheduler::{DeploymentAgent, LoggingAgent, Runner, SchedulerContext};
use pipegrid_state::StateStore;

pub async fn run(config: PipegridConfig) -> anyhow::Result<()> {
    info!("pipegrid daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    std::fs::create_dir_all(&config.storage.data_dir)?;
    let db_path = config.pipelines_db_path();
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "pipeline store opened");

    let port = config.api.port;
    let ctx = Arc::new(SchedulerContext::new(config, store).await);

    let restored = ctx.pipelines.load_pipelines().await?;
    info!(restored, "pipelines restored");

    // ── REST API listener ──────────────────────────────────────

    let router = pipegrid_api::build_router(Arc::clone(&ctx));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API listener bound");

    // ── Background loops ───────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let agent: Arc<dyn DeploymentAgent> = Arc::new(LoggingAgent);
    let runner = Runner::spawn(Arc::clone(&ctx), agent, shutdown_rx);
    info!(
        wait_secs = ctx.config.scheduler.wait_interval_secs,
        update_secs = ctx.config.scheduler.update_interval_secs,
        "scheduler loops started"
    );

    // ── Serve until ctrl-c ─────────────────────────────────────

    let server = axum::serve(listener, router).with_graceful_shutdown(async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
    });

    let served = server.await;
    finish(served, shutdown_tx, runner).await
}

/// Stop the loops and run the final dump, whatever way the server ended.
/// A server error is reported only after the pipelines are persisted.
async fn finish(
    served: std::io::Result<()>,
    shutdown_tx: watch::Sender<bool>,
    runner: Runner,
) -> anyhow::Result<()> {
    if let Err(e) = &served {
        error!(error = %e, "API server failed");
    }
    let _ = shutdown_tx.send(true);

    // In-flight passes finish before the final dump.
    let dumped = runner.join().await?;
    info!(dumped, "pipegrid daemon stopped");

    served?;
    Ok(())
}
