//! Periodic runner: the two background loops.
//!
//! One loop runs `process_pipelines` every wait interval and hands new
//! assignments to the deployment agent. The other runs `update_pipelines`
//! every update interval. They share nothing but the context and may
//! overlap freely. Shutdown is observed between passes only, so a pass
//! that has started always finishes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::agent::{DeployCommand, DeploymentAgent};
use crate::context::SchedulerContext;
use crate::error::SchedulerResult;
use crate::manager::PlacementReport;

pub struct Runner {
    ctx: Arc<SchedulerContext>,
    placement: JoinHandle<()>,
    reconcile: JoinHandle<()>,
}

impl Runner {
    /// Start both loops with the intervals from the context's config.
    pub fn spawn(
        ctx: Arc<SchedulerContext>,
        agent: Arc<dyn DeploymentAgent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let wait = ctx.config.wait_interval();
        let update = ctx.config.update_interval();
        Self::spawn_with_intervals(ctx, agent, shutdown, wait, update)
    }

    pub fn spawn_with_intervals(
        ctx: Arc<SchedulerContext>,
        agent: Arc<dyn DeploymentAgent>,
        shutdown: watch::Receiver<bool>,
        wait: Duration,
        update: Duration,
    ) -> Self {
        let placement = tokio::spawn(placement_loop(
            Arc::clone(&ctx),
            agent,
            wait,
            shutdown.clone(),
        ));
        let reconcile = tokio::spawn(reconcile_loop(Arc::clone(&ctx), update, shutdown));

        Self {
            ctx,
            placement,
            reconcile,
        }
    }

    /// Wait for both loops to stop, then persist every pipeline.
    pub async fn join(self) -> SchedulerResult<usize> {
        if let Err(e) = self.placement.await {
            warn!(error = %e, "placement loop ended abnormally");
        }
        if let Err(e) = self.reconcile.await {
            warn!(error = %e, "reconciliation loop ended abnormally");
        }
        self.ctx.pipelines.dump_pipelines().await
    }
}

async fn placement_loop(
    ctx: Arc<SchedulerContext>,
    agent: Arc<dyn DeploymentAgent>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_ms = interval.as_millis() as u64, "placement loop started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let report = ctx.pipelines.process_pipelines().await;
                dispatch(agent.as_ref(), &report);
            }
            _ = shutdown.changed() => {
                info!("placement loop shutting down");
                break;
            }
        }
    }
}

async fn reconcile_loop(
    ctx: Arc<SchedulerContext>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_ms = interval.as_millis() as u64, "reconciliation loop started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                ctx.pipelines.update_pipelines().await;
            }
            _ = shutdown.changed() => {
                info!("reconciliation loop shutting down");
                break;
            }
        }
    }
}

/// Send one deploy command per new assignment. Returns how many the agent
/// accepted.
pub fn dispatch(agent: &dyn DeploymentAgent, report: &PlacementReport) -> usize {
    let mut delivered = 0;
    for assignment in &report.assignments {
        let cmd = DeployCommand::from(assignment);
        match agent.deploy(&cmd) {
            Ok(()) => delivered += 1,
            Err(e) => warn!(
                node = %cmd.node_id,
                pipeline_id = %cmd.pipeline_id,
                component = %cmd.component,
                error = %e,
                "deploy command not delivered"
            ),
        }
    }
    delivered
}
