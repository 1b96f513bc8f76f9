//! PipelineManager: owns submitted pipelines and drives them through
//! placement and reconciliation.
//!
//! Every pipeline sits behind its own mutex. All mutations of a
//! pipeline's components happen with that mutex held, and readers clone
//! under it, so nobody observes a half-updated pipeline. Node capacity is
//! only touched through `NodeManager::reserve` / `release`; the lock
//! order is always pipeline mutex, then node map.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use pipegrid_cluster::{DataManager, NodeHealth, NodeManager};
use pipegrid_placement::{Decision, DecisionUnit};
use pipegrid_state::*;

use crate::error::{SchedulerError, SchedulerResult};

/// A component newly assigned to a node during a placement pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub pipeline_id: PipelineId,
    pub component: String,
    pub filename: String,
    pub node_id: NodeId,
    pub memory_mb: u64,
    pub co_located: bool,
}

/// Outcome of one `process_pipelines` pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlacementReport {
    /// Pipelines examined (Submitted or Placing).
    pub considered: usize,
    pub assignments: Vec<Assignment>,
    /// Components left unplaced for the next pass.
    pub pending: usize,
    /// Pipelines that hit the retry cap in this pass.
    pub failed: Vec<PipelineId>,
}

/// Outcome of one `update_pipelines` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Pipelines examined (Placed or Degraded).
    pub considered: usize,
    /// Components whose node was lost.
    pub unreachable: usize,
    /// Unreachable components put back in the placement queue.
    pub requeued: usize,
    /// Reservations re-established on nodes that were still alive.
    pub restored: usize,
}

pub struct PipelineManager {
    pipelines: RwLock<BTreeMap<PipelineId, Arc<Mutex<Pipeline>>>>,
    nodes: Arc<NodeManager>,
    data: Arc<DataManager>,
    decisions: DecisionUnit,
    store: StateStore,
    max_attempts: u32,
}

impl PipelineManager {
    pub fn new(
        nodes: Arc<NodeManager>,
        data: Arc<DataManager>,
        store: StateStore,
        max_attempts: u32,
    ) -> Self {
        Self {
            pipelines: RwLock::new(BTreeMap::new()),
            decisions: DecisionUnit::new(Arc::clone(&nodes)),
            nodes,
            data,
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Register a new pipeline in `Submitted` state.
    ///
    /// Components are taken as fresh: any placement fields they carry are
    /// reset. Fails without touching existing state when the ID is taken,
    /// the component list is empty, or two components share a name.
    pub async fn add_pipeline(
        &self,
        id: &str,
        name: &str,
        components: Vec<ComponentSpec>,
    ) -> SchedulerResult<()> {
        if components.is_empty() {
            return Err(SchedulerError::EmptyPipeline(id.to_string()));
        }

        let mut seen = HashSet::new();
        for c in &components {
            if !seen.insert(c.name.as_str()) {
                return Err(SchedulerError::DuplicateComponent {
                    pipeline_id: id.to_string(),
                    name: c.name.clone(),
                });
            }
        }

        let components: Vec<ComponentSpec> = components
            .into_iter()
            .map(|mut c| {
                c.state = PlacementState::Unplaced;
                c.attempts = 0;
                c.placements = 0;
                c
            })
            .collect();
        let count = components.len();
        let pipeline = Pipeline::new(id, name, components);

        let mut pipelines = self.pipelines.write().await;
        if pipelines.contains_key(id) {
            return Err(SchedulerError::DuplicateId(id.to_string()));
        }
        pipelines.insert(id.to_string(), Arc::new(Mutex::new(pipeline)));

        info!(pipeline_id = %id, %name, components = count, "pipeline submitted");
        Ok(())
    }

    /// Consistent copy of a pipeline.
    pub async fn get_pipeline(&self, id: &str) -> Option<Pipeline> {
        let entry = self.entry(id).await?;
        let pipeline = entry.lock().await;
        Some(pipeline.clone())
    }

    /// Copies of every pipeline, ordered by ID.
    pub async fn list_pipelines(&self) -> Vec<Pipeline> {
        let mut out = Vec::new();
        for entry in self.entries().await {
            out.push(entry.lock().await.clone());
        }
        out
    }

    pub async fn len(&self) -> usize {
        self.pipelines.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pipelines.read().await.is_empty()
    }

    /// Placement pass: try to place every unplaced component of every
    /// `Submitted` / `Placing` pipeline.
    ///
    /// `NoEligibleNode` is not an error; it bumps the component's attempt
    /// counter and leaves it for the next pass, until the retry cap fails
    /// the pipeline.
    pub async fn process_pipelines(&self) -> PlacementReport {
        let mut report = PlacementReport::default();

        for entry in self.entries().await {
            let mut pipeline = entry.lock().await;
            if !pipeline.state.needs_placement() {
                continue;
            }
            report.considered += 1;

            if pipeline.state == PipelineState::Submitted {
                debug!(pipeline_id = %pipeline.id, "pipeline entering placement");
            }

            let pipeline_id = pipeline.id.clone();
            let mut made = Vec::new();
            for idx in 0..pipeline.components.len() {
                if !pipeline.components[idx].is_unplaced() {
                    continue;
                }
                let outcome = self.place_component(&pipeline_id, &pipeline.components[idx]).await;

                let component = &mut pipeline.components[idx];
                match outcome {
                    Decision::Assigned { node_id, co_located } => {
                        component.state = PlacementState::Assigned {
                            node_id: node_id.clone(),
                        };
                        component.attempts = 0;
                        component.placements += 1;
                        made.push(Assignment {
                            pipeline_id: pipeline_id.clone(),
                            component: component.name.clone(),
                            filename: component.filename.clone(),
                            node_id,
                            memory_mb: component.requirement.memory_mb,
                            co_located,
                        });
                    }
                    Decision::NoEligibleNode => {
                        component.attempts += 1;
                        if component.attempts >= self.max_attempts {
                            component.state = PlacementState::Failed {
                                reason: format!(
                                    "no eligible node after {} attempts",
                                    component.attempts
                                ),
                            };
                            warn!(
                                %pipeline_id,
                                component = %component.name,
                                attempts = component.attempts,
                                "placement retries exhausted"
                            );
                            break;
                        }
                        debug!(
                            %pipeline_id,
                            component = %component.name,
                            attempts = component.attempts,
                            "no eligible node, will retry"
                        );
                    }
                }
            }

            self.settle(&mut pipeline).await;

            if pipeline.state == PipelineState::Failed {
                report.failed.push(pipeline.id.clone());
                continue;
            }
            for a in &made {
                info!(
                    pipeline_id = %a.pipeline_id,
                    component = %a.component,
                    node = %a.node_id,
                    co_located = a.co_located,
                    "component assigned"
                );
            }
            report.pending += pipeline.components.iter().filter(|c| c.is_unplaced()).count();
            report.assignments.extend(made);
        }

        if report.considered > 0 {
            debug!(
                considered = report.considered,
                assigned = report.assignments.len(),
                pending = report.pending,
                failed = report.failed.len(),
                "placement pass finished"
            );
        }
        report
    }

    async fn place_component(&self, pipeline_id: &str, component: &ComponentSpec) -> Decision {
        let key = component_key(pipeline_id, &component.name);
        let hint = match &component.requirement.dataset {
            Some(dataset) => Some(self.data.locations_for(dataset).await),
            None => None,
        };
        let snapshot = self.nodes.snapshot().await;
        self.decisions
            .decide(&key, &component.requirement, &snapshot, hint.as_ref())
            .await
    }

    /// Reconciliation pass over `Placed` / `Degraded` pipelines.
    ///
    /// Components whose node is gone or `Dead` become `Unreachable`.
    /// Components that were already `Unreachable` when the pass started
    /// are requeued, so a lost node degrades the pipeline on one pass and
    /// sends it back to placement on the next.
    pub async fn update_pipelines(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for entry in self.entries().await {
            let mut pipeline = entry.lock().await;
            if !pipeline.state.needs_reconciliation() {
                continue;
            }
            report.considered += 1;

            let previously_lost: Vec<usize> = pipeline
                .components
                .iter()
                .enumerate()
                .filter(|(_, c)| matches!(c.state, PlacementState::Unreachable { .. }))
                .map(|(i, _)| i)
                .collect();

            let snapshot: BTreeMap<NodeId, _> = self
                .nodes
                .snapshot()
                .await
                .into_iter()
                .map(|n| (n.id.clone(), n))
                .collect();

            let pipeline_id = pipeline.id.clone();
            for component in pipeline.components.iter_mut() {
                let Some(node_id) = component.state.active_node().map(str::to_string) else {
                    continue;
                };
                let key = component_key(&pipeline_id, &component.name);

                let lost = match snapshot.get(&node_id) {
                    None => true,
                    Some(node) if node.health == NodeHealth::Dead => true,
                    Some(node) if node.reservations.contains_key(&key) => false,
                    Some(_) => {
                        match self
                            .nodes
                            .reserve(&node_id, &key, component.requirement.memory_mb)
                            .await
                        {
                            Ok(()) => {
                                report.restored += 1;
                                debug!(
                                    %pipeline_id,
                                    component = %component.name,
                                    node = %node_id,
                                    "reservation restored"
                                );
                                false
                            }
                            Err(e) => {
                                warn!(
                                    %pipeline_id,
                                    component = %component.name,
                                    node = %node_id,
                                    error = %e,
                                    "could not restore reservation"
                                );
                                true
                            }
                        }
                    }
                };

                if lost {
                    self.nodes.release(&node_id, &key).await;
                    warn!(
                        %pipeline_id,
                        component = %component.name,
                        node = %node_id,
                        "component lost its node"
                    );
                    component.state = PlacementState::Unreachable { node_id };
                    report.unreachable += 1;
                }
            }

            for idx in previously_lost {
                let component = &mut pipeline.components[idx];
                component.state = PlacementState::Unplaced;
                component.attempts = 0;
                report.requeued += 1;
                info!(%pipeline_id, component = %component.name, "component requeued for placement");
            }

            self.settle(&mut pipeline).await;
        }

        if report.unreachable + report.requeued + report.restored > 0 {
            debug!(
                considered = report.considered,
                unreachable = report.unreachable,
                requeued = report.requeued,
                restored = report.restored,
                "reconciliation pass finished"
            );
        }
        report
    }

    /// Recompute the pipeline state, log transitions, and release every
    /// reservation of a pipeline that just failed.
    pub(crate) async fn settle(&self, pipeline: &mut Pipeline) {
        let Some(prev) = pipeline.refresh_state() else {
            return;
        };
        info!(
            pipeline_id = %pipeline.id,
            from = %prev,
            to = %pipeline.state,
            "pipeline state changed"
        );
        if pipeline.state == PipelineState::Failed {
            self.release_all(pipeline).await;
        }
    }

    pub(crate) async fn release_all(&self, pipeline: &Pipeline) {
        for component in &pipeline.components {
            if let Some(node_id) = component.state.active_node() {
                let key = component_key(&pipeline.id, &component.name);
                self.nodes.release(node_id, &key).await;
            }
        }
    }

    /// Persist every pipeline, replacing whatever the store held before.
    pub async fn dump_pipelines(&self) -> SchedulerResult<usize> {
        let pipelines = self.list_pipelines().await;
        match self.store.replace_pipelines(&pipelines) {
            Ok(count) => {
                info!(count, "pipelines dumped");
                Ok(count)
            }
            Err(e) => {
                error!(error = %e, "failed to dump pipelines");
                Err(e.into())
            }
        }
    }

    /// Replace the in-memory set with the stored one.
    ///
    /// Reservations of active components are re-established on nodes that
    /// are already registered. Anything that cannot be restored here is
    /// picked up by the next reconciliation pass.
    pub async fn load_pipelines(&self) -> SchedulerResult<usize> {
        let stored = self.store.list_pipelines()?;
        let mut loaded = BTreeMap::new();

        for mut pipeline in stored {
            if !pipeline.state.is_terminal() {
                for component in &pipeline.components {
                    let Some(node_id) = component.state.active_node() else {
                        continue;
                    };
                    if self.nodes.get(node_id).await.is_none() {
                        continue;
                    }
                    let key = component_key(&pipeline.id, &component.name);
                    if let Err(e) = self
                        .nodes
                        .reserve(node_id, &key, component.requirement.memory_mb)
                        .await
                    {
                        warn!(
                            pipeline_id = %pipeline.id,
                            component = %component.name,
                            node = %node_id,
                            error = %e,
                            "reservation not restored on load"
                        );
                    }
                }
            }
            pipeline.refresh_state();
            loaded.insert(pipeline.id.clone(), Arc::new(Mutex::new(pipeline)));
        }

        let count = loaded.len();
        *self.pipelines.write().await = loaded;
        info!(count, "pipelines loaded");
        Ok(count)
    }

    pub(crate) async fn entry(&self, id: &str) -> Option<Arc<Mutex<Pipeline>>> {
        self.pipelines.read().await.get(id).cloned()
    }

    async fn entries(&self) -> Vec<Arc<Mutex<Pipeline>>> {
        self.pipelines.read().await.values().cloned().collect()
    }

    pub(crate) fn nodes(&self) -> &NodeManager {
        &self.nodes
    }

    pub(crate) fn data(&self) -> &DataManager {
        &self.data
    }
}
