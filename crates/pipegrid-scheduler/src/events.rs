//! Completion and failure signals from the runtime agent.
//!
//! The agent that actually runs components reports back through
//! `PipelineManager::report_component`, keyed by pipeline ID and
//! component name. How the signal reaches the process (HTTP, queue, poll)
//! is up to the caller.

use serde::{Deserialize, Serialize};
use tracing::info;

use pipegrid_state::{PipelineState, PlacementState, component_key};

use crate::error::{SchedulerError, SchedulerResult};
use crate::manager::PipelineManager;

/// Something that happened to a placed component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ComponentEvent {
    /// The component started on its assigned node.
    Started,
    /// The component ran to completion.
    Finished,
    /// The component failed and will not be retried.
    Failed { reason: String },
}

impl ComponentEvent {
    pub fn label(&self) -> &'static str {
        match self {
            ComponentEvent::Started => "started",
            ComponentEvent::Finished => "finished",
            ComponentEvent::Failed { .. } => "failed",
        }
    }
}

impl PipelineManager {
    /// Apply a runtime signal to one component and return the pipeline's
    /// resulting state.
    ///
    /// `Finished` frees the component's reservation and, when the component
    /// declares an output dataset, records it at the node that produced it.
    /// `Failed` fails the whole pipeline and frees all its reservations.
    pub async fn report_component(
        &self,
        pipeline_id: &str,
        name: &str,
        event: ComponentEvent,
    ) -> SchedulerResult<PipelineState> {
        let entry = self
            .entry(pipeline_id)
            .await
            .ok_or_else(|| SchedulerError::PipelineNotFound(pipeline_id.to_string()))?;
        let mut pipeline = entry.lock().await;

        match pipeline.state {
            PipelineState::Failed => {
                return Err(SchedulerError::PipelineFailed(pipeline_id.to_string()));
            }
            PipelineState::Completed => {
                return Err(SchedulerError::InvalidTransition {
                    pipeline_id: pipeline_id.to_string(),
                    component: name.to_string(),
                    from: PipelineState::Completed.label(),
                    event: event.label(),
                });
            }
            _ => {}
        }

        let component = pipeline
            .component_mut(name)
            .ok_or_else(|| SchedulerError::ComponentNotFound {
                pipeline_id: pipeline_id.to_string(),
                name: name.to_string(),
            })?;
        let key = component_key(pipeline_id, name);

        let (next, release, produced) = match (&event, &component.state) {
            (ComponentEvent::Started, PlacementState::Assigned { node_id }) => (
                PlacementState::Running {
                    node_id: node_id.clone(),
                },
                None,
                None,
            ),
            (
                ComponentEvent::Finished,
                PlacementState::Assigned { node_id } | PlacementState::Running { node_id },
            ) => (
                PlacementState::Completed {
                    node_id: node_id.clone(),
                },
                Some(node_id.clone()),
                component
                    .requirement
                    .produces
                    .clone()
                    .map(|ds| (ds, node_id.clone())),
            ),
            (ComponentEvent::Failed { reason }, state) if !state.is_terminal() => (
                PlacementState::Failed {
                    reason: reason.clone(),
                },
                state.active_node().map(str::to_string),
                None,
            ),
            (event, state) => {
                return Err(SchedulerError::InvalidTransition {
                    pipeline_id: pipeline_id.to_string(),
                    component: name.to_string(),
                    from: state.label(),
                    event: event.label(),
                });
            }
        };

        info!(
            %pipeline_id,
            component = %name,
            from = component.state.label(),
            to = next.label(),
            "component {}",
            event.label()
        );
        component.state = next;

        if let Some(node_id) = release {
            self.nodes().release(&node_id, &key).await;
        }
        if let Some((dataset, node_id)) = produced {
            self.data().record_location(&dataset, &node_id).await;
        }

        self.settle(&mut pipeline).await;
        Ok(pipeline.state)
    }
}
