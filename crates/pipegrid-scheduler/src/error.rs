//! Scheduler error types.

use thiserror::Error;

use pipegrid_state::InvalidComponentName;

/// Errors surfaced to callers of the pipeline manager.
///
/// Transient placement conditions (no eligible node, lost reservation
/// races, lost nodes) never show up here; they are recorded on the
/// component and retried.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("pipeline already exists: {0}")]
    DuplicateId(String),

    #[error("pipeline {pipeline_id} has more than one component named {name:?}")]
    DuplicateComponent { pipeline_id: String, name: String },

    #[error("pipeline {0} has no components")]
    EmptyPipeline(String),

    #[error(transparent)]
    InvalidComponentName(#[from] InvalidComponentName),

    #[error("pipeline not found: {0}")]
    PipelineNotFound(String),

    #[error("component {name:?} not found in pipeline {pipeline_id}")]
    ComponentNotFound { pipeline_id: String, name: String },

    #[error("component {component:?} of pipeline {pipeline_id} cannot go from {from} on {event}")]
    InvalidTransition {
        pipeline_id: String,
        component: String,
        from: &'static str,
        event: &'static str,
    },

    #[error("pipeline has failed: {0}")]
    PipelineFailed(String),

    #[error("state store error: {0}")]
    State(#[from] pipegrid_state::StateError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
