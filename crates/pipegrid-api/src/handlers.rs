//! REST API handlers.
//!
//! Each handler calls into the scheduler context and wraps the result in
//! the shared JSON envelope.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use pipegrid_cluster::{ClusterError, DataLocation, NodeHealth, ProbeResult};
use pipegrid_scheduler::{ComponentEvent, SchedulerError};
use pipegrid_state::{ComponentSpec, NodeProfile, ResourceRequirement};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn scheduler_error(e: SchedulerError) -> Response {
    let status = match &e {
        SchedulerError::DuplicateId(_)
        | SchedulerError::InvalidTransition { .. }
        | SchedulerError::PipelineFailed(_) => StatusCode::CONFLICT,
        SchedulerError::DuplicateComponent { .. }
        | SchedulerError::EmptyPipeline(_)
        | SchedulerError::InvalidComponentName(_) => StatusCode::BAD_REQUEST,
        SchedulerError::PipelineNotFound(_) | SchedulerError::ComponentNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        SchedulerError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status)
}

/// GET /
pub async fn banner() -> impl IntoResponse {
    ApiResponse::ok(serde_json::json!({
        "service": "ML pipeline placement system",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Pipelines ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubmitComponent {
    pub filename: String,
    /// Falls back to the configured defaults when absent.
    #[serde(default)]
    pub requirement: Option<ResourceRequirement>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitPipeline {
    pub name: String,
    pub components: Vec<SubmitComponent>,
}

/// POST /api/v1/pipelines
pub async fn submit_pipeline(
    State(state): State<ApiState>,
    Json(req): Json<SubmitPipeline>,
) -> Response {
    let defaults = state.ctx.default_requirement();
    let mut components = Vec::with_capacity(req.components.len());
    for c in req.components {
        let requirement = c.requirement.unwrap_or_else(|| defaults.clone());
        match ComponentSpec::new(c.filename, requirement) {
            Ok(spec) => components.push(spec),
            Err(e) => return scheduler_error(e.into()),
        }
    }

    let id = Uuid::new_v4().to_string();
    match state
        .ctx
        .pipelines
        .add_pipeline(&id, &req.name, components)
        .await
    {
        Ok(()) => (
            StatusCode::CREATED,
            ApiResponse::ok(serde_json::json!({ "pipeline_id": id })),
        )
            .into_response(),
        Err(e) => scheduler_error(e),
    }
}

/// GET /api/v1/pipelines
pub async fn list_pipelines(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.ctx.pipelines.list_pipelines().await).into_response()
}

/// GET /api/v1/pipelines/{id}
pub async fn get_pipeline(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.ctx.pipelines.get_pipeline(&id).await {
        Some(pipeline) => ApiResponse::ok(pipeline).into_response(),
        None => error_response("pipeline not found", StatusCode::NOT_FOUND),
    }
}

/// POST /api/v1/pipelines/{id}/components/{name}/events
pub async fn report_event(
    State(state): State<ApiState>,
    Path((id, name)): Path<(String, String)>,
    Json(event): Json<ComponentEvent>,
) -> Response {
    match state
        .ctx
        .pipelines
        .report_component(&id, &name, event)
        .await
    {
        Ok(pipeline_state) => ApiResponse::ok(serde_json::json!({
            "pipeline_id": id,
            "state": pipeline_state,
        }))
        .into_response(),
        Err(e) => {
            warn!(pipeline_id = %id, component = %name, error = %e, "component event rejected");
            scheduler_error(e)
        }
    }
}

// ── Nodes ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterNode {
    pub id: String,
    #[serde(flatten)]
    pub profile: NodeProfile,
}

#[derive(Debug, Deserialize)]
pub struct HealthUpdate {
    pub health: NodeHealth,
}

#[derive(Debug, Deserialize)]
pub struct ProbeReport {
    pub result: ProbeResult,
}

/// GET /api/v1/nodes
pub async fn list_nodes(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.ctx.nodes.snapshot().await).into_response()
}

/// POST /api/v1/nodes
pub async fn register_node(
    State(state): State<ApiState>,
    Json(req): Json<RegisterNode>,
) -> Response {
    if req.id.trim().is_empty() {
        return error_response("node id must not be empty", StatusCode::BAD_REQUEST);
    }
    let created = match state.ctx.nodes.register(&req.id, req.profile).await {
        Ok(created) => created,
        Err(e) => return error_response(&e.to_string(), StatusCode::CONFLICT),
    };
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, ApiResponse::ok(serde_json::json!({ "node_id": req.id, "created": created })))
        .into_response()
}

/// DELETE /api/v1/nodes/{id}
pub async fn remove_node(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.ctx.nodes.remove(&id).await {
        Some(node) => ApiResponse::ok(node).into_response(),
        None => error_response("node not found", StatusCode::NOT_FOUND),
    }
}

/// POST /api/v1/nodes/{id}/health
pub async fn set_node_health(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<HealthUpdate>,
) -> Response {
    match state.ctx.nodes.set_health(&id, req.health).await {
        Ok(previous) => ApiResponse::ok(serde_json::json!({
            "node_id": id,
            "previous": previous,
            "health": req.health,
        }))
        .into_response(),
        Err(e @ ClusterError::UnknownNode(_)) => {
            error_response(&e.to_string(), StatusCode::NOT_FOUND)
        }
        Err(e) => error_response(&e.to_string(), StatusCode::BAD_REQUEST),
    }
}

/// POST /api/v1/nodes/{id}/probe
///
/// Raw liveness probe result; the node's tracker applies the `[health]`
/// thresholds.
pub async fn record_probe(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<ProbeReport>,
) -> Response {
    match state.ctx.nodes.record_probe(&id, req.result).await {
        Ok(health) => ApiResponse::ok(serde_json::json!({
            "node_id": id,
            "health": health,
        }))
        .into_response(),
        Err(e @ ClusterError::UnknownNode(_)) => {
            error_response(&e.to_string(), StatusCode::NOT_FOUND)
        }
        Err(e) => error_response(&e.to_string(), StatusCode::BAD_REQUEST),
    }
}

// ── Datasets ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct DatasetView {
    id: String,
    #[serde(flatten)]
    location: DataLocation,
}

#[derive(Debug, Deserialize)]
pub struct RecordLocation {
    pub node_id: String,
}

/// GET /api/v1/datasets
pub async fn list_datasets(State(state): State<ApiState>) -> Response {
    let views: Vec<DatasetView> = state
        .ctx
        .data
        .datasets()
        .await
        .into_iter()
        .map(|(id, location)| DatasetView { id, location })
        .collect();
    ApiResponse::ok(views).into_response()
}

/// POST /api/v1/datasets/{id}/locations
pub async fn record_location(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<RecordLocation>,
) -> Response {
    let inserted = state.ctx.data.record_location(&id, &req.node_id).await;
    if inserted {
        info!(dataset = %id, node = %req.node_id, "dataset replica reported");
    }
    ApiResponse::ok(serde_json::json!({
        "dataset_id": id,
        "node_id": req.node_id,
        "inserted": inserted,
    }))
    .into_response()
}

/// POST /api/v1/datasets/{id}/stale
pub async fn mark_stale(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    if state.ctx.data.mark_stale(&id).await {
        ApiResponse::ok(serde_json::json!({ "dataset_id": id, "stale": true })).into_response()
    } else {
        error_response("dataset not found", StatusCode::NOT_FOUND)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use pipegrid_core::{CapacityClass, PipegridConfig};
    use pipegrid_scheduler::SchedulerContext;
    use pipegrid_state::StateStore;

    async fn test_state() -> ApiState {
        let ctx = SchedulerContext::new(
            PipegridConfig::default(),
            StateStore::open_in_memory().unwrap(),
        )
        .await;
        ApiState { ctx: Arc::new(ctx) }
    }

    fn submission(files: &[&str]) -> SubmitPipeline {
        SubmitPipeline {
            name: "demo".to_string(),
            components: files
                .iter()
                .map(|f| SubmitComponent {
                    filename: f.to_string(),
                    requirement: None,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn list_pipelines_empty() {
        let state = test_state().await;
        let resp = list_pipelines(State(state)).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn submit_applies_defaults() {
        let state = test_state().await;
        let resp = submit_pipeline(State(state.clone()), Json(submission(&["a.py"]))).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let pipelines = state.ctx.pipelines.list_pipelines().await;
        assert_eq!(pipelines.len(), 1);
        assert_eq!(pipelines[0].components[0].requirement.memory_mb, 512);
        assert_eq!(pipelines[0].components[0].requirement.class, CapacityClass::Small);
    }

    #[tokio::test]
    async fn submit_rejects_bad_components() {
        let state = test_state().await;

        let resp = submit_pipeline(State(state.clone()), Json(submission(&[".hidden"]))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = submit_pipeline(State(state.clone()), Json(submission(&[]))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp =
            submit_pipeline(State(state.clone()), Json(submission(&["a.py", "A.sh"]))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        assert!(state.ctx.pipelines.is_empty().await);
    }

    #[tokio::test]
    async fn get_nonexistent_pipeline() {
        let state = test_state().await;
        let resp = get_pipeline(State(state), Path("nope".to_string())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn event_on_unplaced_component_conflicts() {
        let state = test_state().await;
        state
            .ctx
            .pipelines
            .add_pipeline(
                "p1",
                "demo",
                vec![ComponentSpec::new("a.py", ResourceRequirement::default()).unwrap()],
            )
            .await
            .unwrap();

        let resp = report_event(
            State(state.clone()),
            Path(("p1".to_string(), "a".to_string())),
            Json(ComponentEvent::Started),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = report_event(
            State(state),
            Path(("p1".to_string(), "missing".to_string())),
            Json(ComponentEvent::Finished),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn register_twice_refreshes() {
        let state = test_state().await;
        let req = || RegisterNode {
            id: "n1".to_string(),
            profile: NodeProfile {
                class: CapacityClass::Medium,
                memory_mb: 2048,
                accelerator: false,
            },
        };

        let resp = register_node(State(state.clone()), Json(req())).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let resp = register_node(State(state.clone()), Json(req())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.ctx.nodes.len().await, 1);
    }

    #[tokio::test]
    async fn register_below_reserved_conflicts() {
        let state = test_state().await;
        let req = |memory_mb| RegisterNode {
            id: "n1".to_string(),
            profile: NodeProfile {
                class: CapacityClass::Medium,
                memory_mb,
                accelerator: false,
            },
        };

        let resp = register_node(State(state.clone()), Json(req(1000))).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        state.ctx.nodes.reserve("n1", "p/a", 800).await.unwrap();

        let resp = register_node(State(state.clone()), Json(req(500))).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let node = state.ctx.nodes.get("n1").await.unwrap();
        assert_eq!(node.profile.memory_mb, 1000);
        assert!(node.reserved_mb() <= node.profile.memory_mb);
    }

    #[tokio::test]
    async fn probes_follow_health_thresholds() {
        let state = test_state().await;
        state
            .ctx
            .nodes
            .register(
                "n1",
                NodeProfile {
                    class: CapacityClass::Small,
                    memory_mb: 1024,
                    accelerator: false,
                },
            )
            .await
            .unwrap();

        let probe = |result| {
            record_probe(
                State(state.clone()),
                Path("n1".to_string()),
                Json(ProbeReport { result }),
            )
        };

        // Defaults: suspect after 1 failure, dead after 3.
        assert_eq!(probe(ProbeResult::Failed).await.status(), StatusCode::OK);
        assert_eq!(
            state.ctx.nodes.get("n1").await.unwrap().health,
            NodeHealth::Suspect
        );
        probe(ProbeResult::Failed).await;
        probe(ProbeResult::Failed).await;
        assert_eq!(
            state.ctx.nodes.get("n1").await.unwrap().health,
            NodeHealth::Dead
        );
        probe(ProbeResult::Healthy).await;
        assert_eq!(
            state.ctx.nodes.get("n1").await.unwrap().health,
            NodeHealth::Alive
        );

        let resp = record_probe(
            State(state),
            Path("ghost".to_string()),
            Json(ProbeReport {
                result: ProbeResult::Healthy,
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_of_unknown_node_is_404() {
        let state = test_state().await;
        let resp = set_node_health(
            State(state),
            Path("ghost".to_string()),
            Json(HealthUpdate {
                health: NodeHealth::Dead,
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stale_unknown_dataset_is_404() {
        let state = test_state().await;
        let resp = mark_stale(State(state), Path("nope".to_string())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
