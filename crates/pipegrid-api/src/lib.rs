//! pipegrid-api: REST API for pipegrid.
//!
//! Thin axum layer over a shared `SchedulerContext`. Every response uses
//! the same JSON envelope: `{ "success": bool, "data"?: T, "error"?: string }`.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Service banner |
//! | GET | `/api/v1/pipelines` | List pipelines |
//! | POST | `/api/v1/pipelines` | Submit a pipeline |
//! | GET | `/api/v1/pipelines/{id}` | Pipeline status with per-component placement |
//! | POST | `/api/v1/pipelines/{id}/components/{name}/events` | Runtime signal for one component |
//! | GET | `/api/v1/nodes` | Node inventory |
//! | POST | `/api/v1/nodes` | Register (or refresh) a node |
//! | DELETE | `/api/v1/nodes/{id}` | Remove a node |
//! | POST | `/api/v1/nodes/{id}/health` | Set a node's health classification |
//! | POST | `/api/v1/nodes/{id}/probe` | Feed a raw liveness probe result |
//! | GET | `/api/v1/datasets` | Known dataset locations |
//! | POST | `/api/v1/datasets/{id}/locations` | Record a replica |
//! | POST | `/api/v1/datasets/{id}/stale` | Flag a dataset's locations as stale |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};

use pipegrid_scheduler::SchedulerContext;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub ctx: Arc<SchedulerContext>,
}

/// Build the complete API router.
pub fn build_router(ctx: Arc<SchedulerContext>) -> Router {
    let state = ApiState { ctx };

    let api_routes = Router::new()
        .route(
            "/pipelines",
            get(handlers::list_pipelines).post(handlers::submit_pipeline),
        )
        .route("/pipelines/{id}", get(handlers::get_pipeline))
        .route(
            "/pipelines/{id}/components/{name}/events",
            post(handlers::report_event),
        )
        .route(
            "/nodes",
            get(handlers::list_nodes).post(handlers::register_node),
        )
        .route("/nodes/{id}", delete(handlers::remove_node))
        .route("/nodes/{id}/health", post(handlers::set_node_health))
        .route("/nodes/{id}/probe", post(handlers::record_probe))
        .route("/datasets", get(handlers::list_datasets))
        .route("/datasets/{id}/locations", post(handlers::record_location))
        .route("/datasets/{id}/stale", post(handlers::mark_stale))
        .with_state(state);

    Router::new()
        .route("/", get(handlers::banner))
        .nest("/api/v1", api_routes)
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use pipegrid_core::{CapacityClass, NodeSeed, PipegridConfig};
    use pipegrid_state::StateStore;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    async fn router() -> Router {
        let mut config = PipegridConfig::default();
        config.nodes = vec![NodeSeed {
            id: "n1".to_string(),
            class: CapacityClass::Medium,
            memory_mb: 4096,
            accelerator: false,
        }];
        let store = StateStore::open_in_memory().unwrap();
        build_router(Arc::new(SchedulerContext::new(config, store).await))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn banner_route() {
        let resp = router().await.oneshot(get_req("/")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["service"], "ML pipeline placement system");
    }

    #[tokio::test]
    async fn submit_then_get_pipeline() {
        let router = router().await;

        let resp = router
            .clone()
            .oneshot(post_json(
                "/api/v1/pipelines",
                json!({
                    "name": "demo",
                    "components": [
                        { "filename": "Load_Data.py" },
                        { "filename": "train.py", "requirement": { "memory_mb": 1024, "class": "medium" } }
                    ]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = body_json(resp).await;
        let id = body["data"]["pipeline_id"].as_str().unwrap().to_string();

        let resp = router
            .oneshot(get_req(&format!("/api/v1/pipelines/{id}")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["state"], "submitted");
        assert_eq!(body["data"]["components"][0]["name"], "load-data");
        assert_eq!(body["data"]["components"][0]["state"]["state"], "unplaced");
        assert_eq!(body["data"]["components"][1]["requirement"]["memory_mb"], 1024);
    }

    #[tokio::test]
    async fn unknown_pipeline_is_404() {
        let resp = router()
            .await
            .oneshot(get_req("/api/v1/pipelines/nope"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn node_lifecycle_over_http() {
        let router = router().await;

        let resp = router
            .clone()
            .oneshot(post_json(
                "/api/v1/nodes",
                json!({ "id": "n2", "class": "large", "memory_mb": 8192, "accelerator": true }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = router
            .clone()
            .oneshot(post_json("/api/v1/nodes/n2/health", json!({ "health": "suspect" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = router.clone().oneshot(get_req("/api/v1/nodes")).await.unwrap();
        let body = body_json(resp).await;
        let nodes = body["data"].as_array().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1]["id"], "n2");
        assert_eq!(nodes[1]["health"], "suspect");

        let resp = router
            .clone()
            .oneshot(post_json("/api/v1/nodes/n2/probe", json!({ "result": "healthy" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["health"], "alive");

        let resp = router
            .clone()
            .oneshot(post_json(
                "/api/v1/nodes",
                json!({ "id": "n1", "class": "medium", "memory_mb": 4096 }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let del = Request::builder()
            .method("DELETE")
            .uri("/api/v1/nodes/n2")
            .body(Body::empty())
            .unwrap();
        let resp = router.clone().oneshot(del).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let del = Request::builder()
            .method("DELETE")
            .uri("/api/v1/nodes/n2")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(del).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dataset_routes() {
        let router = router().await;

        let resp = router
            .clone()
            .oneshot(post_json("/api/v1/datasets/features/locations", json!({ "node_id": "n1" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = router
            .clone()
            .oneshot(post_json("/api/v1/datasets/features/stale", json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = router.oneshot(get_req("/api/v1/datasets")).await.unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["data"][0]["id"], "features");
        assert_eq!(body["data"][0]["nodes"][0], "n1");
        assert_eq!(body["data"][0]["stale"], true);
    }
}
