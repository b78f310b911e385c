//! Task submission and status routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::warn;

use super::error_response;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", post(create_task))
        .route("/tasks/{id}", get(get_task))
}

#[derive(Deserialize)]
struct CreateTaskRequest {
    category: String,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(default = "default_priority")]
    priority: String,
    /// Seconds before the task becomes eligible.
    #[serde(default)]
    delay: u64,
}

fn default_priority() -> String {
    "normal".into()
}

/// POST /api/tasks: submit a task.
async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> impl IntoResponse {
    match state
        .dispatcher
        .dispatch(&req.category, req.payload, &req.priority, req.delay)
    {
        Ok(task_id) => (
            StatusCode::OK,
            Json(serde_json::json!({ "task_id": task_id })),
        ),
        Err(e) => {
            warn!("Rejected task submission: {}", e);
            error_response(&e)
        }
    }
}

/// GET /api/tasks/{id}: task status. Unknown ids answer `not_found`.
async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.dispatcher.status(&id) {
        Ok(report) => (
            StatusCode::OK,
            Json(serde_json::to_value(report).unwrap_or_default()),
        ),
        Err(e) => error_response(&e),
    }
}
