//! Queue statistics and liveness routes.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use taskmesh_dispatch::QueueStats;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/health", get(get_health))
}

/// GET /api/stats: broker snapshot; carries `error` when the broker is down.
async fn get_stats(State(state): State<Arc<AppState>>) -> Json<QueueStats> {
    Json(state.dispatcher.queue_stats())
}

/// GET /api/health: process liveness.
async fn get_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "worker": state.config.worker_name,
        "connected": state.orchestrator.is_connected(),
    }))
}
