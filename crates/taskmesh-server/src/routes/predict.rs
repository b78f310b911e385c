//! Resource prediction route.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/predict", post(predict))
}

/// POST /api/predict: body is a task description (`{name, type, payload}`).
async fn predict(
    State(state): State<Arc<AppState>>,
    Json(task): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    let resources = state.anticipation.predict(&task);
    Json(serde_json::json!({ "resources": resources }))
}
