//! HTTP route handlers.

pub mod predict;
pub mod services;
pub mod stats;
pub mod tasks;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::Json;
use axum::Router;
use taskmesh_core::Error;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(tasks::routes())
        .merge(stats::routes())
        .merge(services::routes())
        .merge(predict::routes())
}

/// Status code and JSON body for a core error.
pub(crate) fn error_response(e: &Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = if e.is_invalid_input() {
        StatusCode::BAD_REQUEST
    } else if e.is_backend_unavailable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(serde_json::json!({ "error": e.to_string() })))
}
