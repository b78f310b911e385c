//! Backend service health routes.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use taskmesh_orchestrator::{HealthState, ServiceStatus};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/services", get(get_services))
        .route("/services/details", get(get_service_details))
        .route("/services/probe", post(probe_services))
}

fn health_by_name(state: &AppState) -> BTreeMap<String, HealthState> {
    state
        .orchestrator
        .service_status()
        .into_iter()
        .map(|s| (s.name, s.health))
        .collect()
}

/// GET /api/services: endpoint name → last probed health.
async fn get_services(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, HealthState>> {
    Json(health_by_name(&state))
}

/// GET /api/services/details: capability, address and health per endpoint.
async fn get_service_details(State(state): State<Arc<AppState>>) -> Json<Vec<ServiceStatus>> {
    Json(state.orchestrator.service_status())
}

/// POST /api/services/probe: re-run the health probes now.
async fn probe_services(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, HealthState>> {
    state.orchestrator.probe_all().await;
    Json(health_by_name(&state))
}
