//! Shared application state.

use std::sync::Arc;

use taskmesh_anticipate::AnticipationEngine;
use taskmesh_core::{Result, TaskMeshConfig};
use taskmesh_dispatch::Dispatcher;
use taskmesh_orchestrator::Orchestrator;
use taskmesh_runtime::Coordinator;
use taskmesh_store::SqliteStore;
use tracing::info;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: TaskMeshConfig,
    pub store: Arc<SqliteStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub orchestrator: Arc<Orchestrator>,
    pub anticipation: Arc<AnticipationEngine>,
    pub coordinator: Arc<Coordinator>,
}

impl AppState {
    /// Open the store and wire up every component. Nothing is started:
    /// the orchestrator is not yet connected and no loop is running.
    pub fn open(config: TaskMeshConfig) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(&config.data_paths.queue, &config.queue)?);
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), store.clone(), &config.queue));
        let orchestrator = Arc::new(Orchestrator::new(config.endpoints.clone()));
        let anticipation = Arc::new(AnticipationEngine::restore(
            config.anticipation.clone(),
            &config.data_paths.checkpoint_file,
        ));
        let coordinator = Arc::new(Coordinator::new(
            dispatcher.clone(),
            store.clone(),
            orchestrator.clone(),
            anticipation.clone(),
            &config.worker_name,
            &config.queue,
        ));

        info!(
            "TaskMesh state ready: worker={}, {} endpoints",
            config.worker_name,
            config.endpoints.len()
        );

        Ok(Self {
            config,
            store,
            dispatcher,
            orchestrator,
            anticipation,
            coordinator,
        })
    }
}
