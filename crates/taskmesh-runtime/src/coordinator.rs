//! Coordinator: pulls tasks off the broker and runs them end to end.

use std::sync::Arc;
use std::time::Duration;

use taskmesh_anticipate::AnticipationEngine;
use taskmesh_core::{QueueConfig, Result, TaskEnvelope, KNOWN_QUEUES};
use taskmesh_dispatch::Dispatcher;
use taskmesh_orchestrator::{ExecutionResult, Orchestrator};
use taskmesh_store::{Broker, QueueEntry, TaskOutcome};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::types::TaskCycle;

/// Worker loop over one broker.
pub struct Coordinator {
    dispatcher: Arc<Dispatcher>,
    broker: Arc<dyn Broker>,
    orchestrator: Arc<Orchestrator>,
    anticipation: Arc<AnticipationEngine>,
    worker: String,
    queues: Vec<String>,
    poll_interval: Duration,
    error_backoff: Duration,
}

impl Coordinator {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        broker: Arc<dyn Broker>,
        orchestrator: Arc<Orchestrator>,
        anticipation: Arc<AnticipationEngine>,
        worker: &str,
        config: &QueueConfig,
    ) -> Self {
        Self {
            dispatcher,
            broker,
            orchestrator,
            anticipation,
            worker: worker.to_string(),
            queues: KNOWN_QUEUES.iter().map(|q| q.to_string()).collect(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            error_backoff: Duration::from_millis(config.error_backoff_ms),
        }
    }

    /// Restrict the loop to the given queues.
    pub fn with_queues(mut self, queues: Vec<String>) -> Self {
        if !queues.is_empty() {
            self.queues = queues;
        }
        self
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// Heartbeat, then reserve and process at most one task.
    ///
    /// `Ok(None)` means nothing was eligible.
    pub async fn run_once(&self) -> Result<Option<TaskCycle>> {
        let queues: Vec<&str> = self.queues.iter().map(String::as_str).collect();
        self.broker.heartbeat(&self.worker, &queues)?;

        let Some(entry) = self.broker.reserve(&self.worker, &queues)? else {
            return Ok(None);
        };
        let task_id = entry.task_id.clone();

        match self.process(entry).await {
            Ok(cycle) => Ok(Some(cycle)),
            Err(e) => {
                // Hand the lease back so another worker can retry sooner.
                if let Err(release_err) = self.broker.release(&task_id, &self.worker) {
                    warn!("Could not release {}: {}", task_id, release_err);
                }
                Err(e)
            }
        }
    }

    /// Run one reserved entry through prediction, execution and learning.
    pub async fn process(&self, entry: QueueEntry) -> Result<TaskCycle> {
        if entry.is_redelivery() {
            warn!(
                "Redelivered task {} (attempt {})",
                entry.task_id, entry.attempts
            );
        }
        self.dispatcher.mark_running(&entry.task_id, &self.worker)?;

        let envelope = TaskEnvelope::from_payload(&entry.task_id, entry.category, entry.payload);
        let description = envelope.description();

        let predicted = self.anticipation.predict(&description);
        if !predicted.is_empty() {
            debug!("Preloading {:?} for {}", predicted, envelope.id);
            self.orchestrator.preload(&predicted).await;
        }

        let execution = self.orchestrator.execute(&envelope).await;
        let outcome = outcome_for(&execution);
        let outcome_recorded = self.dispatcher.complete(&envelope.id, &outcome)?;

        let actual: Vec<String> = execution
            .called
            .iter()
            .map(|c| c.resource_id().to_string())
            .collect();
        let learning = self.anticipation.learn_from_outcome(&description, &actual);

        info!(
            "Task {} finished: {} in {}ms",
            envelope.id,
            outcome.status(),
            execution.elapsed_ms
        );

        Ok(TaskCycle {
            task_id: envelope.id,
            attempt: entry.attempts,
            predicted,
            execution,
            actual,
            outcome_recorded,
            learning,
        })
    }

    /// Loop until `cancel` fires. Polls every `poll_interval` when idle and
    /// waits `error_backoff` after an infrastructure error. A task already
    /// in progress finishes before the loop exits.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Coordinator {} listening on {}",
            self.worker,
            self.queues.join(",")
        );
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let wait = match self.run_once().await {
                Ok(Some(_)) => Duration::ZERO,
                Ok(None) => self.poll_interval,
                Err(e) => {
                    error!("Coordinator cycle failed: {}", e);
                    self.error_backoff
                }
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        info!("Coordinator {} stopped", self.worker);
    }

    /// Spawn `run` on the tokio runtime.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}

/// Map an execution result onto the stored task outcome. Composite tasks
/// that ran succeed even if some services failed; the per-service detail is
/// kept in the result.
fn outcome_for(execution: &ExecutionResult) -> TaskOutcome {
    if execution.is_success() {
        TaskOutcome::Succeeded {
            result: execution.to_value(),
        }
    } else {
        TaskOutcome::Failed {
            error: execution
                .error
                .clone()
                .unwrap_or_else(|| "execution failed".to_string()),
        }
    }
}
