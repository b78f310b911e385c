//! Dispatcher: validates, identifies, enqueues and tracks tasks.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use taskmesh_core::clock::now_millis;
use taskmesh_core::{Priority, QueueConfig, Result, TaskCategory, TaskStatus};
use taskmesh_store::{Broker, EnqueueRequest, MetadataStore, TaskMetadata, TaskOutcome};
use tracing::{debug, info, warn};

use crate::types::*;

/// Entry point for submitting tasks and querying their state.
pub struct Dispatcher {
    metadata: Arc<dyn MetadataStore>,
    broker: Arc<dyn Broker>,
    retention_ms: i64,
    /// Millisecond component of the last issued id.
    last_id_ms: AtomicI64,
}

impl Dispatcher {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        broker: Arc<dyn Broker>,
        config: &QueueConfig,
    ) -> Self {
        Self {
            metadata,
            broker,
            retention_ms: config.retention_secs as i64 * 1000,
            last_id_ms: AtomicI64::new(0),
        }
    }

    /// Submit a task from stringly-typed input.
    ///
    /// Category and priority are validated before anything is written.
    pub fn dispatch(
        &self,
        category: &str,
        payload: serde_json::Value,
        priority: &str,
        delay_secs: u64,
    ) -> Result<String> {
        let category: TaskCategory = category.parse()?;
        let priority: Priority = priority.parse()?;
        self.submit(category, payload, priority, delay_secs)
    }

    /// Submit an already validated task. Enqueues first, then records
    /// pending metadata with the retention expiry.
    pub fn submit(
        &self,
        category: TaskCategory,
        payload: serde_json::Value,
        priority: Priority,
        delay_secs: u64,
    ) -> Result<String> {
        let task_id = self.next_task_id(category);

        self.broker.enqueue(&EnqueueRequest {
            task_id: task_id.clone(),
            category,
            priority,
            payload,
            delay_secs,
        })?;

        let now = now_millis();
        self.metadata.put(&TaskMetadata {
            task_id: task_id.clone(),
            category,
            status: TaskStatus::Pending,
            priority,
            delay_secs,
            created_at: now,
            updated_at: None,
            expires_at: now + self.retention_ms,
            result: None,
            error: None,
        })?;

        info!(
            "Dispatched {} to queue {} (priority={}, delay={}s)",
            task_id,
            category.queue_name(),
            priority,
            delay_secs
        );
        Ok(task_id)
    }

    /// `<category>_<epoch-ms>`, with the millisecond part strictly
    /// increasing across calls on this dispatcher.
    fn next_task_id(&self, category: TaskCategory) -> String {
        let now = now_millis();
        let prev = self
            .last_id_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        format!("{}_{}", category, now.max(prev + 1))
    }

    /// Current state of a task. Unknown or expired ids report `not_found`.
    pub fn status(&self, task_id: &str) -> Result<TaskStatusReport> {
        let Some(meta) = self.metadata.get(task_id)? else {
            return Ok(TaskStatusReport::not_found(task_id));
        };
        let entry = self.broker.entry(task_id)?;

        let queue_status = entry.as_ref().map(|e| e.state.task_status());
        let status = merge_status(meta.status, queue_status);

        let result = match status {
            TaskStatus::Succeeded => meta
                .result
                .clone()
                .or_else(|| entry.as_ref().and_then(|e| e.result.clone())),
            _ => None,
        };
        let error = match status {
            TaskStatus::Failed => meta
                .error
                .clone()
                .or_else(|| entry.as_ref().and_then(|e| e.error.clone())),
            _ => None,
        };

        Ok(TaskStatusReport {
            task_id: meta.task_id,
            status,
            result,
            error,
            created_at: Some(meta.created_at),
            category: Some(meta.category),
            priority: Some(meta.priority),
        })
    }

    /// Broker counters. An unreachable broker yields zeroed counters with
    /// `error` set instead of failing.
    pub fn queue_stats(&self) -> QueueStats {
        match self.broker.snapshot() {
            Ok(snapshot) => QueueStats {
                active: snapshot.active,
                scheduled: snapshot.scheduled,
                reserved: snapshot.reserved,
                workers: snapshot.workers,
                queues: known_queues(),
                error: None,
            },
            Err(e) => {
                warn!("Queue stats unavailable: {}", e);
                QueueStats::unavailable(e.to_string())
            }
        }
    }

    /// Record that `worker` has begun executing a reserved task.
    pub fn mark_running(&self, task_id: &str, worker: &str) -> Result<bool> {
        let started = self.broker.start(task_id, worker)?;
        if !started {
            debug!("{} no longer leased by {}", task_id, worker);
        }
        let updated = self
            .metadata
            .update_status(task_id, TaskStatus::Running, None)?;
        Ok(started && updated)
    }

    /// Store the terminal outcome on both the broker and the metadata.
    ///
    /// Returns `false` when the task was already terminal; the earlier
    /// outcome is kept.
    pub fn complete(&self, task_id: &str, outcome: &TaskOutcome) -> Result<bool> {
        let acked = self.broker.ack(task_id, outcome)?;
        let updated = self
            .metadata
            .update_status(task_id, outcome.status(), Some(outcome))?;
        if !updated {
            debug!("{} already terminal, {} outcome dropped", task_id, outcome.status());
        } else {
            info!("Task {} {}", task_id, outcome.status());
        }
        Ok(acked || updated)
    }
}

/// Combine the metadata status with the broker's view. A terminal state on
/// either side wins; otherwise the more advanced one is reported.
fn merge_status(local: TaskStatus, queue: Option<TaskStatus>) -> TaskStatus {
    match queue {
        _ if local.is_terminal() => local,
        Some(q) if q.is_terminal() => q,
        Some(q) if q.rank() > local.rank() => q,
        _ => local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_core::Error;
    use taskmesh_store::{BrokerSnapshot, QueueEntry, SqliteStore};
    use tempfile::TempDir;

    fn setup() -> (Dispatcher, Arc<SqliteStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = QueueConfig::default();
        let store = Arc::new(SqliteStore::open(dir.path(), &config).unwrap());
        let dispatcher = Dispatcher::new(store.clone(), store.clone(), &config);
        (dispatcher, store, dir)
    }

    /// Broker whose backend is gone.
    struct DownBroker;

    impl Broker for DownBroker {
        fn enqueue(&self, _req: &EnqueueRequest) -> Result<()> {
            Err(Error::BackendUnavailable("broker: connection refused".into()))
        }
        fn reserve(&self, _worker: &str, _queues: &[&str]) -> Result<Option<QueueEntry>> {
            Err(Error::BackendUnavailable("broker: connection refused".into()))
        }
        fn start(&self, _task_id: &str, _worker: &str) -> Result<bool> {
            Err(Error::BackendUnavailable("broker: connection refused".into()))
        }
        fn ack(&self, _task_id: &str, _outcome: &TaskOutcome) -> Result<bool> {
            Err(Error::BackendUnavailable("broker: connection refused".into()))
        }
        fn release(&self, _task_id: &str, _worker: &str) -> Result<bool> {
            Err(Error::BackendUnavailable("broker: connection refused".into()))
        }
        fn entry(&self, _task_id: &str) -> Result<Option<QueueEntry>> {
            Err(Error::BackendUnavailable("broker: connection refused".into()))
        }
        fn heartbeat(&self, _worker: &str, _queues: &[&str]) -> Result<()> {
            Err(Error::BackendUnavailable("broker: connection refused".into()))
        }
        fn snapshot(&self) -> Result<BrokerSnapshot> {
            Err(Error::BackendUnavailable("broker: connection refused".into()))
        }
    }

    #[test]
    fn test_dispatch_id_format() {
        let (dispatcher, _store, _dir) = setup();
        let id = dispatcher
            .dispatch("search", serde_json::json!({"query": "test"}), "high", 0)
            .unwrap();
        let millis = id.strip_prefix("search_").unwrap();
        assert!(millis.parse::<i64>().unwrap() > 0);
    }

    #[test]
    fn test_ids_strictly_increasing() {
        let (dispatcher, _store, _dir) = setup();
        let mut last = 0i64;
        for _ in 0..50 {
            let id = dispatcher
                .submit(TaskCategory::Code, serde_json::json!({}), Priority::Normal, 0)
                .unwrap();
            let ms: i64 = id.strip_prefix("code_").unwrap().parse().unwrap();
            assert!(ms > last);
            last = ms;
        }
    }

    #[test]
    fn test_status_pending_after_dispatch() {
        let (dispatcher, _store, _dir) = setup();
        let id = dispatcher
            .dispatch("voice", serde_json::json!({"text": "hello"}), "normal", 0)
            .unwrap();
        let report = dispatcher.status(&id).unwrap();
        assert_eq!(report.status, TaskStatus::Pending);
        assert_eq!(report.category, Some(TaskCategory::Voice));
        assert_eq!(report.priority, Some(Priority::Normal));
        assert!(report.created_at.is_some());
        assert!(report.result.is_none());
    }

    #[test]
    fn test_unknown_category_has_no_side_effects() {
        let (dispatcher, store, _dir) = setup();
        let err = dispatcher
            .dispatch("general", serde_json::json!({}), "normal", 0)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownCategory(_)));
        assert_eq!(store.snapshot().unwrap().scheduled, 0);
    }

    #[test]
    fn test_invalid_priority_rejected() {
        let (dispatcher, store, _dir) = setup();
        let err = dispatcher
            .dispatch("code", serde_json::json!({}), "urgent", 0)
            .unwrap_err();
        assert!(err.is_invalid_input());
        assert_eq!(store.snapshot().unwrap().scheduled, 0);
    }

    #[test]
    fn test_status_not_found() {
        let (dispatcher, _store, _dir) = setup();
        let report = dispatcher.status("search_123").unwrap();
        assert_eq!(report.status, TaskStatus::NotFound);
        assert!(report.category.is_none());
    }

    #[test]
    fn test_status_follows_broker_ahead_of_metadata() {
        let (dispatcher, store, _dir) = setup();
        let id = dispatcher
            .dispatch("image", serde_json::json!({"prompt": "a fox"}), "low", 0)
            .unwrap();

        let entry = store.reserve("w1", &["image"]).unwrap().unwrap();
        assert_eq!(entry.task_id, id);
        assert_eq!(dispatcher.status(&id).unwrap().status, TaskStatus::Pending);

        // Broker knows the task started; metadata has not caught up yet.
        store.start(&id, "w1").unwrap();
        assert_eq!(dispatcher.status(&id).unwrap().status, TaskStatus::Running);

        let outcome = TaskOutcome::Succeeded {
            result: serde_json::json!({"url": "/fox.png"}),
        };
        store.ack(&id, &outcome).unwrap();
        let report = dispatcher.status(&id).unwrap();
        assert_eq!(report.status, TaskStatus::Succeeded);
        assert_eq!(report.result.unwrap()["url"], "/fox.png");
    }

    #[test]
    fn test_complete_terminal_not_overwritten() {
        let (dispatcher, store, _dir) = setup();
        let id = dispatcher
            .dispatch("code", serde_json::json!({"source": "fn main() {}"}), "normal", 0)
            .unwrap();
        store.reserve("w1", &[]).unwrap().unwrap();
        assert!(dispatcher.mark_running(&id, "w1").unwrap());

        let failed = TaskOutcome::Failed {
            error: "code backend returned 500".into(),
        };
        assert!(dispatcher.complete(&id, &failed).unwrap());

        let late = TaskOutcome::Succeeded {
            result: serde_json::json!({}),
        };
        assert!(!dispatcher.complete(&id, &late).unwrap());

        let report = dispatcher.status(&id).unwrap();
        assert_eq!(report.status, TaskStatus::Failed);
        assert_eq!(report.error.as_deref(), Some("code backend returned 500"));
        assert!(report.result.is_none());
    }

    #[test]
    fn test_queue_stats_counts() {
        let (dispatcher, store, _dir) = setup();
        dispatcher
            .dispatch("search", serde_json::json!({"query": "test"}), "high", 0)
            .unwrap();
        dispatcher
            .dispatch("search", serde_json::json!({"query": "later"}), "normal", 30)
            .unwrap();
        store.heartbeat("w1", &["search"]).unwrap();

        let stats = dispatcher.queue_stats();
        assert!(stats.error.is_none());
        assert_eq!(stats.scheduled, 2);
        assert_eq!(stats.workers, vec!["w1"]);
        assert!(stats.queues.contains(&"orchestrator".to_string()));
        assert_eq!(stats.in_flight(), 2);
    }

    #[test]
    fn test_queue_stats_degrades_when_broker_down() {
        let dir = TempDir::new().unwrap();
        let config = QueueConfig::default();
        let store = Arc::new(SqliteStore::open(dir.path(), &config).unwrap());
        let dispatcher = Dispatcher::new(store, Arc::new(DownBroker), &config);

        let stats = dispatcher.queue_stats();
        assert!(stats.error.unwrap().contains("connection refused"));
        assert_eq!(stats.active, 0);
        assert_eq!(stats.queues.len(), 6);
    }

    #[test]
    fn test_dispatch_propagates_backend_unavailable() {
        let dir = TempDir::new().unwrap();
        let config = QueueConfig::default();
        let store = Arc::new(SqliteStore::open(dir.path(), &config).unwrap());
        let dispatcher = Dispatcher::new(store.clone(), Arc::new(DownBroker), &config);

        let err = dispatcher
            .dispatch("voice", serde_json::json!({}), "normal", 0)
            .unwrap_err();
        assert!(err.is_backend_unavailable());
        // Nothing recorded for a task the broker never accepted.
        assert_eq!(store.purge_expired_at(i64::MAX).unwrap(), 0);
    }

    #[test]
    fn test_merge_status() {
        use TaskStatus::*;
        assert_eq!(merge_status(Pending, None), Pending);
        assert_eq!(merge_status(Pending, Some(Running)), Running);
        assert_eq!(merge_status(Running, Some(Pending)), Running);
        assert_eq!(merge_status(Running, Some(Failed)), Failed);
        assert_eq!(merge_status(Succeeded, Some(Pending)), Succeeded);
        assert_eq!(merge_status(Failed, Some(Succeeded)), Failed);
    }
}
