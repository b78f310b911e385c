//! Several store handles over one database file behave like independent
//! worker processes sharing a broker.

use std::sync::Arc;

use taskmesh_core::{Priority, QueueConfig, TaskCategory, TaskStatus};
use taskmesh_store::{
    Broker, EnqueueRequest, MetadataStore, QueueState, SqliteStore, TaskMetadata, TaskOutcome,
};

fn open(dir: &std::path::Path) -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open(dir, &QueueConfig::default()).unwrap())
}

fn enqueue(broker: &dyn Broker, id: &str, category: TaskCategory) {
    broker
        .enqueue(&EnqueueRequest {
            task_id: id.into(),
            category,
            priority: Priority::Normal,
            payload: serde_json::json!({"name": id}),
            delay_secs: 0,
        })
        .unwrap();
}

#[test]
fn test_entry_leased_once_across_handles() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher_side = open(dir.path());
    let worker_a = open(dir.path());
    let worker_b = open(dir.path());

    enqueue(dispatcher_side.as_ref(), "code_1", TaskCategory::Code);

    let got_a = worker_a.reserve("worker-a", &[]).unwrap();
    let got_b = worker_b.reserve("worker-b", &[]).unwrap();
    assert!(got_a.is_some() ^ got_b.is_some());

    let entry = dispatcher_side.entry("code_1").unwrap().unwrap();
    assert_eq!(entry.state, QueueState::Reserved);
}

#[test]
fn test_composite_routes_to_orchestrator_queue() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    enqueue(store.as_ref(), "composite_1", TaskCategory::Composite);

    assert!(store.reserve("w", &["voice", "image"]).unwrap().is_none());
    let entry = store.reserve("w", &["orchestrator"]).unwrap().unwrap();
    assert_eq!(entry.queue, "orchestrator");
    assert_eq!(entry.category, TaskCategory::Composite);
}

#[test]
fn test_metadata_visible_to_other_handle() {
    let dir = tempfile::tempdir().unwrap();
    let writer = open(dir.path());
    let reader = open(dir.path());
    let now = taskmesh_core::clock::now_millis();

    writer
        .put(&TaskMetadata {
            task_id: "image_1".into(),
            category: TaskCategory::Image,
            status: TaskStatus::Pending,
            priority: Priority::Low,
            delay_secs: 0,
            created_at: now,
            updated_at: None,
            expires_at: now + 60_000,
            result: None,
            error: None,
        })
        .unwrap();

    let done = TaskOutcome::Succeeded {
        result: serde_json::json!({"url": "/images/1.png"}),
    };
    assert!(reader
        .update_status("image_1", TaskStatus::Succeeded, Some(&done))
        .unwrap());

    let meta = writer.get("image_1").unwrap().unwrap();
    assert_eq!(meta.status, TaskStatus::Succeeded);
    assert_eq!(meta.result.unwrap()["url"], "/images/1.png");
    assert!(meta.updated_at.is_some());
}

#[test]
fn test_reopen_keeps_queue() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = open(dir.path());
        enqueue(store.as_ref(), "search_1", TaskCategory::Search);
        store.heartbeat("worker-a", &["search"]).unwrap();
    }

    let store = open(dir.path());
    let snapshot = store.snapshot().unwrap();
    assert_eq!(snapshot.scheduled, 1);
    assert_eq!(snapshot.workers, vec!["worker-a"]);
}
