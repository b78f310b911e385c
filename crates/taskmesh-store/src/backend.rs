//! Backend traits for task metadata and the work queue.
//!
//! Every method that can fail because the backend is unreachable returns
//! `Error::BackendUnavailable`; absence is modeled with `Option`/`bool`.

use taskmesh_core::{Result, TaskStatus};

use crate::types::*;

/// Durable key-value store for task metadata with bounded expiry.
pub trait MetadataStore: Send + Sync {
    /// Insert or replace a metadata row.
    fn put(&self, meta: &TaskMetadata) -> Result<()>;

    /// Fetch a live (unexpired) row.
    fn get(&self, task_id: &str) -> Result<Option<TaskMetadata>>;

    /// Move a task forward. Terminal rows are never overwritten; returns
    /// `false` when nothing was updated.
    fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        outcome: Option<&TaskOutcome>,
    ) -> Result<bool>;

    /// Drop expired rows. Returns the number removed.
    fn purge_expired(&self) -> Result<usize>;
}

/// Category-routed, priority-weighted, delay-respecting work queue with
/// at-least-once delivery.
pub trait Broker: Send + Sync {
    fn enqueue(&self, req: &EnqueueRequest) -> Result<()>;

    /// Lease the best eligible entry from `queues` (all known queues when
    /// empty). Expired leases are returned to the queue first.
    fn reserve(&self, worker: &str, queues: &[&str]) -> Result<Option<QueueEntry>>;

    /// Mark a reserved entry as executing.
    fn start(&self, task_id: &str, worker: &str) -> Result<bool>;

    /// Record the terminal outcome. No-op (returns `false`) when already terminal.
    fn ack(&self, task_id: &str, outcome: &TaskOutcome) -> Result<bool>;

    /// Give a held entry back to the queue without a result.
    fn release(&self, task_id: &str, worker: &str) -> Result<bool>;

    /// Current row for a task, if the broker still knows it.
    fn entry(&self, task_id: &str) -> Result<Option<QueueEntry>>;

    fn heartbeat(&self, worker: &str, queues: &[&str]) -> Result<()>;

    fn snapshot(&self) -> Result<BrokerSnapshot>;
}
