//! Dispatcher response shapes.

use serde::{Deserialize, Serialize};
use taskmesh_core::{Priority, TaskCategory, TaskStatus, KNOWN_QUEUES};

/// Answer to a status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusReport {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<TaskCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl TaskStatusReport {
    pub fn not_found(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: TaskStatus::NotFound,
            result: None,
            error: None,
            created_at: None,
            category: None,
            priority: None,
        }
    }
}

/// Broker snapshot as reported to callers. `error` is set when the broker
/// could not be reached and the counters are zeroed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub active: usize,
    pub scheduled: usize,
    pub reserved: usize,
    pub workers: Vec<String>,
    pub queues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueueStats {
    pub fn unavailable(error: String) -> Self {
        Self {
            active: 0,
            scheduled: 0,
            reserved: 0,
            workers: Vec::new(),
            queues: known_queues(),
            error: Some(error),
        }
    }

    /// Tasks the broker still holds in any non-terminal state.
    pub fn in_flight(&self) -> usize {
        self.active + self.scheduled + self.reserved
    }
}

pub(crate) fn known_queues() -> Vec<String> {
    KNOWN_QUEUES.iter().map(|q| q.to_string()).collect()
}
