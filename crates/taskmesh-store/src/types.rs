//! Rows and requests for the metadata store and the broker.

use serde::{Deserialize, Serialize};
use taskmesh_core::{Priority, TaskCategory, TaskStatus};

/// A task metadata row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub task_id: String,
    pub category: TaskCategory,
    pub status: TaskStatus,
    pub priority: Priority,
    pub delay_secs: u64,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    pub expires_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Terminal outcome of one task execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskOutcome {
    Succeeded { result: serde_json::Value },
    Failed { error: String },
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Succeeded { .. } => TaskStatus::Succeeded,
            Self::Failed { .. } => TaskStatus::Failed,
        }
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Succeeded { result } => Some(result),
            Self::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Succeeded { .. } => None,
            Self::Failed { error } => Some(error),
        }
    }
}

/// Broker-side state of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    /// Enqueued, not held by any worker (may still be delayed).
    Waiting,
    /// Leased by a worker, not started.
    Reserved,
    /// Executing.
    Active,
    Succeeded,
    Failed,
}

impl QueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Reserved => "reserved",
            Self::Active => "active",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "reserved" => Some(Self::Reserved),
            "active" => Some(Self::Active),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Lifecycle status this queue state implies.
    pub fn task_status(&self) -> TaskStatus {
        match self {
            Self::Waiting | Self::Reserved => TaskStatus::Pending,
            Self::Active => TaskStatus::Running,
            Self::Succeeded => TaskStatus::Succeeded,
            Self::Failed => TaskStatus::Failed,
        }
    }
}

/// A request to put one task on the queue.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub task_id: String,
    pub category: TaskCategory,
    pub priority: Priority,
    pub payload: serde_json::Value,
    pub delay_secs: u64,
}

/// A queue entry row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub task_id: String,
    pub queue: String,
    pub category: TaskCategory,
    pub priority: Priority,
    pub payload: serde_json::Value,
    pub state: QueueState,
    pub enqueued_at: i64,
    pub eligible_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_expires_at: Option<i64>,
    /// Number of times the entry has been handed to a worker.
    pub attempts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueueEntry {
    /// Whether this delivery is a redelivery after a lost lease.
    pub fn is_redelivery(&self) -> bool {
        self.attempts > 1
    }
}

/// Point-in-time broker counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerSnapshot {
    pub active: usize,
    pub scheduled: usize,
    pub reserved: usize,
    pub workers: Vec<String>,
}
