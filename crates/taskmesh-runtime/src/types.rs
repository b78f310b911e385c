//! Runtime types.

use serde::Serialize;
use taskmesh_anticipate::OutcomeReport;
use taskmesh_orchestrator::ExecutionResult;

/// Everything one coordinator cycle did with a task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskCycle {
    pub task_id: String,
    /// Delivery attempt number, starting at 1.
    pub attempt: i64,
    /// Resource ids predicted (and preloaded) before execution.
    pub predicted: Vec<String>,
    pub execution: ExecutionResult,
    /// Resource ids the execution actually used.
    pub actual: Vec<String>,
    /// `false` when the task had already reached a terminal state.
    pub outcome_recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning: Option<OutcomeReport>,
}
