//! Orchestrator result and health types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use taskmesh_core::Capability;

/// Outcome of the most recent health probe of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Probe answered 2xx.
    Healthy,
    /// Probe answered, but not 2xx.
    Unhealthy,
    /// Probe did not get an answer (refused, timed out).
    Unavailable,
    /// Never probed.
    Unknown,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Unavailable => "unavailable",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health of one registered endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub capability: Capability,
    pub name: String,
    pub url: String,
    pub health: HealthState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubStatus {
    Ok,
    Failed,
}

/// Outcome of one backend call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubResult {
    pub status: SubStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl SubResult {
    pub fn ok(result: serde_json::Value, elapsed_ms: u64) -> Self {
        Self {
            status: SubStatus::Ok,
            result: Some(result),
            error: None,
            elapsed_ms,
        }
    }

    pub fn failed(error: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            status: SubStatus::Failed,
            result: None,
            error: Some(error.into()),
            elapsed_ms,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == SubStatus::Ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Completed,
    Failed,
}

/// Result of executing one task.
///
/// For composite tasks `status` is `completed` whenever the fan-out itself
/// ran; the per-service outcome lives in `outputs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub task_id: String,
    pub status: ExecutionStatus,
    /// Sub-results keyed by requested service name.
    pub outputs: BTreeMap<String, SubResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
    /// Capabilities an RPC was issued to, in request order.
    pub called: Vec<Capability>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    /// Some sub-calls succeeded and some failed.
    pub fn is_partial_failure(&self) -> bool {
        let failed = self.outputs.values().filter(|r| !r.is_ok()).count();
        failed > 0 && failed < self.outputs.len()
    }

    /// Output payload for storage as the task result.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(outputs: Vec<(&str, SubResult)>) -> ExecutionResult {
        ExecutionResult {
            task_id: "composite_1".into(),
            status: ExecutionStatus::Completed,
            outputs: outputs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            error: None,
            elapsed_ms: 3,
            called: vec![],
        }
    }

    #[test]
    fn test_partial_failure() {
        let mixed = result(vec![
            ("voice", SubResult::ok(serde_json::json!({}), 1)),
            ("image", SubResult::failed("connection refused", 1)),
        ]);
        assert!(mixed.is_partial_failure());

        let all_failed = result(vec![("image", SubResult::failed("down", 1))]);
        assert!(!all_failed.is_partial_failure());

        let empty = result(vec![]);
        assert!(!empty.is_partial_failure());
    }

    #[test]
    fn test_sub_result_serialization() {
        let json = serde_json::to_value(SubResult::failed("timeout", 30_000)).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "timeout");
        assert!(json.get("result").is_none());
    }
}
