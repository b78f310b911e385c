//! Task vocabulary shared by the dispatcher, orchestrator and runtime.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Every queue a worker may listen on.
pub const KNOWN_QUEUES: &[&str] = &["default", "voice", "image", "code", "search", "orchestrator"];

/// Fixed classification of a task, used for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Voice,
    Image,
    Code,
    Search,
    /// Names several capabilities in its `services` list.
    Composite,
}

impl TaskCategory {
    pub fn all() -> &'static [TaskCategory] {
        &[
            Self::Voice,
            Self::Image,
            Self::Code,
            Self::Search,
            Self::Composite,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Image => "image",
            Self::Code => "code",
            Self::Search => "search",
            Self::Composite => "composite",
        }
    }

    /// Broker queue the category is routed to.
    pub fn queue_name(&self) -> &'static str {
        match self {
            Self::Composite => "orchestrator",
            other => other.as_str(),
        }
    }

    /// The single backend capability, or `None` for composite tasks.
    pub fn capability(&self) -> Option<Capability> {
        match self {
            Self::Voice => Some(Capability::Voice),
            Self::Image => Some(Capability::Image),
            Self::Code => Some(Capability::Code),
            Self::Search => Some(Capability::Search),
            Self::Composite => None,
        }
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "voice" => Ok(Self::Voice),
            "image" => Ok(Self::Image),
            "code" => Ok(Self::Code),
            "search" => Ok(Self::Search),
            "composite" => Ok(Self::Composite),
            other => Err(Error::UnknownCategory(other.to_string())),
        }
    }
}

/// A backend capability service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Voice,
    Image,
    Code,
    Search,
}

impl Capability {
    pub fn all() -> &'static [Capability] {
        &[Self::Voice, Self::Image, Self::Code, Self::Search]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Image => "image",
            Self::Code => "code",
            Self::Search => "search",
        }
    }

    /// Task-processing route on the backend.
    pub fn route(&self) -> &'static str {
        match self {
            Self::Voice => "/process",
            Self::Image => "/generate",
            Self::Code => "/analyze",
            Self::Search => "/query",
        }
    }

    /// Resource identifier consumed when this capability is called.
    pub fn resource_id(&self) -> &'static str {
        match self {
            Self::Voice => "voice_models",
            Self::Image => "image_models",
            Self::Code => "code_models",
            Self::Search => "search_cache",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "voice" => Some(Self::Voice),
            "image" => Some(Self::Image),
            "code" => Some(Self::Code),
            "search" => Some(Self::Search),
            _ => None,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory scheduling priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Numeric queue weight. Higher is serviced preferentially.
    pub fn weight(&self) -> i64 {
        match self {
            Self::High => 9,
            Self::Normal => 5,
            Self::Low => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            other => Err(Error::InvalidPriority(other.to_string())),
        }
    }
}

/// Lifecycle status of a task as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// No metadata for the id (never dispatched, or expired).
    NotFound,
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Position in pending → running → terminal.
    pub fn rank(&self) -> u8 {
        match self {
            Self::NotFound => 0,
            Self::Pending => 1,
            Self::Running => 2,
            Self::Succeeded | Self::Failed => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_found" => Some(Self::NotFound),
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The envelope a worker hands to the orchestrator, and the shape sent to
/// backends as the request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub id: String,
    /// Human-readable task name; empty when the payload carries none.
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub category: TaskCategory,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Target capabilities of a composite task.
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_parallel() -> bool {
    true
}

impl TaskEnvelope {
    /// Build an envelope, lifting the routing keys out of the payload.
    pub fn from_payload(id: &str, category: TaskCategory, payload: serde_json::Value) -> Self {
        let name = payload
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let services = payload
            .get("services")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|s| s.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let parallel = payload
            .get("parallel")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        Self {
            id: id.to_string(),
            name,
            category,
            payload,
            services,
            parallel,
        }
    }

    /// Description used for need prediction: `{name, type, payload}`.
    pub fn description(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "type": self.category,
            "payload": self.payload,
        })
    }
}
