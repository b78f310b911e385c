//! Configuration and data directory management.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::Capability;

/// Paths to all TaskMesh data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Queue and task metadata database directory (`data/queue/`).
    pub queue: PathBuf,
    /// Anticipation checkpoint (`data/anticipation_patterns.json`).
    pub checkpoint_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            queue: root.join("queue"),
            checkpoint_file: root.join("anticipation_patterns.json"),
            root,
        };
        std::fs::create_dir_all(&paths.queue)?;
        Ok(paths)
    }
}

/// Static description of one backend capability service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub capability: Capability,
    /// Human-readable name used in logs.
    pub name: String,
    /// Base address, e.g. `http://voice:8001`.
    pub url: String,
    #[serde(default = "default_health_check")]
    pub health_check: String,
    /// Per-call timeout in seconds.
    #[serde(default = "default_call_timeout")]
    pub timeout_secs: u64,
}

fn default_health_check() -> String {
    "/health".into()
}

fn default_call_timeout() -> u64 {
    30
}

impl EndpointConfig {
    pub fn new(capability: Capability, name: &str, url: &str) -> Self {
        Self {
            capability,
            name: name.to_string(),
            url: url.trim_end_matches('/').to_string(),
            health_check: default_health_check(),
            timeout_secs: default_call_timeout(),
        }
    }
}

/// Broker and metadata-store tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Retention window for task metadata and finished queue entries.
    pub retention_secs: u64,
    /// Lease length before an unacknowledged reservation is redelivered.
    pub visibility_timeout_secs: u64,
    /// Milliseconds of waiting worth one priority weight point.
    pub aging_interval_ms: i64,
    /// A worker without a heartbeat for this long is not listed.
    pub worker_liveness_secs: u64,
    /// Idle poll interval of the coordinating loop.
    pub poll_interval_ms: u64,
    /// Back-off after an infrastructure error in the coordinating loop.
    pub error_backoff_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retention_secs: 3600,
            visibility_timeout_secs: 300,
            aging_interval_ms: 10_000,
            worker_liveness_secs: 60,
            poll_interval_ms: 1000,
            error_backoff_ms: 5000,
        }
    }
}

/// Anticipation engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnticipationConfig {
    /// Patterns below this confidence never fire.
    pub threshold: f64,
    /// Prediction history ring capacity.
    pub history_capacity: usize,
    /// Seconds between recalibration passes.
    pub analyze_interval_secs: u64,
    /// Recalibration is skipped until the history holds this many entries.
    pub min_history: usize,
    /// Number of newest history entries recalibration looks at.
    pub window: usize,
    /// A resource needs strictly more samples than this to move confidence.
    pub min_samples: usize,
    /// History entries written to the checkpoint.
    pub checkpoint_history: usize,
    /// Starting confidence of a learned pattern.
    pub learned_confidence: f64,
}

impl Default for AnticipationConfig {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            history_capacity: 100,
            analyze_interval_secs: 60,
            min_history: 10,
            window: 20,
            min_samples: 5,
            checkpoint_history: 50,
            learned_confidence: 0.50,
        }
    }
}

/// Top-level TaskMesh configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMeshConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Backend capability services.
    pub endpoints: Vec<EndpointConfig>,
    pub queue: QueueConfig,
    pub anticipation: AnticipationConfig,
    /// Name this process registers under as a queue worker.
    pub worker_name: String,
}

impl TaskMeshConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let port = env_or("PORT", 3010u16);

        let endpoints = vec![
            EndpointConfig::new(
                Capability::Voice,
                "Voice Service",
                &env_or("VOICE_SERVICE_URL", "http://voice:8001".to_string()),
            ),
            EndpointConfig::new(
                Capability::Image,
                "Image Service",
                &env_or("IMAGE_SERVICE_URL", "http://image:8002".to_string()),
            ),
            EndpointConfig::new(
                Capability::Code,
                "Code Service",
                &env_or("CODE_SERVICE_URL", "http://code:8003".to_string()),
            ),
            EndpointConfig::new(
                Capability::Search,
                "Search Service",
                &env_or("SEARCH_SERVICE_URL", "http://search:8004".to_string()),
            ),
        ];

        let queue = QueueConfig {
            retention_secs: env_or("TASK_RETENTION_SECS", 3600u64),
            ..QueueConfig::default()
        };

        let anticipation = AnticipationConfig {
            threshold: env_or("ANTICIPATION_THRESHOLD", 0.75f64).clamp(0.0, 1.0),
            ..AnticipationConfig::default()
        };

        let worker_name = env_or("WORKER_NAME", format!("worker-{}", std::process::id()));

        let data_paths = DataPaths::new(data_dir)?;

        Ok(Self {
            port,
            data_paths,
            endpoints,
            queue,
            anticipation,
            worker_name,
        })
    }

    /// Endpoint configuration for a capability, if registered.
    pub fn endpoint(&self, capability: Capability) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|e| e.capability == capability)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
