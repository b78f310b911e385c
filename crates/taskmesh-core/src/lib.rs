//! TaskMesh Core: task vocabulary, configuration, error type.

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use config::{AnticipationConfig, DataPaths, EndpointConfig, QueueConfig, TaskMeshConfig};
pub use error::{Error, Result};
pub use types::*;
