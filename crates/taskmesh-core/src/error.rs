//! Error types for TaskMesh.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown task category: {0}")]
    UnknownCategory(String),

    #[error("Invalid priority: {0}")]
    InvalidPriority(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller supplied bad input (rejected before side effects).
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::UnknownCategory(_) | Self::InvalidPriority(_))
    }

    /// Whether the error means queue, store or endpoint could not be reached.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
