//! Runtime coordinator: the worker loop tying dispatcher, orchestrator and
//! anticipation engine together.
//!
//! Each cycle: heartbeat, reserve one entry, mark it running, predict and
//! preload resources, execute, store the outcome, then feed the resources
//! actually used back to the anticipation engine.

pub mod coordinator;
pub mod types;

pub use coordinator::Coordinator;
pub use types::*;
