//! TaskMesh Orchestrator: turns a task into calls against backend
//! capability services (voice, image, code, search).
//!
//! Composite tasks fan out to several services; one failing call never
//! aborts the others. Transport failures become failed sub-results at the
//! call site and are never thrown past `execute`.

pub mod orchestrator;
pub mod preload;
pub mod types;

pub use orchestrator::Orchestrator;
pub use types::*;
