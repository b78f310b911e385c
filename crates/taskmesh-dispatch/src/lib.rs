//! TaskMesh Dispatch: the single entry point for introducing work and for
//! answering "what is the state of task X".

pub mod dispatcher;
pub mod types;

pub use dispatcher::Dispatcher;
pub use types::*;
