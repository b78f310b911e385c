//! TaskMesh server library: shared state and the HTTP router, split out of
//! the binary so handlers can be exercised without a socket.

pub mod routes;
pub mod state;

pub use state::AppState;
