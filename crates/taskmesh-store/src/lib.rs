//! TaskMesh Store: durable task metadata with expiry, plus the work-queue
//! broker (priority-weighted, delay-respecting, at-least-once).
//!
//! Both live behind traits so the dispatcher and the coordinating loop can
//! run against any backend; `SqliteStore` implements both on one database
//! file that any number of worker processes may share.

pub mod backend;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use backend::{Broker, MetadataStore};
pub use sqlite::SqliteStore;
pub use types::*;
