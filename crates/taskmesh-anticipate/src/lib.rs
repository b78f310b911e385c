//! TaskMesh Anticipate: predicts which backend resources a task will need
//! and adjusts its patterns from observed outcomes.
//!
//! Prediction is synchronous and in-memory. Recalibration runs as a
//! background tokio task on a fixed interval; `shutdown` stops it and
//! writes the pattern table plus recent history to a JSON checkpoint.

pub mod checkpoint;
pub mod engine;
pub mod history;
pub mod patterns;

pub use checkpoint::{Checkpoint, PatternRecord};
pub use engine::{AnticipationEngine, OutcomeReport};
pub use history::{HistoryEntry, HistoryRing};
pub use patterns::{map_resource, seed_patterns, Pattern};
