pub mod checkpoint;
pub mod tracker;

pub use checkpoint::{CheckpointError, CheckpointStore};
pub use tracker::{PositionTracker, SourcePosition, TrackerError};
