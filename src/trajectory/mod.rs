//! Pose sequences and the edits applied to them before conversion.

pub mod depth;
pub mod pose;
pub mod transform;

pub use depth::{DEFAULT_TARGET_SIZE, DepthSummary, ScaleSuggestion, scale_from_depth, summarize_depth};
pub use pose::{DepthStats, Direction, FrameId, Pose, PoseSequence};
pub use transform::{CompiledTransform, ScaleMode, TransformSpec, apply, reverse};
