pub mod batch;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod geometry;
pub mod io;
pub mod pipeline;
pub mod trajectory;

pub use config::PipelineConfig;
pub use error::{CampathError, ConventionError, Result};
pub use geometry::{Convention, FailurePolicy, FrameConverter};
pub use trajectory::{Direction, FrameId, Pose, PoseSequence, TransformSpec};
