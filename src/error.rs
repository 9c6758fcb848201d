//! Error types for trajectory conversion.
//!
//! Every failure in the core is a value carrying the kind of problem and, where
//! one exists, the frame it concerns. Nothing here is transient, so callers
//! never need to retry.

use thiserror::Error;

use crate::geometry::Convention;
use crate::trajectory::{Direction, FrameId};

/// Problems with convention / direction tags or with a basis matrix.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConventionError {
    #[error("unknown convention '{0}' (expected sfm, engine or content)")]
    Unknown(String),

    #[error("unknown pose direction '{0}' (expected w2c or c2w)")]
    UnknownDirection(String),

    #[error("frame {frame_id}: pose tagged {found:?}/{found_direction:?} in a {expected:?}/{expected_direction:?} sequence")]
    Mismatch {
        frame_id: FrameId,
        expected: Convention,
        expected_direction: Direction,
        found: Convention,
        found_direction: Direction,
    },

    #[error("basis '{name}' is not orthogonal (|MᵀM - I| = {error:.3e})")]
    NonOrthogonalBasis { name: String, error: f64 },

    #[error("no basis chain from {from:?} to {to:?}")]
    NoPath { from: Convention, to: Convention },
}

/// Top-level error for the conversion core.
#[derive(Error, Debug)]
pub enum CampathError {
    #[error("malformed pose at frame {frame_id}: {reason}")]
    MalformedPose { frame_id: FrameId, reason: String },

    #[error("convention error: {0}")]
    Convention(#[from] ConventionError),

    #[error("conflicting options: {0}")]
    ConfigConflict(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("missing auxiliary data: {0}")]
    MissingAuxData(String),

    #[error("invalid depth statistics: {0}")]
    InvalidDepth(String),
}

impl CampathError {
    pub fn malformed(frame_id: FrameId, reason: impl Into<String>) -> Self {
        CampathError::MalformedPose {
            frame_id,
            reason: reason.into(),
        }
    }

    /// Frame implicated by this error, if any.
    pub fn frame_id(&self) -> Option<FrameId> {
        match self {
            CampathError::MalformedPose { frame_id, .. } => Some(*frame_id),
            CampathError::Convention(ConventionError::Mismatch { frame_id, .. }) => Some(*frame_id),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CampathError>;
