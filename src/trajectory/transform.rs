//! Trajectory edits: axis flips, axis swaps, uniform scale and path reversal.
//!
//! All requested flips, swaps and the scale are compiled into one linear map
//! before any pose is touched, in a fixed order:
//!
//! ```text
//! M = s · F · W      W = swap_yz · swap_xy,   F = flip_z · flip_y · flip_x
//! ```
//!
//! i.e. swaps first, then flips, then scale. For every pose the camera center
//! `C` and the camera-to-world rotation `R` are updated as
//!
//! ```text
//! C' = s · Q · C          Q = F · W (orthogonal part)
//! R' = Q · R · Qᵀ
//! ```
//!
//! and the result is put back into the sequence's own direction. Edits keep the
//! convention; moving to another convention is the job of
//! [`FrameConverter`](crate::geometry::FrameConverter).
//!
//! Reversal is not a linear map. It only permutes poses and is applied after
//! the linear edit.

use std::collections::BTreeMap;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::depth::{scale_from_depth, DEFAULT_TARGET_SIZE};
use super::{Direction, Pose, PoseSequence};
use crate::error::{CampathError, Result};
use crate::geometry::rotation::similarity_transform;

#[rustfmt::skip]
fn swap_xy() -> Matrix3<f64> {
    Matrix3::new(
        0.0, 1.0, 0.0,
        1.0, 0.0, 0.0,
        0.0, 0.0, 1.0,
    )
}

#[rustfmt::skip]
fn swap_yz() -> Matrix3<f64> {
    Matrix3::new(
        1.0, 0.0, 0.0,
        0.0, 0.0, 1.0,
        0.0, 1.0, 0.0,
    )
}

/// How the path scale is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    /// No scaling.
    #[default]
    Unit,
    /// Multiply camera positions by this factor.
    Explicit(f64),
    /// Derive the factor from the sequence's depth channel.
    FromDepth { target_size: f64 },
}

/// A requested set of edits.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformSpec {
    pub flip_x: bool,
    pub flip_y: bool,
    pub flip_z: bool,
    pub swap_xy: bool,
    pub swap_yz: bool,
    pub scale: ScaleMode,
    pub reverse: bool,
}

impl TransformSpec {
    /// Build from loose command-line style options.
    ///
    /// `scale` and `scale_from_depth` (a target size) are mutually exclusive;
    /// passing both is a [`CampathError::ConfigConflict`].
    #[allow(clippy::too_many_arguments)]
    pub fn from_options(
        flip_x: bool,
        flip_y: bool,
        flip_z: bool,
        swap_xy: bool,
        swap_yz: bool,
        reverse: bool,
        scale: Option<f64>,
        scale_from_depth: Option<f64>,
    ) -> Result<Self> {
        let scale = match (scale, scale_from_depth) {
            (Some(s), Some(_)) => {
                return Err(CampathError::ConfigConflict(format!(
                    "explicit scale {} and scale-from-depth cannot both be given",
                    s
                )));
            }
            (Some(s), None) => ScaleMode::Explicit(s),
            (None, Some(target_size)) => ScaleMode::FromDepth { target_size },
            (None, None) => ScaleMode::Unit,
        };
        let spec = Self {
            flip_x,
            flip_y,
            flip_z,
            swap_xy,
            swap_yz,
            scale,
            reverse,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Layer `overrides` on top of `self`: flags are combined and a
    /// non-unit override scale replaces the base scale.
    ///
    /// An explicit scale on one side and scale-from-depth on the other is a
    /// [`CampathError::ConfigConflict`].
    pub fn merged_with(&self, overrides: &TransformSpec) -> Result<Self> {
        let scale = match (self.scale, overrides.scale) {
            (ScaleMode::Explicit(s), ScaleMode::FromDepth { .. })
            | (ScaleMode::FromDepth { .. }, ScaleMode::Explicit(s)) => {
                return Err(CampathError::ConfigConflict(format!(
                    "explicit scale {} and scale-from-depth cannot both be given",
                    s
                )));
            }
            (base, ScaleMode::Unit) => base,
            (_, other) => other,
        };
        let merged = Self {
            flip_x: self.flip_x || overrides.flip_x,
            flip_y: self.flip_y || overrides.flip_y,
            flip_z: self.flip_z || overrides.flip_z,
            swap_xy: self.swap_xy || overrides.swap_xy,
            swap_yz: self.swap_yz || overrides.swap_yz,
            scale,
            reverse: self.reverse || overrides.reverse,
        };
        merged.validate()?;
        Ok(merged)
    }

    /// Scale from depth with the default target size.
    pub fn scale_from_depth_default() -> ScaleMode {
        ScaleMode::FromDepth {
            target_size: DEFAULT_TARGET_SIZE,
        }
    }

    /// Reject option values that can never work, before any pose is touched.
    pub fn validate(&self) -> Result<()> {
        match self.scale {
            ScaleMode::Explicit(s) if !(s.is_finite() && s > 0.0) => Err(
                CampathError::InvalidOption(format!("scale must be positive, got {}", s)),
            ),
            ScaleMode::FromDepth { target_size } if !(target_size.is_finite() && target_size > 0.0) => {
                Err(CampathError::InvalidOption(format!(
                    "target size must be positive, got {}",
                    target_size
                )))
            }
            _ => Ok(()),
        }
    }

    /// Orthogonal part `Q = F · W` of the edit.
    pub fn orthogonal_part(&self) -> Matrix3<f64> {
        let mut w = Matrix3::identity();
        if self.swap_xy {
            w = swap_xy() * w;
        }
        if self.swap_yz {
            w = swap_yz() * w;
        }
        let flip = Vector3::new(
            if self.flip_x { -1.0 } else { 1.0 },
            if self.flip_y { -1.0 } else { 1.0 },
            if self.flip_z { -1.0 } else { 1.0 },
        );
        Matrix3::from_diagonal(&flip) * w
    }

    /// True when the edit leaves every pose unchanged.
    pub fn is_identity(&self) -> bool {
        !(self.flip_x || self.flip_y || self.flip_z || self.swap_xy || self.swap_yz || self.reverse)
            && matches!(self.scale, ScaleMode::Unit)
    }

    /// Resolve the scale and build the single linear map for `seq`.
    pub fn compile(&self, seq: &PoseSequence) -> Result<CompiledTransform> {
        self.validate()?;
        let scale = match self.scale {
            ScaleMode::Unit => 1.0,
            ScaleMode::Explicit(s) => s,
            ScaleMode::FromDepth { target_size } => {
                let suggestion = scale_from_depth(seq.depth(), target_size)?;
                info!(
                    "Using scale from depth: {:.6} (mean depth {:.4}, target {})",
                    suggestion.scale, suggestion.summary.mean_of_means, target_size
                );
                suggestion.scale
            }
        };
        Ok(CompiledTransform {
            orthogonal: self.orthogonal_part(),
            scale,
            reverse: self.reverse,
        })
    }
}

/// A [`TransformSpec`] with its scale resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompiledTransform {
    pub orthogonal: Matrix3<f64>,
    pub scale: f64,
    pub reverse: bool,
}

impl CompiledTransform {
    /// Apply the linear part to one pose, keeping its direction.
    pub fn apply_pose(&self, pose: &Pose) -> Pose {
        let center = self.scale * (self.orthogonal * pose.camera_center());
        let rotation = similarity_transform(&self.orthogonal, &pose.rotation_c2w());
        let c2w = Pose {
            frame_id: pose.frame_id,
            rotation,
            translation: center,
            convention: pose.convention,
            direction: Direction::CameraToWorld,
        };
        c2w.with_direction(pose.direction)
    }

    /// Apply to a whole sequence: linear edit first, reversal after.
    pub fn apply(&self, seq: &PoseSequence) -> PoseSequence {
        let poses = seq.iter().map(|p| self.apply_pose(p)).collect();
        let edited = PoseSequence::from_parts(
            seq.convention(),
            seq.direction(),
            poses,
            seq.depth().clone(),
        );
        if self.reverse {
            reverse(&edited)
        } else {
            edited
        }
    }
}

/// Apply `spec` to `seq`, producing a new sequence in the same convention.
pub fn apply(seq: &PoseSequence, spec: &TransformSpec) -> Result<PoseSequence> {
    let compiled = spec.compile(seq)?;
    let out = compiled.apply(seq);
    info!(
        "Transformed {} poses (scale {:.6}, reversed: {})",
        out.len(),
        compiled.scale,
        compiled.reverse
    );
    Ok(out)
}

/// Reverse the pose order without touching any pose's numbers.
///
/// The ascending frame-id list of the input is kept and handed to the reversed
/// poses, so ids stay strictly increasing and reversing twice restores both
/// order and labels. Depth statistics travel with their pose.
pub fn reverse(seq: &PoseSequence) -> PoseSequence {
    let ids = seq.frame_ids();
    let mut depth = BTreeMap::new();
    let poses = seq
        .iter()
        .rev()
        .zip(ids)
        .map(|(pose, new_id)| {
            if let Some(d) = seq.depth().get(&pose.frame_id) {
                depth.insert(new_id, *d);
            }
            Pose {
                frame_id: new_id,
                ..pose.clone()
            }
        })
        .collect();
    PoseSequence::from_parts(seq.convention(), seq.direction(), poses, depth)
}
