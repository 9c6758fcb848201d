//! Coordinate conventions and conversions between them.
//!
//! Camera trajectories come out of structure-from-motion in one convention and
//! have to be keyed in a game engine or a content-creation tool that each use a
//! different one. This module owns the fixed basis matrices between the three
//! conventions and the per-pose conversion built on top of them.
//!
//! # Conventions
//!
//! ## SfM (COLMAP, right-handed)
//! ```text
//!        +Y (down)
//!         |
//!         |
//!         +------ +X (right)
//!        /
//!       /
//!      +Z (forward, optical axis)
//! ```
//! Poses are stored world-to-camera: `p_cam = R · p_world + t`.
//!
//! ## Engine (Unreal Engine 5, left-handed)
//! ```text
//!        +Z (up)
//!         |
//!         |
//!         +------ +Y (right)
//!        /
//!       /
//!      +X (forward)
//! ```
//! A camera actor looks along its local +X with local +Z up.
//!
//! ## Content tool (Blender, right-handed)
//! ```text
//!        +Z (up)
//!         |   +Y (forward)
//!         |  /
//!         | /
//!         +------ +X (right)
//! ```
//! A camera object looks along its local **-Z** with local +Y up. This is not
//! something a world-axis basis change can express, so converting into this
//! convention needs an extra camera-axis step (see [`content_camera_axes`]).
//!
//! # Conversion pipeline
//!
//! ```text
//! Pose (any convention, any direction)
//!     │
//!     ▼ camera center C, camera-to-world R
//!     │
//!     ▼ for each basis hop M:  C ← M · C,  R ← M · R · Mᵀ
//!     │
//!     ▼ content tool only: columns [right, up, -forward]
//!     │
//! Pose (target convention, camera-to-world)
//! ```
//!
//! The camera-to-world rotation is re-expressed with the similarity transform
//! `M · R · Mᵀ`. The left factor relabels the world axes, the right factor
//! relabels the camera's own local axes, so for SfM → engine the columns of
//! `R` come out as the camera's `[forward, right, up]` in engine world.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::rotation::similarity_transform;
use crate::error::{CampathError, ConventionError, Result};
use crate::trajectory::{Direction, FrameId, Pose, PoseSequence};

/// Tolerance on `‖MᵀM - I‖` for a basis matrix.
const BASIS_TOLERANCE: f64 = 1e-9;

/// The coordinate conventions a pose can be expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Convention {
    /// Structure-from-motion output: X right, Y down, Z forward.
    #[serde(alias = "colmap")]
    Sfm,
    /// Game engine: X forward, Y right, Z up (left-handed).
    #[serde(alias = "ue", alias = "ue5")]
    Engine,
    /// Content-creation tool: X right, Y forward, Z up; cameras look along -Z.
    #[serde(alias = "content", alias = "blender")]
    ContentTool,
}

impl Convention {
    pub const ALL: [Convention; 3] = [Convention::Sfm, Convention::Engine, Convention::ContentTool];

    pub fn name(self) -> &'static str {
        match self {
            Convention::Sfm => "sfm",
            Convention::Engine => "engine",
            Convention::ContentTool => "content",
        }
    }
}

impl fmt::Display for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Convention {
    type Err = ConventionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sfm" | "colmap" => Ok(Convention::Sfm),
            "engine" | "ue" | "ue5" | "unreal" => Ok(Convention::Engine),
            "content" | "content_tool" | "content-tool" | "blender" => Ok(Convention::ContentTool),
            other => Err(ConventionError::Unknown(other.to_string())),
        }
    }
}

// ============================================================================
// Basis Matrices Between Conventions
// ============================================================================

/// A fixed orthogonal change of basis `p_to = M · p_from`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConventionBasis {
    pub name: String,
    pub from: Convention,
    pub to: Convention,
    matrix: Matrix3<f64>,
}

impl ConventionBasis {
    /// Create a basis, rejecting matrices that are not orthogonal.
    pub fn new(
        name: impl Into<String>,
        from: Convention,
        to: Convention,
        matrix: Matrix3<f64>,
    ) -> std::result::Result<Self, ConventionError> {
        let name = name.into();
        let error = (matrix.transpose() * matrix - Matrix3::identity()).norm();
        if !error.is_finite() || error > BASIS_TOLERANCE {
            return Err(ConventionError::NonOrthogonalBasis { name, error });
        }
        Ok(Self {
            name,
            from,
            to,
            matrix,
        })
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// The reverse change of basis (transpose, tags swapped).
    pub fn inverse(&self) -> Self {
        Self {
            name: format!("{}^-1", self.name),
            from: self.to,
            to: self.from,
            matrix: self.matrix.transpose(),
        }
    }

    /// True when the basis flips handedness.
    pub fn is_reflection(&self) -> bool {
        self.matrix.determinant() < 0.0
    }
}

/// SfM → engine axis remap.
///
/// This maps:
/// - SfM +Z (forward) → Engine +X (forward)
/// - SfM +X (right)   → Engine +Y (right)
/// - SfM +Y (down)    → Engine -Z (up)
#[rustfmt::skip]
pub fn rotation_engine_sfm() -> Matrix3<f64> {
    Matrix3::new(
        0.0,  0.0, 1.0,  // Engine X = SfM Z
        1.0,  0.0, 0.0,  // Engine Y = SfM X
        0.0, -1.0, 0.0,  // Engine Z = -SfM Y
    )
}

/// Engine → content-tool world axis remap (swap forward and right).
#[rustfmt::skip]
pub fn rotation_content_engine() -> Matrix3<f64> {
    Matrix3::new(
        0.0, 1.0, 0.0,  // Content X (right)   = Engine Y
        1.0, 0.0, 0.0,  // Content Y (forward) = Engine X
        0.0, 0.0, 1.0,  // Content Z (up)      = Engine Z
    )
}

pub fn basis_engine_sfm() -> ConventionBasis {
    ConventionBasis::new(
        "engine_from_sfm",
        Convention::Sfm,
        Convention::Engine,
        rotation_engine_sfm(),
    )
    .expect("engine_from_sfm is a signed permutation")
}

pub fn basis_content_engine() -> ConventionBasis {
    ConventionBasis::new(
        "content_from_engine",
        Convention::Engine,
        Convention::ContentTool,
        rotation_content_engine(),
    )
    .expect("content_from_engine is a permutation")
}

// ============================================================================
// Content-Tool Camera Axes
// ============================================================================

/// Reorder camera-to-world columns from `[right, forward, up]` to
/// `[right, up, -forward]`.
///
/// After the world basis change a content-tool camera rotation still has the
/// generic right/forward/up column layout. Content-tool cameras look along the
/// negative of their third local axis, so column 1 (forward) moves to column 2
/// negated and column 2 (up) moves to column 1. Skipping this step gives a
/// valid rotation that points the camera the wrong way.
pub fn content_camera_axes(r: &Matrix3<f64>) -> Matrix3<f64> {
    let right = r.column(0).into_owned();
    let forward = r.column(1).into_owned();
    let up = r.column(2).into_owned();
    Matrix3::from_columns(&[right, up, -forward])
}

/// Inverse of [`content_camera_axes`]: `[right, up, back]` → `[right, forward, up]`.
pub fn content_camera_axes_inverse(r: &Matrix3<f64>) -> Matrix3<f64> {
    let right = r.column(0).into_owned();
    let up = r.column(1).into_owned();
    let back = r.column(2).into_owned();
    Matrix3::from_columns(&[right, -back, up])
}

// ============================================================================
// Frame Converter
// ============================================================================

/// What to do with a frame that fails to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first bad frame and return its error.
    #[default]
    Abort,
    /// Drop the frame, log it and record it in the report.
    SkipFrame,
}

/// Outcome of converting a whole sequence.
#[derive(Debug)]
pub struct ConversionReport {
    pub sequence: PoseSequence,
    pub skipped: Vec<CampathError>,
}

/// Converts poses between conventions using injected basis matrices.
#[derive(Debug, Clone)]
pub struct FrameConverter {
    bases: Vec<ConventionBasis>,
    /// Multiplies camera positions when leaving SfM (e.g. 100 for m → cm).
    position_scale: f64,
}

impl FrameConverter {
    /// Create a converter from explicit bases.
    pub fn new(sfm_to_engine: ConventionBasis, engine_to_content: ConventionBasis) -> Self {
        Self {
            bases: vec![sfm_to_engine, engine_to_content],
            position_scale: 1.0,
        }
    }

    /// Converter with the standard SfM / engine / content-tool bases.
    pub fn standard() -> Self {
        Self::new(basis_engine_sfm(), basis_content_engine())
    }

    /// Scale applied to positions when converting out of SfM units.
    ///
    /// The scale must be finite and positive.
    pub fn with_position_scale(mut self, scale: f64) -> Result<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(CampathError::InvalidOption(format!(
                "position scale must be positive, got {}",
                scale
            )));
        }
        self.position_scale = scale;
        Ok(self)
    }

    pub fn position_scale(&self) -> f64 {
        self.position_scale
    }

    /// Chain of bases taking `from` to `to` (empty when equal).
    pub fn basis_chain(
        &self,
        from: Convention,
        to: Convention,
    ) -> std::result::Result<Vec<ConventionBasis>, ConventionError> {
        if from == to {
            return Ok(Vec::new());
        }
        let edges: Vec<ConventionBasis> = self
            .bases
            .iter()
            .flat_map(|b| [b.clone(), b.inverse()])
            .collect();

        // Breadth-first search over conventions, keeping the edge used to reach each.
        let mut came_from: Vec<(Convention, usize)> = Vec::new();
        let mut queue = VecDeque::from([from]);
        let mut seen = vec![from];
        while let Some(current) = queue.pop_front() {
            if current == to {
                break;
            }
            for (i, edge) in edges.iter().enumerate() {
                if edge.from == current && !seen.contains(&edge.to) {
                    seen.push(edge.to);
                    came_from.push((edge.to, i));
                    queue.push_back(edge.to);
                }
            }
        }

        let mut chain = Vec::new();
        let mut node = to;
        while node != from {
            let (_, i) = came_from
                .iter()
                .find(|(c, _)| *c == node)
                .ok_or(ConventionError::NoPath { from, to })?;
            chain.push(edges[*i].clone());
            node = edges[*i].from;
        }
        chain.reverse();
        Ok(chain)
    }

    /// Convert one pose into `to`. The result is always camera-to-world.
    ///
    /// The input is validated first; a non-orthonormal rotation or a
    /// non-finite value is a [`CampathError::MalformedPose`].
    pub fn convert_pose(&self, pose: &Pose, to: Convention) -> Result<Pose> {
        pose.validate()?;
        let chain = self.basis_chain(pose.convention, to)?;

        let mut center = pose.camera_center();
        let mut rotation = pose.rotation_c2w();
        if pose.convention == Convention::ContentTool && to != Convention::ContentTool {
            rotation = content_camera_axes_inverse(&rotation);
        }

        for basis in &chain {
            center = basis.matrix() * center;
            rotation = similarity_transform(basis.matrix(), &rotation);
        }

        if to == Convention::ContentTool && pose.convention != Convention::ContentTool {
            rotation = content_camera_axes(&rotation);
        }

        center = self.rescale(center, pose.convention, to);

        Ok(Pose {
            frame_id: pose.frame_id,
            rotation,
            translation: center,
            convention: to,
            direction: Direction::CameraToWorld,
        })
    }

    /// Convert and then express the result in `direction`.
    pub fn convert_pose_with_direction(
        &self,
        pose: &Pose,
        to: Convention,
        direction: Direction,
    ) -> Result<Pose> {
        Ok(self.convert_pose(pose, to)?.with_direction(direction))
    }

    /// Convert a whole sequence, handling bad frames according to `policy`.
    pub fn convert_sequence(
        &self,
        seq: &PoseSequence,
        to: Convention,
        policy: FailurePolicy,
    ) -> Result<ConversionReport> {
        // Fail fast on a missing chain rather than once per frame.
        self.basis_chain(seq.convention(), to)?;

        let mut poses = Vec::with_capacity(seq.len());
        let mut skipped = Vec::new();
        for pose in seq {
            match self.convert_pose(pose, to) {
                Ok(p) => poses.push(p),
                Err(e) if policy == FailurePolicy::SkipFrame => {
                    warn!("Skipping frame {}: {}", pose.frame_id, e);
                    skipped.push(e);
                }
                Err(e) => return Err(e),
            }
        }

        let kept: BTreeSet<FrameId> = poses.iter().map(|p| p.frame_id).collect();
        let depth = seq
            .depth()
            .iter()
            .filter(|(id, _)| kept.contains(id))
            .map(|(id, d)| (*id, *d))
            .collect();

        debug!(
            "Converted {} poses {} -> {} ({} skipped)",
            poses.len(),
            seq.convention(),
            to,
            skipped.len()
        );

        Ok(ConversionReport {
            sequence: PoseSequence::from_parts(to, Direction::CameraToWorld, poses, depth),
            skipped,
        })
    }

    fn rescale(&self, center: Vector3<f64>, from: Convention, to: Convention) -> Vector3<f64> {
        match (from == Convention::Sfm, to == Convention::Sfm) {
            (true, false) => center * self.position_scale,
            (false, true) => center / self.position_scale,
            _ => center,
        }
    }
}

impl Default for FrameConverter {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::DepthStats;
    use crate::geometry::rotation::{is_rotation, quat_to_matrix};
    use approx::assert_relative_eq;

    fn sfm_pose(q: [f64; 4], t: Vector3<f64>) -> Pose {
        Pose::from_quaternion(
            FrameId::new(0),
            q,
            t,
            Convention::Sfm,
            Direction::WorldToCamera,
        )
        .unwrap()
    }

    #[test]
    fn test_standard_bases_are_orthogonal() {
        for basis in [basis_engine_sfm(), basis_content_engine()] {
            let checked =
                ConventionBasis::new(basis.name.clone(), basis.from, basis.to, *basis.matrix());
            assert!(checked.is_ok());
            assert!(basis.is_reflection());
        }
    }

    #[test]
    fn test_non_orthogonal_basis_rejected() {
        let m = Matrix3::new(1.0, 0.1, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        let err = ConventionBasis::new("skewed", Convention::Sfm, Convention::Engine, m);
        assert!(matches!(
            err,
            Err(ConventionError::NonOrthogonalBasis { .. })
        ));
    }

    #[test]
    fn test_convention_parse() {
        assert_eq!("COLMAP".parse::<Convention>().unwrap(), Convention::Sfm);
        assert_eq!("ue5".parse::<Convention>().unwrap(), Convention::Engine);
        assert_eq!(
            "blender".parse::<Convention>().unwrap(),
            Convention::ContentTool
        );
        assert_eq!(
            "maya".parse::<Convention>(),
            Err(ConventionError::Unknown("maya".to_string()))
        );
    }

    #[test]
    fn test_identity_camera_looks_forward_in_engine() {
        let converter = FrameConverter::standard();
        let pose = sfm_pose([1.0, 0.0, 0.0, 0.0], Vector3::zeros());
        let ue = converter.convert_pose(&pose, Convention::Engine).unwrap();

        // Columns are [forward, right, up] of the camera in engine world.
        assert_relative_eq!(ue.rotation, Matrix3::identity(), epsilon = 1e-12);
        assert_eq!(ue.direction, Direction::CameraToWorld);
        assert_eq!(ue.convention, Convention::Engine);
    }

    #[test]
    fn test_content_camera_looks_along_negative_z() {
        let converter = FrameConverter::standard();
        let pose = sfm_pose([1.0, 0.0, 0.0, 0.0], Vector3::zeros());
        let out = converter
            .convert_pose(&pose, Convention::ContentTool)
            .unwrap();

        // The SfM camera looks along world +Z(sfm) = engine +X = content +Y.
        let view_dir = -out.rotation.column(2).into_owned();
        assert_relative_eq!(view_dir, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
        // Its up (SfM -Y) is content +Z.
        assert_relative_eq!(
            out.rotation.column(1).into_owned(),
            Vector3::z(),
            epsilon = 1e-12
        );
        assert!(is_rotation(&out.rotation, 1e-9));
    }

    #[test]
    fn test_content_camera_axes_is_not_a_basis_change() {
        let r = quat_to_matrix([0.9, 0.2, 0.3, -0.1]).unwrap();
        let reordered = content_camera_axes(&r);
        assert!(is_rotation(&reordered, 1e-9));
        assert!((reordered - r).norm() > 1e-3);
        assert_relative_eq!(
            content_camera_axes_inverse(&reordered),
            r,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_position_follows_axis_remap() {
        let converter = FrameConverter::standard().with_position_scale(100.0).unwrap();
        // Camera center at SfM (1, 2, 3): t = -R·C with R = I.
        let pose = sfm_pose([1.0, 0.0, 0.0, 0.0], Vector3::new(-1.0, -2.0, -3.0));
        let ue = converter.convert_pose(&pose, Convention::Engine).unwrap();
        assert_relative_eq!(
            ue.translation,
            Vector3::new(300.0, 100.0, -200.0),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_roundtrip_through_every_convention() {
        let converter = FrameConverter::standard().with_position_scale(100.0).unwrap();
        let pose = sfm_pose([0.7, 0.1, -0.5, 0.3], Vector3::new(0.4, -1.2, 2.5));

        for via in Convention::ALL {
            let there = converter.convert_pose(&pose, via).unwrap();
            let back = converter
                .convert_pose_with_direction(&there, Convention::Sfm, Direction::WorldToCamera)
                .unwrap();
            assert_relative_eq!(back.rotation, pose.rotation, epsilon = 1e-9);
            assert_relative_eq!(back.translation, pose.translation, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_engine_and_content_paths_agree() {
        let converter = FrameConverter::standard();
        let pose = sfm_pose([0.6, -0.2, 0.7, 0.1], Vector3::new(1.0, 0.5, -0.25));
        let direct = converter
            .convert_pose(&pose, Convention::ContentTool)
            .unwrap();
        let via_engine = converter
            .convert_pose(
                &converter.convert_pose(&pose, Convention::Engine).unwrap(),
                Convention::ContentTool,
            )
            .unwrap();
        assert_relative_eq!(direct.rotation, via_engine.rotation, epsilon = 1e-12);
        assert_relative_eq!(direct.translation, via_engine.translation, epsilon = 1e-12);
    }

    #[test]
    fn test_convert_pose_does_not_mutate_and_is_deterministic() {
        let converter = FrameConverter::standard();
        let pose = sfm_pose([0.8, 0.0, 0.6, 0.0], Vector3::new(1.0, 2.0, 3.0));
        let copy = pose.clone();
        let a = converter.convert_pose(&pose, Convention::Engine).unwrap();
        let b = converter.convert_pose(&pose, Convention::Engine).unwrap();
        assert_eq!(a, b);
        assert_eq!(pose, copy);
    }

    #[test]
    fn test_malformed_rotation_rejected() {
        let converter = FrameConverter::standard();
        let mut pose = sfm_pose([1.0, 0.0, 0.0, 0.0], Vector3::zeros());
        pose.rotation[(0, 1)] = 0.5;
        assert!(matches!(
            converter.convert_pose(&pose, Convention::Engine),
            Err(CampathError::MalformedPose { .. })
        ));
    }

    #[test]
    fn test_missing_basis_reports_no_path() {
        let only_sfm = FrameConverter {
            bases: vec![basis_engine_sfm()],
            position_scale: 1.0,
        };
        let err = only_sfm
            .basis_chain(Convention::Sfm, Convention::ContentTool)
            .unwrap_err();
        assert_eq!(
            err,
            ConventionError::NoPath {
                from: Convention::Sfm,
                to: Convention::ContentTool
            }
        );
    }

    #[test]
    fn test_convert_sequence_skip_policy() {
        let converter = FrameConverter::standard();
        let good = sfm_pose([1.0, 0.0, 0.0, 0.0], Vector3::zeros());
        let mut bad = good.clone();
        bad.frame_id = FrameId::new(1);
        let mut seq_poses = vec![good.clone(), bad];
        let seq = PoseSequence::new(Convention::Sfm, Direction::WorldToCamera, seq_poses.clone())
            .unwrap();

        // Corrupt after validation to simulate upstream drift.
        seq_poses[1].rotation[(2, 2)] = 3.0;
        let corrupted = PoseSequence::from_parts(
            Convention::Sfm,
            Direction::WorldToCamera,
            seq_poses,
            Default::default(),
        );

        let ok = converter
            .convert_sequence(&seq, Convention::Engine, FailurePolicy::Abort)
            .unwrap();
        assert_eq!(ok.sequence.len(), 2);

        assert!(converter
            .convert_sequence(&corrupted, Convention::Engine, FailurePolicy::Abort)
            .is_err());
        let report = converter
            .convert_sequence(&corrupted, Convention::Engine, FailurePolicy::SkipFrame)
            .unwrap();
        assert_eq!(report.sequence.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].frame_id(), Some(FrameId::new(1)));
    }

    #[test]
    fn test_position_scale_must_be_positive() {
        for scale in [0.0, -100.0, f64::NAN, f64::INFINITY] {
            let err = FrameConverter::standard().with_position_scale(scale).unwrap_err();
            assert!(matches!(err, CampathError::InvalidOption(_)));
        }
        let converter = FrameConverter::standard().with_position_scale(100.0).unwrap();
        assert_relative_eq!(converter.position_scale(), 100.0);
    }

    #[test]
    fn test_skipped_frames_drop_their_depth() {
        let converter = FrameConverter::standard();
        let mut poses: Vec<Pose> = (0..3)
            .map(|i| {
                let mut p = sfm_pose([1.0, 0.0, 0.0, 0.0], Vector3::new(0.0, 0.0, i as f64));
                p.frame_id = FrameId::new(i);
                p
            })
            .collect();
        poses[1].translation.x = f64::NAN;
        let depth = (0..3)
            .map(|i| {
                let d = DepthStats {
                    min: 1.0,
                    max: 3.0,
                    mean: 2.0,
                    median: 2.0,
                };
                (FrameId::new(i), d)
            })
            .collect();
        let seq = PoseSequence::from_parts(Convention::Sfm, Direction::WorldToCamera, poses, depth);

        let report = converter
            .convert_sequence(&seq, Convention::Engine, FailurePolicy::SkipFrame)
            .unwrap();
        let ids: Vec<FrameId> = report.sequence.depth().keys().copied().collect();
        assert_eq!(ids, vec![FrameId::new(0), FrameId::new(2)]);
    }
}
