//! Pose and pose sequence types.
//!
//! A [`PoseSequence`] is the unit of work for everything in this crate. It is
//! built once by a loader, then every edit or conversion produces a new
//! sequence; the input is never touched.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{CampathError, ConventionError, Result};
use crate::geometry::rotation::{
    camera_center, direction_invert, is_rotation, matrix_to_quat, orthonormality_error,
    quat_to_matrix, ORTHONORMAL_TOLERANCE,
};
use crate::geometry::Convention;

/// Frame index of a pose within its sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameId(pub u64);

impl FrameId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// Which way a pose maps points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// `p_cam = R · p_world + t` (what SfM tools store).
    WorldToCamera,
    /// `p_world = R · p_cam + t`; `t` is the camera position.
    CameraToWorld,
}

impl FromStr for Direction {
    type Err = ConventionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "w2c" | "world_to_camera" | "world-to-camera" => Ok(Direction::WorldToCamera),
            "c2w" | "camera_to_world" | "camera-to-world" => Ok(Direction::CameraToWorld),
            other => Err(ConventionError::UnknownDirection(other.to_string())),
        }
    }
}

/// One rigid camera pose at one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub frame_id: FrameId,
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    pub convention: Convention,
    pub direction: Direction,
}

impl Pose {
    pub fn new(
        frame_id: FrameId,
        rotation: Matrix3<f64>,
        translation: Vector3<f64>,
        convention: Convention,
        direction: Direction,
    ) -> Self {
        Self {
            frame_id,
            rotation,
            translation,
            convention,
            direction,
        }
    }

    /// Build a pose from a `[w, x, y, z]` quaternion and translation.
    pub fn from_quaternion(
        frame_id: FrameId,
        q: [f64; 4],
        translation: Vector3<f64>,
        convention: Convention,
        direction: Direction,
    ) -> Result<Self> {
        let rotation =
            quat_to_matrix(q).map_err(|e| CampathError::malformed(frame_id, e.to_string()))?;
        let pose = Self::new(frame_id, rotation, translation, convention, direction);
        pose.validate()?;
        Ok(pose)
    }

    /// Rotation as a unit `[w, x, y, z]` quaternion with `w >= 0`.
    pub fn quaternion(&self) -> [f64; 4] {
        matrix_to_quat(&self.rotation)
    }

    /// Check for non-finite values and a non-orthonormal rotation.
    pub fn validate(&self) -> Result<()> {
        if self.translation.iter().any(|v| !v.is_finite()) {
            return Err(CampathError::malformed(
                self.frame_id,
                "translation has non-finite components",
            ));
        }
        if self.rotation.iter().any(|v| !v.is_finite()) {
            return Err(CampathError::malformed(
                self.frame_id,
                "rotation has non-finite components",
            ));
        }
        if !is_rotation(&self.rotation, ORTHONORMAL_TOLERANCE) {
            return Err(CampathError::malformed(
                self.frame_id,
                format!(
                    "rotation is not a proper rotation (|RᵀR - I| = {:.3e}, det = {:.6})",
                    orthonormality_error(&self.rotation),
                    self.rotation.determinant()
                ),
            ));
        }
        Ok(())
    }

    /// Camera position in world coordinates of this pose's convention.
    pub fn camera_center(&self) -> Vector3<f64> {
        match self.direction {
            Direction::WorldToCamera => camera_center(&self.rotation, &self.translation),
            Direction::CameraToWorld => self.translation,
        }
    }

    /// Camera-to-world rotation (columns are the camera axes in world).
    pub fn rotation_c2w(&self) -> Matrix3<f64> {
        match self.direction {
            Direction::WorldToCamera => self.rotation.transpose(),
            Direction::CameraToWorld => self.rotation,
        }
    }

    /// Same pose expressed in `direction`. Returns a copy when already there.
    pub fn with_direction(&self, direction: Direction) -> Self {
        if self.direction == direction {
            return self.clone();
        }
        let (rotation, translation) = direction_invert(&self.rotation, &self.translation);
        Self {
            rotation,
            translation,
            direction,
            ..self.clone()
        }
    }
}

/// Per-frame scene depth statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

/// Ordered poses sharing one convention and one direction.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseSequence {
    convention: Convention,
    direction: Direction,
    poses: Vec<Pose>,
    depth: BTreeMap<FrameId, DepthStats>,
}

impl PoseSequence {
    /// Build a sequence, checking tags, pose validity and frame ordering.
    pub fn new(convention: Convention, direction: Direction, poses: Vec<Pose>) -> Result<Self> {
        let mut prev: Option<FrameId> = None;
        for pose in &poses {
            if pose.convention != convention || pose.direction != direction {
                return Err(ConventionError::Mismatch {
                    frame_id: pose.frame_id,
                    expected: convention,
                    expected_direction: direction,
                    found: pose.convention,
                    found_direction: pose.direction,
                }
                .into());
            }
            pose.validate()?;
            if let Some(p) = prev {
                if pose.frame_id <= p {
                    return Err(CampathError::malformed(
                        pose.frame_id,
                        format!("frame ids must strictly increase (previous {})", p),
                    ));
                }
            }
            prev = Some(pose.frame_id);
        }

        Ok(Self {
            convention,
            direction,
            poses,
            depth: BTreeMap::new(),
        })
    }

    /// Attach a depth statistics channel keyed by frame id.
    pub fn with_depth(mut self, depth: BTreeMap<FrameId, DepthStats>) -> Self {
        self.depth = depth;
        self
    }

    /// Internal constructor for outputs built from an already validated sequence.
    pub(crate) fn from_parts(
        convention: Convention,
        direction: Direction,
        poses: Vec<Pose>,
        depth: BTreeMap<FrameId, DepthStats>,
    ) -> Self {
        Self {
            convention,
            direction,
            poses,
            depth,
        }
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pose> {
        self.poses.iter()
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn frame_ids(&self) -> Vec<FrameId> {
        self.poses.iter().map(|p| p.frame_id).collect()
    }

    /// Pose with the given frame id (binary search; ids are sorted).
    pub fn get(&self, frame_id: FrameId) -> Option<&Pose> {
        self.poses
            .binary_search_by_key(&frame_id, |p| p.frame_id)
            .ok()
            .map(|i| &self.poses[i])
    }

    pub fn depth(&self) -> &BTreeMap<FrameId, DepthStats> {
        &self.depth
    }

    /// The whole sequence in `direction`.
    pub fn with_direction(&self, direction: Direction) -> Self {
        Self {
            convention: self.convention,
            direction,
            poses: self.poses.iter().map(|p| p.with_direction(direction)).collect(),
            depth: self.depth.clone(),
        }
    }

    /// Camera centers in frame order.
    pub fn camera_centers(&self) -> Vec<Vector3<f64>> {
        self.poses.iter().map(|p| p.camera_center()).collect()
    }
}

impl<'a> IntoIterator for &'a PoseSequence {
    type Item = &'a Pose;
    type IntoIter = std::slice::Iter<'a, Pose>;

    fn into_iter(self) -> Self::IntoIter {
        self.poses.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sfm_pose(id: u64, t: Vector3<f64>) -> Pose {
        Pose::new(
            FrameId::new(id),
            Matrix3::identity(),
            t,
            Convention::Sfm,
            Direction::WorldToCamera,
        )
    }

    #[test]
    fn test_from_quaternion_roundtrip() {
        let q = [0.9, 0.1, -0.3, 0.2];
        let pose = Pose::from_quaternion(
            FrameId::new(0),
            q,
            Vector3::new(1.0, 2.0, 3.0),
            Convention::Sfm,
            Direction::WorldToCamera,
        )
        .unwrap();
        let n = q.iter().map(|c| c * c).sum::<f64>().sqrt();
        let back = pose.quaternion();
        for i in 0..4 {
            assert_relative_eq!(back[i], q[i] / n, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_from_quaternion_zero_norm_is_malformed() {
        let err = Pose::from_quaternion(
            FrameId::new(4),
            [0.0; 4],
            Vector3::zeros(),
            Convention::Sfm,
            Direction::WorldToCamera,
        )
        .unwrap_err();
        assert_eq!(err.frame_id(), Some(FrameId::new(4)));
    }

    #[test]
    fn test_validate_rejects_nan_and_reflection() {
        let mut pose = sfm_pose(1, Vector3::new(f64::NAN, 0.0, 0.0));
        assert!(pose.validate().is_err());

        pose.translation = Vector3::zeros();
        pose.rotation = Matrix3::from_diagonal(&Vector3::new(-1.0, 1.0, 1.0));
        assert!(matches!(
            pose.validate(),
            Err(CampathError::MalformedPose { .. })
        ));
    }

    #[test]
    fn test_camera_center_and_direction() {
        let pose = sfm_pose(0, Vector3::new(0.0, 0.0, 2.0));
        assert_relative_eq!(pose.camera_center(), Vector3::new(0.0, 0.0, -2.0));

        let c2w = pose.with_direction(Direction::CameraToWorld);
        assert_eq!(c2w.direction, Direction::CameraToWorld);
        assert_relative_eq!(c2w.camera_center(), pose.camera_center());
        assert_eq!(c2w.with_direction(Direction::WorldToCamera), pose);
    }

    #[test]
    fn test_sequence_requires_increasing_ids() {
        let poses = vec![sfm_pose(2, Vector3::zeros()), sfm_pose(2, Vector3::zeros())];
        let err = PoseSequence::new(Convention::Sfm, Direction::WorldToCamera, poses).unwrap_err();
        assert_eq!(err.frame_id(), Some(FrameId::new(2)));
    }

    #[test]
    fn test_sequence_rejects_mixed_conventions() {
        let mut other = sfm_pose(1, Vector3::zeros());
        other.convention = Convention::Engine;
        let poses = vec![sfm_pose(0, Vector3::zeros()), other];
        let err = PoseSequence::new(Convention::Sfm, Direction::WorldToCamera, poses).unwrap_err();
        assert!(matches!(
            err,
            CampathError::Convention(ConventionError::Mismatch { .. })
        ));
    }

    #[test]
    fn test_sequence_lookup_by_frame_id() {
        let poses = vec![
            sfm_pose(0, Vector3::zeros()),
            sfm_pose(5, Vector3::x()),
            sfm_pose(9, Vector3::y()),
        ];
        let seq = PoseSequence::new(Convention::Sfm, Direction::WorldToCamera, poses).unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.get(FrameId::new(5)).unwrap().translation, Vector3::x());
        assert!(seq.get(FrameId::new(4)).is_none());
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("w2c".parse::<Direction>().unwrap(), Direction::WorldToCamera);
        assert_eq!(
            "camera-to-world".parse::<Direction>().unwrap(),
            Direction::CameraToWorld
        );
        assert!("sideways".parse::<Direction>().is_err());
    }
}
