//! Frame-to-frame continuity checks.
//!
//! A wrong change of basis usually shows up as a trajectory that is smooth in
//! position but jumps in orientation (or the other way round). These helpers
//! measure the per-step deltas so such jumps can be flagged. Thresholds are
//! always supplied by the caller.

use std::collections::BTreeSet;

use tracing::warn;

use crate::geometry::rotation::rotation_angle_between;
use crate::trajectory::{FrameId, Pose, PoseSequence};

/// Motion between two poses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameDelta {
    pub from: FrameId,
    pub to: FrameId,
    /// Distance between camera centers.
    pub position_delta: f64,
    /// Geodesic angle between camera orientations, degrees.
    pub rotation_delta_deg: f64,
}

/// Camera-center distance and orientation change from `a` to `b`.
pub fn frame_delta(a: &Pose, b: &Pose) -> FrameDelta {
    FrameDelta {
        from: a.frame_id,
        to: b.frame_id,
        position_delta: (b.camera_center() - a.camera_center()).norm(),
        rotation_delta_deg: rotation_angle_between(&a.rotation_c2w(), &b.rotation_c2w()),
    }
}

/// Deltas between consecutive poses.
pub fn sequence_deltas(seq: &PoseSequence) -> Vec<FrameDelta> {
    seq.poses()
        .windows(2)
        .map(|w| frame_delta(&w[0], &w[1]))
        .collect()
}

/// Indices of poses that break continuity under either threshold.
///
/// Each over-threshold step is charged to a single frame:
/// - when the steps into and out of frame `i` both exceed, frame `i` is a
///   spike and only `i` is flagged (its neighbors are not);
/// - otherwise the step `i - 1 → i` is a one-sided jump and `i`, the frame it
///   lands on, is flagged. This covers a jump into the last frame and a
///   persistent offset from `i` onwards.
///
/// Index 0 is never returned.
pub fn flag_discontinuities(
    seq: &PoseSequence,
    position_threshold: f64,
    rotation_threshold_deg: f64,
) -> Vec<usize> {
    let exceeded: Vec<bool> = sequence_deltas(seq)
        .iter()
        .map(|d| {
            d.position_delta > position_threshold || d.rotation_delta_deg > rotation_threshold_deg
        })
        .collect();

    let mut flagged = Vec::new();
    let mut step = 0;
    while step < exceeded.len() {
        if exceeded[step] {
            flagged.push(step + 1);
            // The step back out of a spike belongs to the same frame.
            if exceeded.get(step + 1).copied().unwrap_or(false) {
                step += 1;
            }
        }
        step += 1;
    }

    if !flagged.is_empty() {
        warn!(
            "{} discontinuities over {} poses (thresholds: {} units, {} deg)",
            flagged.len(),
            seq.len(),
            position_threshold,
            rotation_threshold_deg
        );
    }
    flagged
}

/// Per-frame comparison of two sequences aligned by frame id.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceDiff {
    pub deltas: Vec<FrameDelta>,
    pub only_in_a: Vec<FrameId>,
    pub only_in_b: Vec<FrameId>,
}

impl SequenceDiff {
    /// True when both sequences cover the same frames.
    pub fn frames_match(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty()
    }

    pub fn max_position_delta(&self) -> f64 {
        self.deltas
            .iter()
            .map(|d| d.position_delta)
            .fold(0.0, f64::max)
    }

    pub fn max_rotation_delta_deg(&self) -> f64 {
        self.deltas
            .iter()
            .map(|d| d.rotation_delta_deg)
            .fold(0.0, f64::max)
    }
}

/// Compare `a` and `b` frame by frame. Frames present in only one sequence are
/// reported, not dropped silently.
pub fn diff_sequences(a: &PoseSequence, b: &PoseSequence) -> SequenceDiff {
    let ids_a: BTreeSet<FrameId> = a.frame_ids().into_iter().collect();
    let ids_b: BTreeSet<FrameId> = b.frame_ids().into_iter().collect();

    let deltas = a
        .iter()
        .filter_map(|pa| b.get(pa.frame_id).map(|pb| frame_delta(pa, pb)))
        .collect();

    SequenceDiff {
        deltas,
        only_in_a: ids_a.difference(&ids_b).copied().collect(),
        only_in_b: ids_b.difference(&ids_a).copied().collect(),
    }
}

/// Aggregate motion statistics for logging.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrajectoryStats {
    pub path_length: f64,
    pub max_step: f64,
    pub mean_step: f64,
    pub max_rotation_step_deg: f64,
}

pub fn trajectory_stats(seq: &PoseSequence) -> TrajectoryStats {
    let deltas = sequence_deltas(seq);
    if deltas.is_empty() {
        return TrajectoryStats::default();
    }
    let path_length: f64 = deltas.iter().map(|d| d.position_delta).sum();
    TrajectoryStats {
        path_length,
        max_step: deltas.iter().map(|d| d.position_delta).fold(0.0, f64::max),
        mean_step: path_length / deltas.len() as f64,
        max_rotation_step_deg: deltas
            .iter()
            .map(|d| d.rotation_delta_deg)
            .fold(0.0, f64::max),
    }
}
