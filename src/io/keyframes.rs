//! Keyframe export boundary.
//!
//! The external baking tool only ever receives positions and XYZ Euler angles
//! in degrees, never quaternions. Two outputs are produced here:
//!
//! - a JSON keyframe track for the content tool (timeline frame = frame id + 1)
//! - an engine pose table `frame_id,px,py,pz,roll_deg,pitch_deg,yaw_deg`

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::geometry::Convention;
use crate::geometry::rotation::matrix_to_euler_xyz_checked;
use crate::trajectory::{Direction, PoseSequence};

/// One animation key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// Timeline frame (1-based).
    pub frame: u64,
    pub time_s: f64,
    pub location: [f64; 3],
    pub rotation_euler_deg: [f64; 3],
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub gimbal_locked: bool,
}

/// A camera animation ready to be keyed by an external tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeTrack {
    pub convention: Convention,
    pub fps: f64,
    pub frame_start: u64,
    pub frame_end: u64,
    pub keyframes: Vec<Keyframe>,
}

/// Build keys from a converted sequence (any direction; camera-to-world is used).
pub fn build_keyframes(seq: &PoseSequence, fps: f64) -> Result<KeyframeTrack> {
    if !(fps.is_finite() && fps > 0.0) {
        bail!("fps must be positive, got {}", fps);
    }
    if seq.convention() == Convention::Sfm {
        bail!("keyframes are exported in the engine or content convention, not sfm");
    }

    let c2w = seq.with_direction(Direction::CameraToWorld);
    let mut locked = 0usize;
    let keyframes = c2w
        .iter()
        .map(|pose| {
            let Some(frame) = pose.frame_id.0.checked_add(1) else {
                bail!("frame id {} has no timeline frame", pose.frame_id);
            };
            let euler = matrix_to_euler_xyz_checked(&pose.rotation);
            if euler.gimbal_locked {
                locked += 1;
            }
            Ok(Keyframe {
                frame,
                time_s: pose.frame_id.0 as f64 / fps,
                location: [pose.translation.x, pose.translation.y, pose.translation.z],
                rotation_euler_deg: [euler.degrees.x, euler.degrees.y, euler.degrees.z],
                gimbal_locked: euler.gimbal_locked,
            })
        })
        .collect::<Result<Vec<Keyframe>>>()?;

    if locked > 0 {
        warn!("{} keyframes are at gimbal lock; Z rotation pinned to 0", locked);
    }

    Ok(KeyframeTrack {
        convention: seq.convention(),
        fps,
        frame_start: keyframes.first().map(|k| k.frame).unwrap_or(1),
        frame_end: keyframes.last().map(|k| k.frame).unwrap_or(1),
        keyframes,
    })
}

pub fn write_keyframes_json<P: AsRef<Path>>(path: P, track: &KeyframeTrack) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, track)
        .with_context(|| format!("Failed to write keyframes to {}", path.display()))?;
    Ok(())
}

/// Engine pose table with positions and roll / pitch / yaw in degrees.
pub fn write_engine_table<W: Write>(writer: W, seq: &PoseSequence) -> Result<()> {
    if seq.convention() != Convention::Engine {
        bail!("engine table needs an engine sequence, got {}", seq.convention());
    }
    let c2w = seq.with_direction(Direction::CameraToWorld);
    let mut w = WriterBuilder::new().from_writer(writer);
    w.write_record(["frame_id", "px", "py", "pz", "roll_deg", "pitch_deg", "yaw_deg"])?;
    for pose in &c2w {
        let e = matrix_to_euler_xyz_checked(&pose.rotation).degrees;
        let p = pose.translation.add_scalar(0.0);
        w.write_record([
            pose.frame_id.0.to_string(),
            format!("{:.6}", p.x),
            format!("{:.6}", p.y),
            format!("{:.6}", p.z),
            format!("{:.6}", e.x),
            format!("{:.6}", e.y),
            format!("{:.6}", e.z),
        ])?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_engine_table_csv<P: AsRef<Path>>(path: P, seq: &PoseSequence) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_engine_table(file, seq)
}
