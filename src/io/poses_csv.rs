//! Pose tables: `frame_id,qw,qx,qy,qz,tx,ty,tz`.

use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use csv::{ReaderBuilder, WriterBuilder};
use nalgebra::Vector3;
use serde::Deserialize;

use crate::geometry::Convention;
use crate::trajectory::{Direction, FrameId, Pose, PoseSequence};

pub const POSE_HEADER: [&str; 8] = ["frame_id", "qw", "qx", "qy", "qz", "tx", "ty", "tz"];

#[derive(Debug, Deserialize)]
struct PoseRow {
    frame_id: u64,
    qw: f64,
    qx: f64,
    qy: f64,
    qz: f64,
    tx: f64,
    ty: f64,
    tz: f64,
}

/// Read a pose table, tagging every pose with `convention` / `direction`.
pub fn read_poses<R: Read>(
    reader: R,
    convention: Convention,
    direction: Direction,
) -> Result<PoseSequence> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut poses = Vec::new();
    for (line, rec) in rdr.deserialize::<PoseRow>().enumerate() {
        let row = rec.with_context(|| format!("Bad pose row {}", line + 1))?;
        let pose = Pose::from_quaternion(
            FrameId::new(row.frame_id),
            [row.qw, row.qx, row.qy, row.qz],
            Vector3::new(row.tx, row.ty, row.tz),
            convention,
            direction,
        )?;
        poses.push(pose);
    }
    if poses.is_empty() {
        bail!("Pose table has no rows");
    }
    Ok(PoseSequence::new(convention, direction, poses)?)
}

pub fn read_poses_csv<P: AsRef<Path>>(
    path: P,
    convention: Convention,
    direction: Direction,
) -> Result<PoseSequence> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    read_poses(file, convention, direction)
        .with_context(|| format!("Failed to read poses from {}", path.display()))
}

/// Write a sequence as a pose table in its own direction (8 decimals).
pub fn write_poses<W: Write>(writer: W, seq: &PoseSequence) -> Result<()> {
    let mut w = WriterBuilder::new().from_writer(writer);
    w.write_record(POSE_HEADER)?;
    for pose in seq {
        let q = pose.quaternion();
        let t = pose.translation;
        w.write_record([
            pose.frame_id.0.to_string(),
            format!("{:.8}", q[0]),
            format!("{:.8}", q[1]),
            format!("{:.8}", q[2]),
            format!("{:.8}", q[3]),
            format!("{:.8}", t.x),
            format!("{:.8}", t.y),
            format!("{:.8}", t.z),
        ])?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_poses_csv<P: AsRef<Path>>(path: P, seq: &PoseSequence) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_poses(file, seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TABLE: &str = "frame_id,qw,qx,qy,qz,tx,ty,tz
0,1.0,0.0,0.0,0.0,0.0,0.0,0.0
1, 0.70710678,0.0,0.70710678,0.0, 1.5,-2.0,0.25
";

    #[test]
    fn test_read_poses_table() {
        let seq = read_poses(TABLE.as_bytes(), Convention::Sfm, Direction::WorldToCamera).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.convention(), Convention::Sfm);
        let p = &seq.poses()[1];
        assert_eq!(p.frame_id, FrameId::new(1));
        assert_relative_eq!(p.translation, Vector3::new(1.5, -2.0, 0.25));
    }

    #[test]
    fn test_write_then_read_preserves_poses() {
        let seq = read_poses(TABLE.as_bytes(), Convention::Sfm, Direction::WorldToCamera).unwrap();
        let mut buf = Vec::new();
        write_poses(&mut buf, &seq).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("frame_id,qw,qx,qy,qz,tx,ty,tz\n"));

        let back = read_poses(buf.as_slice(), Convention::Sfm, Direction::WorldToCamera).unwrap();
        for (a, b) in seq.iter().zip(back.iter()) {
            assert_relative_eq!(a.rotation, b.rotation, epsilon = 1e-7);
            assert_relative_eq!(a.translation, b.translation, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_bad_quaternion_reports_frame() {
        let table = "frame_id,qw,qx,qy,qz,tx,ty,tz\n3,0,0,0,0,0,0,0\n";
        let err = read_poses(table.as_bytes(), Convention::Sfm, Direction::WorldToCamera)
            .unwrap_err();
        let core = err.downcast_ref::<crate::error::CampathError>().unwrap();
        assert_eq!(core.frame_id(), Some(FrameId::new(3)));
    }

    #[test]
    fn test_empty_table_rejected() {
        let table = "frame_id,qw,qx,qy,qz,tx,ty,tz\n";
        assert!(read_poses(table.as_bytes(), Convention::Sfm, Direction::WorldToCamera).is_err());
    }
}
