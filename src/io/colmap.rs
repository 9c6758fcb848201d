//! COLMAP `images.txt` reader / writer.
//!
//! Each image takes two lines:
//! ```text
//! IMAGE_ID QW QX QY QZ TX TY TZ CAMERA_ID NAME
//! POINTS2D[] as (X, Y, POINT3D_ID)
//! ```
//! Poses are world-to-camera in the SfM convention.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use nalgebra::Vector3;

use crate::geometry::Convention;
use crate::trajectory::{Direction, FrameId, Pose, PoseSequence};

/// One registered image.
#[derive(Debug, Clone, PartialEq)]
pub struct ColmapImage {
    pub image_id: u64,
    pub qvec: [f64; 4],
    pub tvec: Vector3<f64>,
    pub camera_id: u64,
    pub name: String,
    /// Raw 2-D observation line, kept verbatim.
    pub points2d: String,
}

pub fn read_images<R: Read>(reader: R) -> Result<Vec<ColmapImage>> {
    let mut lines = BufReader::new(reader).lines();
    let mut images = Vec::new();

    while let Some(line) = lines.next() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }
        let num = |i: usize| -> Result<f64> {
            parts[i]
                .parse::<f64>()
                .with_context(|| format!("Bad number '{}' in image line '{}'", parts[i], trimmed))
        };
        let image_id: u64 = parts[0]
            .parse()
            .with_context(|| format!("Bad image id in '{}'", trimmed))?;
        let qvec = [num(1)?, num(2)?, num(3)?, num(4)?];
        let tvec = Vector3::new(num(5)?, num(6)?, num(7)?);
        let camera_id: u64 = parts[8]
            .parse()
            .with_context(|| format!("Bad camera id in '{}'", trimmed))?;
        let name = parts[9..].join(" ");
        let points2d = match lines.next() {
            Some(l) => l?.trim_end().to_string(),
            None => String::new(),
        };

        images.push(ColmapImage {
            image_id,
            qvec,
            tvec,
            camera_id,
            name,
            points2d,
        });
    }
    Ok(images)
}

pub fn read_images_txt<P: AsRef<Path>>(path: P) -> Result<Vec<ColmapImage>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    read_images(file)
}

pub fn write_images<W: Write>(mut writer: W, images: &[ColmapImage]) -> Result<()> {
    writeln!(writer, "# Image list with two lines per image:")?;
    writeln!(writer, "#   IMAGE_ID, QW, QX, QY, QZ, TX, TY, TZ, CAMERA_ID, NAME")?;
    writeln!(writer, "#   POINTS2D[] as (X, Y, POINT3D_ID)")?;
    writeln!(writer, "# Number of images: {}", images.len())?;
    for img in images {
        let q = img.qvec;
        let t = img.tvec;
        writeln!(
            writer,
            "{} {:.8} {:.8} {:.8} {:.8} {:.8} {:.8} {:.8} {} {}",
            img.image_id, q[0], q[1], q[2], q[3], t.x, t.y, t.z, img.camera_id, img.name
        )?;
        writeln!(writer, "{}", img.points2d)?;
    }
    Ok(())
}

pub fn write_images_txt<P: AsRef<Path>>(path: P, images: &[ColmapImage]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_images(file, images)
}

/// Build an SfM world-to-camera sequence, ordered by image id.
pub fn images_to_sequence(images: &[ColmapImage]) -> Result<PoseSequence> {
    if images.is_empty() {
        bail!("No images to convert");
    }
    let mut sorted: Vec<&ColmapImage> = images.iter().collect();
    sorted.sort_by_key(|img| img.image_id);

    let poses = sorted
        .iter()
        .map(|img| {
            Pose::from_quaternion(
                FrameId::new(img.image_id),
                img.qvec,
                img.tvec,
                Convention::Sfm,
                Direction::WorldToCamera,
            )
        })
        .collect::<crate::error::Result<Vec<_>>>()?;
    Ok(PoseSequence::new(
        Convention::Sfm,
        Direction::WorldToCamera,
        poses,
    )?)
}

/// Fresh image records for an SfM sequence (image id = frame id, camera 1,
/// `frame_NNNNNN.jpg` names, no observations).
pub fn sequence_to_images(seq: &PoseSequence) -> Result<Vec<ColmapImage>> {
    if seq.convention() != Convention::Sfm {
        bail!("COLMAP records need an sfm sequence, got {}", seq.convention());
    }
    let w2c = seq.with_direction(Direction::WorldToCamera);
    Ok(w2c
        .iter()
        .map(|pose| ColmapImage {
            image_id: pose.frame_id.0,
            qvec: pose.quaternion(),
            tvec: pose.translation,
            camera_id: 1,
            name: format!("frame_{:06}.jpg", pose.frame_id.0),
            points2d: String::new(),
        })
        .collect())
}

/// Copy poses from `seq` back onto `images` (matched by image id), keeping
/// camera ids, names and observations.
pub fn update_images(images: &[ColmapImage], seq: &PoseSequence) -> Result<Vec<ColmapImage>> {
    let w2c = seq.with_direction(Direction::WorldToCamera);
    images
        .iter()
        .map(|img| {
            let pose = w2c
                .get(FrameId::new(img.image_id))
                .with_context(|| format!("No pose for image {}", img.image_id))?;
            Ok(ColmapImage {
                qvec: pose.quaternion(),
                tvec: pose.translation,
                ..img.clone()
            })
        })
        .collect()
}

/// Reverse image order, handing the ascending id list to the reversed images.
pub fn reverse_images(images: &[ColmapImage]) -> Vec<ColmapImage> {
    let mut ids: Vec<u64> = images.iter().map(|i| i.image_id).collect();
    ids.sort_unstable();
    let mut sorted: Vec<&ColmapImage> = images.iter().collect();
    sorted.sort_by_key(|img| img.image_id);
    sorted
        .into_iter()
        .rev()
        .zip(ids)
        .map(|(img, id)| ColmapImage {
            image_id: id,
            ..img.clone()
        })
        .collect()
}
