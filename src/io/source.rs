//! Locating and loading trajectory inputs.
//!
//! An input is either a pose CSV or a COLMAP `images.txt`, given as the file
//! itself or as a directory holding `poses.csv` / `images.txt`.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use super::colmap::{ColmapImage, images_to_sequence, read_images_txt};
use super::poses_csv::read_poses_csv;
use crate::geometry::Convention;
use crate::trajectory::{Direction, PoseSequence};

pub const POSES_CSV_FILE: &str = "poses.csv";
pub const IMAGES_TXT_FILE: &str = "images.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// `frame_id,qw,qx,qy,qz,tx,ty,tz`.
    Csv,
    /// COLMAP `images.txt` (SfM, world-to-camera).
    Colmap,
}

impl TableFormat {
    pub fn file_name(self) -> &'static str {
        match self {
            TableFormat::Csv => POSES_CSV_FILE,
            TableFormat::Colmap => IMAGES_TXT_FILE,
        }
    }

    /// Guess from a file path: `.csv` is a pose table, `.txt` is COLMAP.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?;
        if ext.eq_ignore_ascii_case("csv") {
            Some(TableFormat::Csv)
        } else if ext.eq_ignore_ascii_case("txt") {
            Some(TableFormat::Colmap)
        } else {
            None
        }
    }
}

/// An input file and the format it is read with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInput {
    pub path: PathBuf,
    pub format: TableFormat,
}

impl ResolvedInput {
    /// Directory holding the input; side tables are looked up here.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Find the table behind `path`, honoring `format` when given.
///
/// Directories are searched for `images.txt` first, then `poses.csv`.
pub fn resolve_input(path: &Path, format: Option<TableFormat>) -> Result<ResolvedInput> {
    let (path, format) = if path.is_dir() {
        let format = match format {
            Some(f) => f,
            None if path.join(IMAGES_TXT_FILE).is_file() => TableFormat::Colmap,
            None if path.join(POSES_CSV_FILE).is_file() => TableFormat::Csv,
            None => bail!(
                "{} holds neither {} nor {}",
                path.display(),
                IMAGES_TXT_FILE,
                POSES_CSV_FILE
            ),
        };
        (path.join(format.file_name()), format)
    } else {
        let format = format
            .or_else(|| TableFormat::from_extension(path))
            .unwrap_or(TableFormat::Csv);
        (path.to_path_buf(), format)
    };

    if !path.is_file() {
        bail!("Input not found: {}", path.display());
    }
    Ok(ResolvedInput { path, format })
}

/// Output file for `format`: inside `path` when it is a directory, else `path`.
pub fn resolve_output(path: &Path, format: TableFormat) -> PathBuf {
    if path.is_dir() {
        path.join(format.file_name())
    } else {
        path.to_path_buf()
    }
}

/// A loaded trajectory, plus the COLMAP records when it came from `images.txt`.
#[derive(Debug, Clone)]
pub struct LoadedInput {
    pub sequence: PoseSequence,
    pub images: Option<Vec<ColmapImage>>,
}

/// Read a resolved input. COLMAP tables are always SfM world-to-camera;
/// `convention` and `direction` tag pose CSVs only.
pub fn load_input(
    input: &ResolvedInput,
    convention: Convention,
    direction: Direction,
) -> Result<LoadedInput> {
    match input.format {
        TableFormat::Csv => Ok(LoadedInput {
            sequence: read_poses_csv(&input.path, convention, direction)?,
            images: None,
        }),
        TableFormat::Colmap => {
            let images = read_images_txt(&input.path)?;
            Ok(LoadedInput {
                sequence: images_to_sequence(&images)?,
                images: Some(images),
            })
        }
    }
}
