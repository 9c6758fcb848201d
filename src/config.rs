//! Pipeline configuration (YAML).
//!
//! ```yaml
//! input_convention: sfm
//! input_direction: world_to_camera
//! targets: [engine, content_tool]
//! position_scale: 100.0
//! fps: 24.0
//! transform:
//!   flip_y: true
//!   scale:
//!     from_depth: { target_size: 200.0 }
//! discontinuity:
//!   position_threshold: 50.0
//!   rotation_threshold_deg: 20.0
//! failure_policy: abort
//! ```
//!
//! Every field is optional.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::geometry::{Convention, FailurePolicy};
use crate::trajectory::{Direction, TransformSpec};

/// Caller-chosen thresholds for the continuity check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscontinuityThresholds {
    pub position_threshold: f64,
    pub rotation_threshold_deg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub input_convention: Convention,
    pub input_direction: Direction,
    pub transform: TransformSpec,
    pub targets: Vec<Convention>,
    /// Position multiplier when leaving SfM units (100 for metres to centimetres).
    pub position_scale: f64,
    pub fps: f64,
    pub discontinuity: Option<DiscontinuityThresholds>,
    pub failure_policy: FailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_convention: Convention::Sfm,
            input_direction: Direction::WorldToCamera,
            transform: TransformSpec::default(),
            targets: vec![Convention::Engine],
            position_scale: 1.0,
            fps: 30.0,
            discontinuity: None,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text).context("Invalid pipeline config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config: Self = serde_yaml::from_reader(
            File::open(path).with_context(|| format!("Failed to open {:?}", path))?,
        )
        .with_context(|| format!("Invalid pipeline config {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.transform.validate()?;
        if self.targets.is_empty() {
            bail!("at least one target convention is required");
        }
        if !(self.position_scale.is_finite() && self.position_scale > 0.0) {
            bail!("position_scale must be positive, got {}", self.position_scale);
        }
        if !(self.fps.is_finite() && self.fps > 0.0) {
            bail!("fps must be positive, got {}", self.fps);
        }
        if let Some(t) = self.discontinuity {
            if t.position_threshold < 0.0 || t.rotation_threshold_deg < 0.0 {
                bail!("discontinuity thresholds must be non-negative");
            }
        }
        Ok(())
    }
}
