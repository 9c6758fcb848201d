//! Path scale suggestion from scene depth statistics.
//!
//! SfM reconstructions have arbitrary scale. Given per-frame depth statistics
//! the path can be scaled so the typical scene depth maps to a chosen size in
//! the target tool:
//!
//! ```text
//! representative_depth = mean over frames of the per-frame mean depth
//! scale                = target_size / representative_depth
//! ```
//!
//! Frames are weighted equally regardless of how many pixels each one had.

use std::collections::BTreeMap;

use tracing::debug;

use super::{DepthStats, FrameId};
use crate::error::{CampathError, Result};

/// Default on-screen size (target units) for the representative depth.
pub const DEFAULT_TARGET_SIZE: f64 = 200.0;

/// Aggregate statistics over a depth channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthSummary {
    pub frames: usize,
    /// Arithmetic mean of the per-frame means (the representative depth).
    pub mean_of_means: f64,
    /// Median of the per-frame medians (reported only).
    pub median_of_medians: f64,
    pub min: f64,
    pub max: f64,
}

/// A derived scale together with the numbers it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleSuggestion {
    pub scale: f64,
    pub target_size: f64,
    pub summary: DepthSummary,
}

pub fn summarize_depth(depth: &BTreeMap<FrameId, DepthStats>) -> Result<DepthSummary> {
    if depth.is_empty() {
        return Err(CampathError::MissingAuxData(
            "no per-frame depth statistics available".to_string(),
        ));
    }
    if let Some((id, _)) = depth
        .iter()
        .find(|(_, d)| !(d.mean.is_finite() && d.median.is_finite()))
    {
        return Err(CampathError::InvalidDepth(format!(
            "frame {} has non-finite depth statistics",
            id
        )));
    }

    let n = depth.len();
    let mean_of_means = depth.values().map(|d| d.mean).sum::<f64>() / n as f64;

    let mut medians: Vec<f64> = depth.values().map(|d| d.median).collect();
    medians.sort_by(|a, b| a.total_cmp(b));
    let median_of_medians = if n % 2 == 1 {
        medians[n / 2]
    } else {
        0.5 * (medians[n / 2 - 1] + medians[n / 2])
    };

    let min = depth.values().map(|d| d.min).fold(f64::INFINITY, f64::min);
    let max = depth
        .values()
        .map(|d| d.max)
        .fold(f64::NEG_INFINITY, f64::max);

    Ok(DepthSummary {
        frames: n,
        mean_of_means,
        median_of_medians,
        min,
        max,
    })
}

/// Scale so that the representative depth becomes `target_size`.
pub fn scale_from_depth(
    depth: &BTreeMap<FrameId, DepthStats>,
    target_size: f64,
) -> Result<ScaleSuggestion> {
    if !(target_size.is_finite() && target_size > 0.0) {
        return Err(CampathError::InvalidOption(format!(
            "target size must be positive, got {}",
            target_size
        )));
    }
    let summary = summarize_depth(depth)?;
    if summary.mean_of_means <= 0.0 {
        return Err(CampathError::InvalidDepth(format!(
            "mean depth must be positive, got {}",
            summary.mean_of_means
        )));
    }

    let scale = target_size / summary.mean_of_means;
    debug!(
        "Depth scale: {} frames, mean depth {:.4}, target {} -> scale {:.6}",
        summary.frames, summary.mean_of_means, target_size, scale
    );
    Ok(ScaleSuggestion {
        scale,
        target_size,
        summary,
    })
}
