//! One sequence through edit → conversion → diagnostics.

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::diagnostics::{TrajectoryStats, flag_discontinuities, trajectory_stats};
use crate::error::Result;
use crate::geometry::{Convention, ConversionReport, FrameConverter};
use crate::trajectory::{self, PoseSequence};

/// Flagged frame indices for one stage of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct StageCheck {
    pub stage: String,
    pub flagged: Vec<usize>,
}

#[derive(Debug)]
pub struct PipelineOutput {
    /// The input after the requested edits, still in the input convention.
    pub edited: PoseSequence,
    /// One converted sequence per target convention, in config order.
    pub converted: Vec<(Convention, ConversionReport)>,
    pub checks: Vec<StageCheck>,
    pub stats: TrajectoryStats,
}

impl PipelineOutput {
    pub fn target(&self, convention: Convention) -> Option<&PoseSequence> {
        self.converted
            .iter()
            .find(|(c, _)| *c == convention)
            .map(|(_, r)| &r.sequence)
    }

    pub fn total_flagged(&self) -> usize {
        self.checks.iter().map(|c| c.flagged.len()).sum()
    }
}

/// Run the configured edits and conversions on `seq`.
///
/// Option problems are reported before any pose is processed.
pub fn run(seq: &PoseSequence, config: &PipelineConfig) -> Result<PipelineOutput> {
    config.transform.validate()?;
    let converter = FrameConverter::standard().with_position_scale(config.position_scale)?;

    let edited = trajectory::apply(seq, &config.transform)?;
    let stats = trajectory_stats(&edited);
    info!(
        "Edited {} poses: path length {:.4}, max step {:.4}",
        edited.len(),
        stats.path_length,
        stats.max_step
    );

    let mut checks = Vec::new();
    if let Some(t) = config.discontinuity {
        checks.push(StageCheck {
            stage: format!("edited ({})", edited.convention()),
            flagged: flag_discontinuities(&edited, t.position_threshold, t.rotation_threshold_deg),
        });
    }

    let mut converted = Vec::with_capacity(config.targets.len());
    for &target in &config.targets {
        let report = converter.convert_sequence(&edited, target, config.failure_policy)?;
        if !report.skipped.is_empty() {
            warn!("{}: skipped {} frames", target, report.skipped.len());
        }
        if let Some(t) = config.discontinuity {
            // Thresholds are in input units; the converter rescales positions
            // whenever a sequence enters or leaves SfM.
            let scale = match (edited.convention(), target) {
                (Convention::Sfm, Convention::Sfm) => 1.0,
                (Convention::Sfm, _) => converter.position_scale(),
                (_, Convention::Sfm) => 1.0 / converter.position_scale(),
                _ => 1.0,
            };
            checks.push(StageCheck {
                stage: target.to_string(),
                flagged: flag_discontinuities(
                    &report.sequence,
                    t.position_threshold * scale,
                    t.rotation_threshold_deg,
                ),
            });
        }
        converted.push((target, report));
    }

    Ok(PipelineOutput {
        edited,
        converted,
        checks,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscontinuityThresholds;
    use crate::error::CampathError;
    use crate::trajectory::{Direction, FrameId, Pose, ScaleMode, TransformSpec};
    use nalgebra::{Matrix3, Vector3};

    fn sfm_walk(n: u64) -> PoseSequence {
        let poses = (0..n)
            .map(|i| {
                Pose::new(
                    FrameId::new(i),
                    Matrix3::identity(),
                    Vector3::new(0.0, 0.0, -(i as f64)),
                    Convention::Sfm,
                    Direction::WorldToCamera,
                )
            })
            .collect();
        PoseSequence::new(Convention::Sfm, Direction::WorldToCamera, poses).unwrap()
    }

    #[test]
    fn test_run_converts_to_every_target() {
        let config = PipelineConfig {
            targets: vec![Convention::Engine, Convention::ContentTool],
            position_scale: 100.0,
            discontinuity: Some(DiscontinuityThresholds {
                position_threshold: 2.0,
                rotation_threshold_deg: 10.0,
            }),
            ..Default::default()
        };
        let out = run(&sfm_walk(5), &config).unwrap();

        assert_eq!(out.converted.len(), 2);
        let engine = out.target(Convention::Engine).unwrap();
        assert_eq!(engine.len(), 5);
        assert!((engine.poses()[4].translation.x - 400.0).abs() < 1e-9);
        // Unit steps in SfM, 100-unit steps after scaling: nothing is flagged.
        assert_eq!(out.total_flagged(), 0);
        assert_eq!(out.checks.len(), 3);
    }

    #[test]
    fn test_run_reports_bad_options_before_work() {
        let config = PipelineConfig {
            transform: TransformSpec {
                scale: ScaleMode::Explicit(-2.0),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(run(&sfm_walk(3), &config).is_err());
    }

    #[test]
    fn test_run_rejects_degenerate_position_scale() {
        for position_scale in [0.0, -1.0, f64::NAN] {
            let config = PipelineConfig {
                position_scale,
                ..Default::default()
            };
            let err = run(&sfm_walk(3), &config).unwrap_err();
            assert!(matches!(err, CampathError::InvalidOption(_)));
        }
    }
}
