//! Batch processing of independent sequences.
//!
//! Sequences share nothing, so each one runs through the pipeline on its own
//! worker. Jobs go out over a bounded channel and results come back tagged
//! with their input index, so output order always matches input order.

use std::thread;

use crossbeam_channel::{bounded, unbounded};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::{self, PipelineOutput};
use crate::trajectory::PoseSequence;

/// Capacity of the job queue feeding the workers.
const JOB_CHANNEL_CAPACITY: usize = 16;

/// One named sequence to process.
#[derive(Debug)]
pub struct BatchJob {
    pub name: String,
    pub sequence: PoseSequence,
}

#[derive(Debug)]
pub struct BatchResult {
    pub index: usize,
    pub name: String,
    pub outcome: Result<PipelineOutput>,
}

/// Run every job with `workers` threads (at least one).
///
/// A failing sequence does not stop the others; its error is returned in
/// its slot.
pub fn run_batch(jobs: Vec<BatchJob>, config: &PipelineConfig, workers: usize) -> Vec<BatchResult> {
    let total = jobs.len();
    if total == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, total);
    info!("Processing {} sequences on {} workers", total, workers);

    let (job_tx, job_rx) = bounded::<(usize, BatchJob)>(JOB_CHANNEL_CAPACITY);
    let (result_tx, result_rx) = unbounded::<BatchResult>();

    thread::scope(|scope| {
        for worker in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for (index, job) in job_rx.iter() {
                    debug!("worker {} <- {}", worker, job.name);
                    let outcome = pipeline::run(&job.sequence, config);
                    if let Err(e) = &outcome {
                        warn!("{}: {}", job.name, e);
                    }
                    let result = BatchResult {
                        index,
                        name: job.name,
                        outcome,
                    };
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            });
        }
        // Workers hold their own clones; drop ours so the channels close.
        drop(job_rx);
        drop(result_tx);

        for item in jobs.into_iter().enumerate() {
            if job_tx.send(item).is_err() {
                break;
            }
        }
        drop(job_tx);
    });

    let mut results: Vec<BatchResult> = result_rx.iter().collect();
    results.sort_by_key(|r| r.index);
    results
}
