//! campath: convert and edit camera trajectories between SfM, engine and
//! content-tool conventions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use campath::batch::{BatchJob, run_batch};
use campath::config::PipelineConfig;
use campath::diagnostics::{diff_sequences, flag_discontinuities, trajectory_stats};
use campath::geometry::Convention;
use campath::io::colmap::{reverse_images, sequence_to_images, update_images, write_images_txt};
use campath::io::keyframes::{build_keyframes, write_engine_table_csv, write_keyframes_json};
use campath::io::{
    LoadedInput, ResolvedInput, TableFormat, load_input, read_depth_summary_csv, read_poses_csv,
    resolve_input, resolve_output, write_poses_csv,
};
use campath::pipeline::{self, PipelineOutput};
use campath::trajectory::{
    self, DEFAULT_TARGET_SIZE, DepthStats, Direction, FrameId, PoseSequence, ScaleMode,
    TransformSpec, summarize_depth,
};

/// Depth table looked up next to the input when none is named.
const DEPTH_SUMMARY_FILE: &str = "depth_summary.csv";

#[derive(Parser)]
#[command(name = "campath")]
#[command(about = "Convert camera trajectories between SfM, engine and content-tool conventions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flip, swap, scale or reverse a trajectory in place.
    Transform(TransformArgs),

    /// Suggest a scale factor from a depth summary table.
    SuggestScale {
        /// Depth summary CSV.
        depth: PathBuf,

        /// Desired representative scene size.
        #[arg(long, default_value_t = DEFAULT_TARGET_SIZE)]
        target_size: f64,
    },

    /// Convert a pose table or COLMAP model to engine and/or content-tool outputs.
    Convert(ConvertArgs),

    /// Report frame-to-frame jumps above the given thresholds.
    Check {
        poses: PathBuf,

        #[command(flatten)]
        input: InputArgs,

        #[arg(long)]
        position_threshold: f64,

        /// Degrees.
        #[arg(long)]
        rotation_threshold: f64,
    },

    /// Compare two pose tables frame by frame.
    Diff {
        a: PathBuf,
        b: PathBuf,

        #[command(flatten)]
        input: InputArgs,
    },

    /// Run a pipeline config over many pose tables in parallel.
    Batch {
        config: PathBuf,

        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(long, default_value = "out")]
        out_dir: PathBuf,

        #[arg(long, default_value = "4")]
        workers: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ConventionArg {
    Sfm,
    Engine,
    Content,
}

impl From<ConventionArg> for Convention {
    fn from(arg: ConventionArg) -> Self {
        match arg {
            ConventionArg::Sfm => Convention::Sfm,
            ConventionArg::Engine => Convention::Engine,
            ConventionArg::Content => Convention::ContentTool,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DirectionArg {
    W2c,
    C2w,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::W2c => Direction::WorldToCamera,
            DirectionArg::C2w => Direction::CameraToWorld,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    /// Directories holding images.txt and `.txt` files are COLMAP, the rest pose CSV.
    Auto,
    Csv,
    Colmap,
}

impl FormatArg {
    fn table(self) -> Option<TableFormat> {
        match self {
            FormatArg::Auto => None,
            FormatArg::Csv => Some(TableFormat::Csv),
            FormatArg::Colmap => Some(TableFormat::Colmap),
        }
    }
}

#[derive(Debug, Clone, Args)]
struct InputArgs {
    #[arg(long, value_enum, default_value_t = ConventionArg::Sfm)]
    input_convention: ConventionArg,

    #[arg(long, value_enum, default_value_t = DirectionArg::W2c)]
    direction: DirectionArg,
}

/// Edits shared by `transform` and `convert`.
#[derive(Debug, Clone, Args)]
struct EditArgs {
    #[arg(long)]
    flip_x: bool,
    #[arg(long)]
    flip_y: bool,
    #[arg(long)]
    flip_z: bool,
    #[arg(long)]
    swap_xy: bool,
    #[arg(long)]
    swap_yz: bool,
    #[arg(long)]
    reverse: bool,

    /// Uniform scale applied to camera positions.
    #[arg(long)]
    scale: Option<f64>,

    /// Derive the scale from a depth summary (defaults to depth_summary.csv next to the input).
    #[arg(long, num_args = 0..=1)]
    scale_from_depth: Option<Option<PathBuf>>,

    #[arg(long, default_value_t = DEFAULT_TARGET_SIZE)]
    target_size: f64,

    /// Pipeline config whose `transform` section is used as the base edit.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl EditArgs {
    /// The requested edit. Mixing an explicit scale with scale-from-depth,
    /// across flags and config alike, is rejected.
    fn spec(&self) -> Result<TransformSpec> {
        let flags = TransformSpec::from_options(
            self.flip_x,
            self.flip_y,
            self.flip_z,
            self.swap_xy,
            self.swap_yz,
            self.reverse,
            self.scale,
            self.scale_from_depth.as_ref().map(|_| self.target_size),
        )?;
        match &self.config {
            Some(path) => Ok(PipelineConfig::from_yaml_file(path)?
                .transform
                .merged_with(&flags)?),
            None => Ok(flags),
        }
    }

    fn depth_path(&self, input: &ResolvedInput) -> PathBuf {
        self.scale_from_depth
            .clone()
            .flatten()
            .unwrap_or_else(|| input.dir().join(DEPTH_SUMMARY_FILE))
    }
}

#[derive(Debug, Clone, Args)]
struct TransformArgs {
    /// Pose CSV, images.txt, or a directory holding one of them.
    input: PathBuf,
    /// Output file, or a directory to receive poses.csv / images.txt.
    output: PathBuf,

    #[command(flatten)]
    edit: EditArgs,

    #[arg(long, value_enum, default_value_t = FormatArg::Auto)]
    format: FormatArg,

    #[command(flatten)]
    input_args: InputArgs,
}

#[derive(Debug, Clone, Args)]
struct ConvertArgs {
    /// Pose CSV, images.txt, or a directory holding one of them.
    input: PathBuf,
    out_dir: PathBuf,

    #[arg(long, value_enum, num_args = 1.., default_values_t = [ConventionArg::Engine])]
    to: Vec<ConventionArg>,

    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Treat SfM units as metres and write centimetres.
    #[arg(long)]
    centimeters: bool,

    #[command(flatten)]
    edit: EditArgs,

    #[arg(long, value_enum, default_value_t = FormatArg::Auto)]
    format: FormatArg,

    #[command(flatten)]
    input_args: InputArgs,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Transform(args) => cmd_transform(args),
        Commands::SuggestScale { depth, target_size } => cmd_suggest_scale(&depth, target_size),
        Commands::Convert(args) => cmd_convert(args),
        Commands::Check {
            poses,
            input,
            position_threshold,
            rotation_threshold,
        } => cmd_check(&poses, &input, position_threshold, rotation_threshold),
        Commands::Diff { a, b, input } => cmd_diff(&a, &b, &input),
        Commands::Batch {
            config,
            inputs,
            out_dir,
            workers,
        } => cmd_batch(&config, &inputs, &out_dir, workers),
    }
}

// ============================================================================
// Subcommands
// ============================================================================

fn cmd_transform(args: TransformArgs) -> Result<()> {
    let spec = args.edit.spec()?;
    if spec.is_identity() {
        warn!("No edit requested; output will equal input");
    }

    let input = resolve_input(&args.input, args.format.table())?;
    let loaded = load_for_edit(&input, &args.input_args, &args.edit, &spec)?;

    let out_format = if args.output.is_dir() {
        input.format
    } else {
        TableFormat::from_extension(&args.output).unwrap_or(input.format)
    };
    let output = resolve_output(&args.output, out_format);

    match (out_format, loaded.images) {
        (TableFormat::Colmap, Some(images)) => {
            // Pose numbers change here; the record order is handled on the
            // images so names and observations stay attached to their pose.
            let linear = TransformSpec {
                reverse: false,
                ..spec.clone()
            };
            let edited = trajectory::apply(&loaded.sequence, &linear)?;
            let mut out = update_images(&images, &edited)?;
            if spec.reverse {
                out = reverse_images(&out);
            }
            write_images_txt(&output, &out)?;
            println!("Wrote {} images to {}", out.len(), output.display());
        }
        (TableFormat::Colmap, None) => {
            let edited = trajectory::apply(&loaded.sequence, &spec)?;
            let out = sequence_to_images(&edited)?;
            write_images_txt(&output, &out)?;
            println!("Wrote {} images to {}", out.len(), output.display());
        }
        (TableFormat::Csv, _) => {
            let edited = trajectory::apply(&loaded.sequence, &spec)?;
            write_poses_csv(&output, &edited)?;
            println!("Wrote {} poses to {}", edited.len(), output.display());
        }
    }
    Ok(())
}

fn cmd_suggest_scale(depth: &Path, target_size: f64) -> Result<()> {
    let table = read_depth_summary_csv(depth)?;
    let summary = summarize_depth(&table)?;
    let suggestion = trajectory::scale_from_depth(&table, target_size)?;
    println!("frames:            {}", summary.frames);
    println!("mean of means:     {:.6}", summary.mean_of_means);
    println!("median of medians: {:.6}", summary.median_of_medians);
    println!("depth range:       [{:.6}, {:.6}]", summary.min, summary.max);
    println!("target size:       {}", target_size);
    println!("suggested scale:   {:.6}", suggestion.scale);
    Ok(())
}

fn cmd_convert(args: ConvertArgs) -> Result<()> {
    let spec = args.edit.spec()?;
    let input = resolve_input(&args.input, args.format.table())?;
    let loaded = load_for_edit(&input, &args.input_args, &args.edit, &spec)?;

    let config = PipelineConfig {
        input_convention: loaded.sequence.convention(),
        input_direction: loaded.sequence.direction(),
        transform: spec,
        targets: args.to.iter().map(|&c| c.into()).collect(),
        position_scale: if args.centimeters { 100.0 } else { 1.0 },
        fps: args.fps,
        ..Default::default()
    };
    config.validate()?;

    let output = pipeline::run(&loaded.sequence, &config)?;
    write_outputs(&args.out_dir, &output, config.fps)?;
    println!(
        "Converted {} poses from {} into {}",
        output.edited.len(),
        input.path.display(),
        args.out_dir.display()
    );
    Ok(())
}

fn cmd_check(
    poses: &Path,
    input: &InputArgs,
    position_threshold: f64,
    rotation_threshold: f64,
) -> Result<()> {
    let seq = read_poses_csv(poses, input.input_convention.into(), input.direction.into())?;
    let stats = trajectory_stats(&seq);
    println!(
        "{} poses, path length {:.4}, mean step {:.4}, max step {:.4}, max turn {:.3} deg",
        seq.len(),
        stats.path_length,
        stats.mean_step,
        stats.max_step,
        stats.max_rotation_step_deg
    );

    let flagged = flag_discontinuities(&seq, position_threshold, rotation_threshold);
    if flagged.is_empty() {
        println!("No discontinuities");
        return Ok(());
    }
    for &i in &flagged {
        let pose = &seq.poses()[i];
        println!("discontinuity at index {} ({})", i, pose.frame_id);
    }
    bail!("{} discontinuities found", flagged.len())
}

fn cmd_diff(a: &Path, b: &Path, input: &InputArgs) -> Result<()> {
    let convention = input.input_convention.into();
    let direction = input.direction.into();
    let seq_a = read_poses_csv(a, convention, direction)?;
    let seq_b = read_poses_csv(b, convention, direction)?;

    let diff = diff_sequences(&seq_a, &seq_b);
    println!("compared frames:     {}", diff.deltas.len());
    println!("max position delta:  {:.8}", diff.max_position_delta());
    println!("max rotation delta:  {:.6} deg", diff.max_rotation_delta_deg());
    if !diff.frames_match() {
        println!("only in {}: {:?}", a.display(), diff.only_in_a);
        println!("only in {}: {:?}", b.display(), diff.only_in_b);
    }
    Ok(())
}

fn cmd_batch(config_path: &Path, inputs: &[PathBuf], out_dir: &Path, workers: usize) -> Result<()> {
    let config = PipelineConfig::from_yaml_file(config_path)?;
    let needs_depth = matches!(config.transform.scale, ScaleMode::FromDepth { .. });

    let mut jobs = Vec::with_capacity(inputs.len());
    for input in inputs {
        let resolved = resolve_input(input, None)?;
        let mut sequence =
            load_input(&resolved, config.input_convention, config.input_direction)?.sequence;
        if needs_depth {
            sequence = sequence.with_depth(load_batch_depth(&resolved.path)?);
        }
        jobs.push(BatchJob {
            name: job_name(input),
            sequence,
        });
    }

    let results = run_batch(jobs, &config, workers);
    let mut failed = 0usize;
    for result in &results {
        match &result.outcome {
            Ok(output) => {
                let dir = out_dir.join(&result.name);
                write_outputs(&dir, output, config.fps)?;
                println!(
                    "{}: {} poses, {} flagged -> {}",
                    result.name,
                    output.edited.len(),
                    output.total_flagged(),
                    dir.display()
                );
            }
            Err(e) => {
                failed += 1;
                println!("{}: FAILED: {}", result.name, e);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} sequences failed", failed, results.len());
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Load the input and attach depth when the edit scales from it.
fn load_for_edit(
    input: &ResolvedInput,
    input_args: &InputArgs,
    edit: &EditArgs,
    spec: &TransformSpec,
) -> Result<LoadedInput> {
    if input.format == TableFormat::Colmap {
        info!("{} is COLMAP: sfm, world-to-camera", input.path.display());
    }
    let mut loaded = load_input(
        input,
        input_args.input_convention.into(),
        input_args.direction.into(),
    )?;
    if matches!(spec.scale, ScaleMode::FromDepth { .. }) {
        let depth = read_depth_summary_csv(edit.depth_path(input))?;
        loaded.sequence = loaded.sequence.with_depth(depth);
    }
    Ok(loaded)
}

fn sibling(path: &Path, file_name: &str) -> PathBuf {
    path.with_file_name(file_name)
}

fn job_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `<stem>.depth.csv` next to the input, else the shared depth summary.
fn load_batch_depth(input: &Path) -> Result<BTreeMap<FrameId, DepthStats>> {
    let own = sibling(input, &format!("{}.depth.csv", job_name(input)));
    let path = if own.exists() {
        own
    } else {
        sibling(input, DEPTH_SUMMARY_FILE)
    };
    read_depth_summary_csv(&path)
        .with_context(|| format!("No depth summary for {}", input.display()))
}

/// Per target: a pose table, plus the engine table or keyframe JSON.
fn write_outputs(dir: &Path, output: &PipelineOutput, fps: f64) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    for (target, report) in &output.converted {
        let seq: &PoseSequence = &report.sequence;
        write_poses_csv(dir.join(format!("poses_{}.csv", target.name())), seq)?;
        match target {
            Convention::Engine => {
                write_engine_table_csv(dir.join("engine_poses.csv"), seq)?;
                write_keyframes_json(dir.join("keyframes_engine.json"), &build_keyframes(seq, fps)?)?;
            }
            Convention::ContentTool => {
                write_keyframes_json(dir.join("keyframes_content.json"), &build_keyframes(seq, fps)?)?;
            }
            Convention::Sfm => {}
        }
    }
    for check in &output.checks {
        if !check.flagged.is_empty() {
            warn!("{}: discontinuities at {:?}", check.stage, check.flagged);
        }
    }
    info!("Wrote outputs to {}", dir.display());
    Ok(())
}

