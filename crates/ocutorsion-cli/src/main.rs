//! ocutorsion CLI — ocular torsion estimation over image sequences.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ocutorsion::{
    BorderMode, EyelidBoundary, FrameInput, Interpolation, PupilEstimate, TorsionConfig,
    TorsionEstimate, TorsionTracker, UnwrapConfig,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

#[derive(Parser)]
#[command(name = "ocutorsion")]
#[command(about = "Estimate ocular torsion from iris image sequences")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track torsion over a directory of frames.
    Track(CliTrackArgs),

    /// Unwrap the iris band of one image for inspection.
    Unwrap(CliUnwrapArgs),

    /// Print the default configuration as JSON.
    DefaultConfig,
}

#[derive(Debug, Clone, Args)]
struct CliTrackArgs {
    /// Directory of frame images, processed in file-name order.
    #[arg(long)]
    frames: PathBuf,

    /// Per-frame pupil/eyelid estimates (JSON array of frame records).
    #[arg(long)]
    estimates: PathBuf,

    /// Index of the calibration frame.
    #[arg(long, default_value = "0")]
    calibration: usize,

    /// Configuration JSON (defaults are used for missing fields).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to write the torsion series (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Frames loaded and processed per batch.
    #[arg(long, default_value = "64")]
    chunk: usize,

    /// Frame rate; reported velocities are in deg/s when set, deg/frame otherwise.
    #[arg(long)]
    fps: Option<f64>,

    /// Process frames on a single thread.
    #[arg(long)]
    sequential: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InterpolationArg {
    Nearest,
    Bilinear,
    Bicubic,
}

impl From<InterpolationArg> for Interpolation {
    fn from(v: InterpolationArg) -> Self {
        match v {
            InterpolationArg::Nearest => Interpolation::Nearest,
            InterpolationArg::Bilinear => Interpolation::Bilinear,
            InterpolationArg::Bicubic => Interpolation::Bicubic,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct CliUnwrapArgs {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    /// Pupil center x (pixels).
    #[arg(long)]
    cx: f64,

    /// Pupil center y (pixels).
    #[arg(long)]
    cy: f64,

    /// Pupil radius (pixels).
    #[arg(long)]
    radius: f64,

    /// Radial thickness of the unwrapped band (pixels).
    #[arg(long, default_value_t = UnwrapConfig::DEFAULT_IRIS_THICKNESS)]
    thickness: f64,

    /// Number of angle bins.
    #[arg(long, default_value_t = UnwrapConfig::DEFAULT_THETA_RESOLUTION)]
    theta_resolution: usize,

    /// Number of radius bins.
    #[arg(long, default_value_t = UnwrapConfig::DEFAULT_RADIUS_RESOLUTION)]
    radius_resolution: usize,

    /// Resampling kernel.
    #[arg(long, value_enum, default_value_t = InterpolationArg::Bilinear)]
    interpolation: InterpolationArg,

    /// Replicate border pixels instead of marking out-of-frame samples invalid.
    #[arg(long)]
    replicate_border: bool,

    /// Path to write the polar image (PNG).
    #[arg(long)]
    out: PathBuf,
}

/// One entry of the `--estimates` file.
#[derive(Debug, Clone, serde::Deserialize)]
struct FrameRecord {
    index: usize,
    pupil: PupilEstimate,
    #[serde(default)]
    eyelid: EyelidBoundary,
}

#[derive(serde::Serialize)]
struct TrackOutput<'a> {
    reference_index: usize,
    frames_total: usize,
    valid_fraction: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    fps: Option<f64>,
    estimates: &'a [TorsionEstimate],
    angular_velocity: Vec<Option<f64>>,
    config: &'a TorsionConfig,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Track(args) => run_track(&args),
        Commands::Unwrap(args) => run_unwrap(&args),
        Commands::DefaultConfig => run_default_config(),
    }
}

// ── default-config ─────────────────────────────────────────────────────

fn run_default_config() -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(&TorsionConfig::default())?);
    Ok(())
}

// ── unwrap ─────────────────────────────────────────────────────────────

fn run_unwrap(args: &CliUnwrapArgs) -> CliResult<()> {
    let gray = load_gray(&args.image)?;
    let pupil = PupilEstimate::circle(args.cx, args.cy, args.radius);
    let config = UnwrapConfig {
        theta_resolution: args.theta_resolution,
        radius_resolution: args.radius_resolution,
        iris_thickness: args.thickness,
        interpolation: args.interpolation.into(),
        border: if args.replicate_border {
            BorderMode::Replicate
        } else {
            BorderMode::Invalid
        },
        ..Default::default()
    };

    let polar = ocutorsion::unwrap_iris(&gray, &pupil, &config)?;
    tracing::info!(
        "Unwrapped {}x{} band, radii [{:.1}, {:.1}], {:.1}% valid",
        polar.n_radius(),
        polar.n_theta(),
        polar.inner_radius(),
        polar.outer_radius(),
        polar.valid_fraction() * 100.0
    );
    polar.to_gray_image().save(&args.out)?;
    tracing::info!("Polar image written to {}", args.out.display());
    Ok(())
}

// ── track ──────────────────────────────────────────────────────────────

fn load_gray(path: &Path) -> CliResult<image::GrayImage> {
    let img = image::open(path).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", path.display(), e).into()
    })?;
    Ok(img.to_luma8())
}

fn list_frames(dir: &Path) -> CliResult<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

fn load_records(path: &Path) -> CliResult<BTreeMap<usize, FrameRecord>> {
    let data = std::fs::read_to_string(path)?;
    let records: Vec<FrameRecord> = serde_json::from_str(&data)?;
    Ok(records.into_iter().map(|r| (r.index, r)).collect())
}

fn run_track(args: &CliTrackArgs) -> CliResult<()> {
    let mut config = match &args.config {
        Some(path) => TorsionConfig::from_json_file(path)?,
        None => TorsionConfig::default(),
    };
    if args.sequential {
        config.parallel = false;
    }
    if args.chunk == 0 {
        return Err("--chunk must be positive".into());
    }

    let frames = list_frames(&args.frames)?;
    let records = load_records(&args.estimates)?;
    tracing::info!(
        "{} frames in {}, {} frame records",
        frames.len(),
        args.frames.display(),
        records.len()
    );

    let calib_path = frames
        .get(args.calibration)
        .ok_or_else(|| -> CliError { format!("no frame with index {}", args.calibration).into() })?;
    let calib = records.get(&args.calibration).ok_or_else(|| -> CliError {
        format!("no pupil estimate for calibration frame {}", args.calibration).into()
    })?;

    let mut tracker = TorsionTracker::new(config)?;
    let calib_img = load_gray(calib_path)?;
    tracker.calibrate(args.calibration, &calib_img, &calib.pupil, &calib.eyelid)?;

    // Only frames with an upstream estimate are processed.
    let indices: Vec<usize> = (0..frames.len())
        .filter(|i| {
            let known = records.contains_key(i);
            if !known {
                tracing::warn!("frame {}: no pupil estimate, skipped", i);
            }
            known
        })
        .collect();

    for chunk in indices.chunks(args.chunk) {
        let images = chunk
            .iter()
            .map(|&i| load_gray(&frames[i]))
            .collect::<CliResult<Vec<_>>>()?;
        let inputs: Vec<FrameInput<'_>> = chunk
            .iter()
            .zip(&images)
            .filter_map(|(i, frame)| {
                records.get(i).map(|r| FrameInput {
                    index: *i,
                    frame,
                    pupil: r.pupil,
                    eyelid: r.eyelid,
                })
            })
            .collect();
        tracker.run_batch(&inputs, None)?;
    }

    tracker.finish()?;
    let series = tracker.series();
    tracing::info!(
        "Tracked {} frames, {:.1}% valid",
        series.len(),
        series.valid_fraction() * 100.0
    );
    for idx in series.invalid_indices() {
        if let Some(reason) = series.get(idx).and_then(|e| e.failure_reason) {
            tracing::debug!("frame {}: {}", idx, reason);
        }
    }

    let output = TrackOutput {
        reference_index: args.calibration,
        frames_total: frames.len(),
        valid_fraction: series.valid_fraction(),
        fps: args.fps,
        estimates: series.estimates(),
        angular_velocity: series.angular_velocity(args.fps),
        config: tracker.config(),
    };
    let json = serde_json::to_string_pretty(&output)?;
    std::fs::write(&args.out, &json)?;
    tracing::info!("Results written to {}", args.out.display());
    Ok(())
}
