//! Fossil sandbox runner.
//!
//! Builds a scene from a fossil list, then composites a recorded depth stream
//! against it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use glam::Vec2;

use fossil_sandbox::calibration::{CalibrationHandle, PerspectiveCalibrator, Recompute};
use fossil_sandbox::compositor::FrameCompositor;
use fossil_sandbox::config::{load_fossil_specs, SandboxConfig};
use fossil_sandbox::display::{
    load_monitors, select_projector, DisplaySink, ImageSequenceSink, NullSink,
};
use fossil_sandbox::scene::{PlacementOutcome, Scene, SceneBuilder};
use fossil_sandbox::sensor::{ReplayDriver, SensorHandle};
use fossil_sandbox::session::SandboxSession;
use fossil_sandbox::telemetry::{init_logging, LogConfig};

/// AR sandbox compositor over a recorded depth stream.
#[derive(Debug, Parser)]
#[command(author, version, about = "Reveal buried fossils as the sand is dug away")]
struct Args {
    /// JSON session configuration. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON list of fossil specs.
    #[arg(long)]
    fossils: PathBuf,

    /// Directory of 16-bit PNG depth frames.
    #[arg(long)]
    replay: PathBuf,

    /// Write composites here as a numbered PNG sequence.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Resize written frames to the projector resolution, as `WxH`.
    #[arg(long, value_parser = parse_size)]
    projector_size: Option<(u32, u32)>,

    /// JSON list of connected displays; the projector's resolution is used
    /// when `--projector-size` is not given.
    #[arg(long)]
    monitors: Option<PathBuf>,

    /// Override the placement seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Sensor-space control points as `x,y;x,y;x,y;x,y` (TL, TR, BR, BL).
    #[arg(long)]
    corners: Option<String>,

    /// Pace playback to one frame per interval.
    #[arg(long)]
    frame_interval_ms: Option<u64>,

    /// Console log format (`text` or `json`).
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Also log to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_config = LogConfig {
        json_format: args.log_format.eq_ignore_ascii_case("json"),
        file_path: args.log_file.clone(),
        ..LogConfig::default()
    };
    let _log_guard = init_logging(&log_config)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let mut config = match &args.config {
        Some(path) => SandboxConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SandboxConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let scene = build_scene(&config, &args.fossils)?;
    let calibration = calibration_from_args(&config, args.corners.as_deref())?;

    let mut driver = ReplayDriver::open(&args.replay)?;
    if let Some(ms) = args.frame_interval_ms {
        driver = driver.with_frame_interval(Duration::from_millis(ms));
    }
    let sensor = SensorHandle::open(driver, 0)?;
    let compositor = FrameCompositor::new(&config);

    match &args.output {
        Some(dir) => {
            let mut sink = ImageSequenceSink::new(dir)?;
            if let Some((width, height)) = projector_size(&args)? {
                tracing::info!(width, height, "Resizing output to projector resolution");
                sink = sink.with_output_size(width, height);
            }
            run(scene, compositor, calibration, sensor, sink)
        }
        None => run(scene, compositor, calibration, sensor, NullSink),
    }
}

fn projector_size(args: &Args) -> anyhow::Result<Option<(u32, u32)>> {
    if args.projector_size.is_some() {
        return Ok(args.projector_size);
    }
    let Some(path) = &args.monitors else {
        return Ok(None);
    };
    let monitors = load_monitors(path)
        .with_context(|| format!("loading display list {}", path.display()))?;
    Ok(select_projector(&monitors).map(|m| m.size))
}

fn parse_size(text: &str) -> Result<(u32, u32), String> {
    let (w, h) = text
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH but got {text:?}"))?;
    let parse = |v: &str| v.trim().parse::<u32>().map_err(|e| format!("{v:?}: {e}"));
    match (parse(w)?, parse(h)?) {
        (0, _) | (_, 0) => Err(format!("projector size {text:?} must be non-zero")),
        size => Ok(size),
    }
}

fn build_scene(config: &SandboxConfig, fossils: &Path) -> anyhow::Result<Scene> {
    let specs = load_fossil_specs(fossils)
        .with_context(|| format!("loading fossil list {}", fossils.display()))?;

    let mut builder = SceneBuilder::from_config(config);
    let build = builder.build(&specs, config.canvas.width, config.canvas.height)?;

    for outcome in &build.outcomes {
        match outcome {
            PlacementOutcome::Placed(_) => {}
            PlacementOutcome::Skipped { fossil, reason } => {
                tracing::warn!(name = %fossil.name, ?reason, "Fossil not placed");
            }
            PlacementOutcome::LoadFailed { name, reason, .. } => {
                tracing::warn!(%name, %reason, "Fossil skipped after load failure");
            }
        }
    }
    Ok(build.scene)
}

fn calibration_from_args(
    config: &SandboxConfig,
    corners: Option<&str>,
) -> anyhow::Result<CalibrationHandle> {
    let handle = CalibrationHandle::new(PerspectiveCalibrator::new(
        config.canvas.width,
        config.canvas.height,
    ));
    if let Some(text) = corners {
        let points = parse_corners(text)?;
        if handle.set_control_points(points) == Recompute::Retained {
            bail!("control points {text:?} do not define a valid perspective mapping");
        }
    }
    Ok(handle)
}

fn parse_corners(text: &str) -> anyhow::Result<[Vec2; 4]> {
    let points = text
        .split(';')
        .map(|pair| -> anyhow::Result<Vec2> {
            let (x, y) = pair
                .split_once(',')
                .with_context(|| format!("expected x,y but got {pair:?}"))?;
            Ok(Vec2::new(x.trim().parse()?, y.trim().parse()?))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    points
        .try_into()
        .map_err(|v: Vec<Vec2>| anyhow::anyhow!("expected 4 control points, got {}", v.len()))
}

fn run<K: DisplaySink>(
    scene: Scene,
    compositor: FrameCompositor,
    calibration: CalibrationHandle,
    sensor: SensorHandle<ReplayDriver>,
    sink: K,
) -> anyhow::Result<()> {
    let mut session = SandboxSession::new(scene, compositor, calibration, sensor, sink);
    session.run()?;
    Ok(())
}
