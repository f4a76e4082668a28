//! Translation of CLI arguments into a validated [`RunConfig`].

use std::{path::PathBuf, time::Duration};

use anyhow::{Result, anyhow, bail};
use frame_pipeline::DrainMode;
use ml_core::{DetectorConfig, TransformKind, TransformSpec};
use video_ingest::FrameSize;

use crate::cli::{CliArgs, DrainArg, ItemErrorArg};

/// Worker count behind `--use-mt 1`.
pub const MULTI_THREADED_WORKERS: usize = 20;
const MIN_PROGRESS_INTERVAL_MS: u64 = 50;

/// What the output sink writes for a frame whose transform failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemErrorPolicy {
    /// Repeat the last successfully transformed frame, or black before the first.
    Hold,
    Black,
    /// Fail the run.
    Abort,
}

#[derive(Clone, Debug, Default)]
pub struct TelemetryOptions {
    pub verbose: bool,
    /// Chrome trace JSON output capturing pipeline spans.
    pub chrome_trace_path: Option<PathBuf>,
    /// Prometheus text dump written at exit.
    pub metrics_out: Option<PathBuf>,
}

/// Everything a run needs, checked up front.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub input: String,
    pub output: String,
    pub workers: usize,
    pub transform: TransformSpec,
    pub drain: DrainMode,
    pub on_item_error: ItemErrorPolicy,
    pub strict_input: bool,
    /// Raw BGR24 streams of this size instead of ffmpeg decode/encode.
    pub raw: Option<FrameSize>,
    pub fps: Option<f64>,
    pub codec: String,
    pub progress_interval: Duration,
    pub telemetry: TelemetryOptions,
}

impl TryFrom<CliArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self> {
        if args.input.trim().is_empty() {
            bail!("--input must not be empty");
        }
        if args.output.trim().is_empty() {
            bail!("--output must not be empty");
        }

        let workers = match (args.workers, args.use_mt) {
            (Some(0), _) => bail!("--workers must be at least 1"),
            (Some(n), _) => n,
            (None, 0) => 1,
            (None, 1) => MULTI_THREADED_WORKERS,
            (None, other) => bail!("--use-mt must be 0 or 1, got {other}"),
        };

        let transform = match args.transform {
            TransformKind::Passthrough => TransformSpec::Passthrough,
            TransformKind::Grayscale => TransformSpec::Grayscale,
            TransformKind::Invert => TransformSpec::Invert,
            TransformKind::Blur => TransformSpec::Blur {
                sigma: args.blur_radius,
            },
            TransformKind::Stamp => TransformSpec::Stamp,
            TransformKind::Detect => {
                let model = args
                    .model
                    .ok_or_else(|| anyhow!("--transform detect requires --model <path>"))?;
                let mut detector = DetectorConfig::new(model);
                detector.cpu = args.cpu;
                TransformSpec::Detect(detector)
            }
        };
        transform.validate()?;

        if let Some(fps) = args.fps {
            if !(fps.is_finite() && fps > 0.0) {
                bail!("--fps must be a positive number, got {fps}");
            }
        }
        if args.codec.trim().is_empty() {
            bail!("--codec must not be empty");
        }
        if args.progress_interval_ms < MIN_PROGRESS_INTERVAL_MS {
            bail!("--progress-interval-ms must be at least {MIN_PROGRESS_INTERVAL_MS}");
        }

        let drain = match args.drain {
            DrainArg::Streaming => DrainMode::Streaming,
            DrainArg::Deferred => DrainMode::Deferred,
        };
        let on_item_error = match args.on_item_error {
            ItemErrorArg::Hold => ItemErrorPolicy::Hold,
            ItemErrorArg::Black => ItemErrorPolicy::Black,
            ItemErrorArg::Abort => ItemErrorPolicy::Abort,
        };

        Ok(Self {
            input: args.input,
            output: args.output,
            workers,
            transform,
            drain,
            on_item_error,
            strict_input: args.strict_input,
            raw: args.raw,
            fps: args.fps,
            codec: args.codec,
            progress_interval: Duration::from_millis(args.progress_interval_ms),
            telemetry: TelemetryOptions {
                verbose: args.verbose,
                chrome_trace_path: args.chrome_trace,
                metrics_out: args.metrics_out,
            },
        })
    }
}
