use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use ml_core::TransformKind;
use video_ingest::FrameSize;

/// Apply a per-frame transform to a video on a pool of worker threads.
///
/// Frames are decoded in order, processed in parallel and written back in
/// their original order.
#[derive(Debug, Parser)]
#[command(name = "framepool", version)]
pub struct CliArgs {
    /// Video file, URL or camera device (`0`, `/dev/video0`).
    #[arg(long, short = 'i', value_name = "URI", default_value = "input.mp4")]
    pub input: String,
    /// Output video path.
    #[arg(long, short = 'o', value_name = "PATH", default_value = "output.mp4")]
    pub output: String,

    /// Number of worker threads. Overrides `--use-mt`.
    #[arg(long, short = 'w', value_name = "N")]
    pub workers: Option<usize>,
    /// `1` runs the multi-threaded pool (20 workers), `0` a single worker.
    #[arg(long = "use-mt", alias = "use_mt", value_name = "0|1", default_value_t = 1)]
    pub use_mt: u8,

    /// Operation applied to every frame.
    #[arg(long, short = 't', value_name = "NAME", default_value = "stamp")]
    pub transform: TransformKind,
    /// Gaussian sigma for `--transform blur`.
    #[arg(long = "blur-radius", value_name = "PX", default_value_t = 2.0)]
    pub blur_radius: f32,
    /// TorchScript model for `--transform detect`.
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,
    /// Run detection on the CPU.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub cpu: bool,

    /// When results are written out.
    #[arg(long, value_enum, default_value_t = DrainArg::Streaming)]
    pub drain: DrainArg,
    /// What to write in place of a frame whose transform failed.
    #[arg(long = "on-item-error", value_enum, default_value_t = ItemErrorArg::Hold)]
    pub on_item_error: ItemErrorArg,
    /// Fail the run when the input ends with a read error.
    #[arg(long = "strict-input", action = clap::ArgAction::SetTrue)]
    pub strict_input: bool,

    /// Read and write headerless BGR24 frames of this size instead of video.
    #[arg(long, value_name = "WxH")]
    pub raw: Option<FrameSize>,
    /// Output frame rate; defaults to the input's.
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f64>,
    /// ffmpeg video encoder for the output.
    #[arg(long, value_name = "CODEC", default_value = "mpeg4")]
    pub codec: String,

    /// Log at debug level unless `RUST_LOG` is set.
    #[arg(long, short = 'v', action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
    /// Write a Chrome trace JSON file of pipeline spans.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
    /// Write Prometheus text metrics here when the run ends.
    #[arg(long = "metrics-out", value_name = "PATH")]
    pub metrics_out: Option<PathBuf>,
    /// How often progress is logged.
    #[arg(long = "progress-interval-ms", value_name = "MS", default_value_t = 1000)]
    pub progress_interval_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DrainArg {
    /// Write each frame as soon as every earlier frame is done.
    Streaming,
    /// Collect all results and write them after the input is exhausted.
    Deferred,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ItemErrorArg {
    /// Repeat the last good frame.
    Hold,
    /// Write a black frame.
    Black,
    /// Stop the run.
    Abort,
}
