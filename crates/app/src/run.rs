//! One end-to-end run: open input and output, drive the frame pipeline, close
//! everything down.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    sync::{Arc, Once},
    time::Instant,
};

use anyhow::{Context, Result};
use frame_pipeline::{
    Cancellation, EndReason, FrameReader, LatestCell, Pipeline, PipelineConfig, PipelineReport,
};
use tracing::{info, warn};
use video_ingest::{
    EncodeOptions, FfmpegReader, FfmpegWriter, Frame, FrameSize, RawFrameReader, RawFrameWriter,
    probe,
};

use crate::{
    config::RunConfig,
    monitor::ProgressMonitor,
    sink::{FrameSink, FrameWrite},
};

type BoxedReader = Box<dyn FrameReader<Payload = Frame>>;
type BoxedWriter = Box<dyn FrameWrite>;

pub(crate) struct RunSummary {
    pub report: PipelineReport,
    pub placeholders: u64,
}

pub(crate) fn run(config: &RunConfig) -> Result<RunSummary> {
    let started = Instant::now();
    announce(config, &format!("Thread count: {}", config.workers));

    let (reader, size, fps) = open_input(config)?;
    let writer = open_output(config, size, fps)?;
    let mut sink = FrameSink::new(writer, size, config.on_item_error);

    let cancel = Cancellation::new();
    install_ctrlc(cancel.clone());

    let progress = Arc::new(LatestCell::new());
    let monitor = ProgressMonitor::spawn(progress.clone(), config.progress_interval)
        .context("failed to spawn progress monitor")?;

    let spec = config.transform.clone();
    let factory = move |worker: usize| -> Result<_> { Ok(spec.build(worker)?) };
    let mut pipeline = Pipeline::new(
        PipelineConfig::new(config.workers)
            .with_drain(config.drain)
            .with_strict_input(config.strict_input),
    )
    .with_cancellation(cancel)
    .with_progress(progress);

    info!(
        input = %config.input,
        output = %config.output,
        workers = config.workers,
        transform = %config.transform.kind(),
        "starting"
    );
    let result = pipeline.run(reader, factory, &mut sink);
    monitor.stop();
    let report = result.context("frame pipeline failed")?;

    if let EndReason::Truncated(reason) = &report.end {
        warn!(frames = report.frames, "input ended early: {reason}");
    }
    announce(
        config,
        &format!(
            "Finished processing at {:.2} seconds.",
            started.elapsed().as_secs_f64()
        ),
    );
    Ok(RunSummary {
        placeholders: sink.placeholders(),
        report,
    })
}

fn open_input(config: &RunConfig) -> Result<(BoxedReader, FrameSize, Option<f64>)> {
    if let Some(size) = config.raw {
        let input: Box<dyn Read> = if config.input == "-" {
            Box::new(io::stdin().lock())
        } else {
            let file = File::open(&config.input)
                .with_context(|| format!("failed to open raw input {}", config.input))?;
            Box::new(BufReader::new(file))
        };
        return Ok((Box::new(RawFrameReader::new(input, size)), size, None));
    }

    let info = probe(&config.input).with_context(|| format!("failed to probe {}", config.input))?;
    info!(size = %info.size, fps = info.fps, "input probed");
    let reader = FfmpegReader::open(&config.input, info.size)
        .with_context(|| format!("failed to start decoder for {}", config.input))?;
    Ok((Box::new(reader), info.size, Some(info.fps)))
}

fn open_output(config: &RunConfig, size: FrameSize, input_fps: Option<f64>) -> Result<BoxedWriter> {
    if config.raw.is_some() {
        let output: Box<dyn Write> = if config.output == "-" {
            Box::new(io::stdout().lock())
        } else {
            let file = File::create(&config.output)
                .with_context(|| format!("failed to create raw output {}", config.output))?;
            Box::new(BufWriter::new(file))
        };
        return Ok(Box::new(RawFrameWriter::new(output, size)));
    }

    let options = EncodeOptions {
        size,
        fps: config
            .fps
            .or(input_fps)
            .unwrap_or(video_ingest::probe::FALLBACK_FPS),
        codec: config.codec.clone(),
    };
    let writer = FfmpegWriter::create(&config.output, &options)
        .with_context(|| format!("failed to start encoder for {}", config.output))?;
    Ok(Box::new(writer))
}

/// Console status line; goes to stderr when stdout carries raw frames.
fn announce(config: &RunConfig, line: &str) {
    if config.raw.is_some() && config.output == "-" {
        eprintln!("{line}");
    } else {
        println!("{line}");
    }
}

fn install_ctrlc(cancel: Cancellation) {
    static CTRL_HANDLER: Once = Once::new();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler(move || {
            if !cancel.is_cancelled() {
                eprintln!("Interrupted, finishing frames in progress...");
            }
            cancel.cancel();
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });
}
