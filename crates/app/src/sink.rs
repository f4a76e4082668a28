use std::io::Write;

use anyhow::{Result, bail};
use frame_pipeline::{Outcome, ResultSink};
use tracing::warn;
use video_ingest::{CaptureError, FfmpegWriter, Frame, FrameSize, RawFrameWriter};

use crate::config::ItemErrorPolicy;

/// Output device for ordered frames.
pub(crate) trait FrameWrite {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), CaptureError>;

    /// Flush and close; returns frames written.
    fn finish(&mut self) -> Result<u64, CaptureError>;
}

impl<W: FrameWrite + ?Sized> FrameWrite for Box<W> {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), CaptureError> {
        (**self).write_frame(frame)
    }

    fn finish(&mut self) -> Result<u64, CaptureError> {
        (**self).finish()
    }
}

impl FrameWrite for FfmpegWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), CaptureError> {
        FfmpegWriter::write_frame(self, frame)
    }

    fn finish(&mut self) -> Result<u64, CaptureError> {
        FfmpegWriter::finish(self)
    }
}

impl<W: Write> FrameWrite for RawFrameWriter<W> {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), CaptureError> {
        RawFrameWriter::write_frame(self, frame)
    }

    fn finish(&mut self) -> Result<u64, CaptureError> {
        self.flush()?;
        Ok(self.frames())
    }
}

/// Writes pipeline results to a [`FrameWrite`], substituting a placeholder
/// for frames whose transform failed.
pub(crate) struct FrameSink<W> {
    writer: W,
    size: FrameSize,
    policy: ItemErrorPolicy,
    last_good: Option<Frame>,
    placeholders: u64,
}

impl<W: FrameWrite> FrameSink<W> {
    pub(crate) fn new(writer: W, size: FrameSize, policy: ItemErrorPolicy) -> Self {
        Self {
            writer,
            size,
            policy,
            last_good: None,
            placeholders: 0,
        }
    }

    /// Frames written in place of failed transforms.
    pub(crate) fn placeholders(&self) -> u64 {
        self.placeholders
    }

    #[cfg(test)]
    pub(crate) fn into_writer(self) -> W {
        self.writer
    }

    fn placeholder(&self, index: u64) -> Frame {
        let frame = match (&self.policy, &self.last_good) {
            (ItemErrorPolicy::Hold, Some(previous)) => previous.clone(),
            _ => Frame::black(self.size),
        };
        frame.with_sequence(index)
    }
}

impl<W: FrameWrite> ResultSink<Frame> for FrameSink<W> {
    fn write(&mut self, index: u64, outcome: Outcome<Frame>) -> Result<()> {
        match outcome {
            Ok(frame) => {
                self.writer.write_frame(&frame)?;
                if self.policy == ItemErrorPolicy::Hold {
                    self.last_good = Some(frame);
                }
            }
            Err(failure) => {
                if self.policy == ItemErrorPolicy::Abort {
                    bail!("transform failed for frame #{index}: {failure}");
                }
                warn!(frame = index, policy = ?self.policy, "writing placeholder: {failure}");
                let placeholder = self.placeholder(index);
                self.writer.write_frame(&placeholder)?;
                self.placeholders += 1;
                metrics::counter!("framepool_placeholder_frames_total").increment(1);
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.finish()?;
        Ok(())
    }
}
