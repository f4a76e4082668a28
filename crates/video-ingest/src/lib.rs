//! Video input and output over ffmpeg.
//!
//! Frames travel as packed BGR24 buffers. Decoding and encoding run in ffmpeg
//! child processes connected by pipes, so any container, codec or camera
//! ffmpeg understands can be used without linking against it.

pub mod ffmpeg;
pub mod probe;
pub mod raw;
pub mod types;

pub use ffmpeg::{EncodeOptions, FfmpegReader, FfmpegWriter, parse_device_index};
pub use probe::{VideoInfo, probe};
pub use raw::{RawFrameReader, RawFrameWriter};
pub use types::{CaptureError, Frame, FrameFormat, FrameSize};
