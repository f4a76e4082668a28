use std::{
    path::Path,
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
};

use frame_pipeline::FrameReader;
use tracing::{debug, info, warn};

use crate::{
    raw::{RawFrameReader, RawFrameWriter},
    types::{CaptureError, Frame, FrameFormat, FrameSize},
};

/// Decodes any ffmpeg-readable input into packed BGR frames.
///
/// The decoder runs as a child process writing rawvideo to a pipe; frames are
/// pulled synchronously so the caller controls the pace.
pub struct FfmpegReader {
    child: Child,
    frames: RawFrameReader<ChildStdout>,
    uri: String,
}

impl FfmpegReader {
    pub fn open(uri: &str, size: FrameSize) -> Result<Self, CaptureError> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(decode_args(uri, size))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|source| CaptureError::Spawn {
            program: "ffmpeg",
            source,
        })?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(CaptureError::Open {
                uri: uri.to_string(),
            });
        };
        info!(uri, %size, "decoder started");

        Ok(Self {
            child,
            frames: RawFrameReader::new(stdout, size),
            uri: uri.to_string(),
        })
    }

    pub fn size(&self) -> FrameSize {
        self.frames.size()
    }

    /// Next decoded frame, or `None` once the decoder exits cleanly.
    pub fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        match self.frames.read_frame()? {
            Some(frame) => Ok(Some(frame)),
            None => {
                let status = self.child.wait()?;
                debug!(uri = %self.uri, frames = self.frames.frames(), %status, "decoder finished");
                if status.success() {
                    Ok(None)
                } else {
                    Err(CaptureError::ProcessFailed {
                        program: "ffmpeg",
                        status,
                    })
                }
            }
        }
    }
}

impl FrameReader for FfmpegReader {
    type Payload = Frame;

    fn read_next(&mut self) -> anyhow::Result<Option<Frame>> {
        Ok(self.read_frame()?)
    }
}

impl Drop for FfmpegReader {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Encoder settings, taken from the probed input.
#[derive(Clone, Debug)]
pub struct EncodeOptions {
    pub size: FrameSize,
    pub fps: f64,
    pub codec: String,
}

/// Encodes packed BGR frames to a video file through an ffmpeg child process.
///
/// [`finish`](Self::finish) must be called to flush the container; dropping an
/// unfinished writer kills the encoder.
pub struct FfmpegWriter {
    child: Child,
    frames: Option<RawFrameWriter<ChildStdin>>,
    path: String,
}

impl FfmpegWriter {
    pub fn create(path: impl AsRef<Path>, options: &EncodeOptions) -> Result<Self, CaptureError> {
        let path = path.as_ref().display().to_string();
        let mut cmd = Command::new("ffmpeg");
        cmd.args(encode_args(&path, options))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|source| CaptureError::Spawn {
            program: "ffmpeg",
            source,
        })?;
        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            return Err(CaptureError::Open { uri: path });
        };
        info!(
            output = %path,
            size = %options.size,
            fps = options.fps,
            codec = %options.codec,
            "encoder started"
        );

        Ok(Self {
            child,
            frames: Some(RawFrameWriter::new(stdin, options.size)),
            path,
        })
    }

    pub fn size(&self) -> Option<FrameSize> {
        self.frames.as_ref().map(RawFrameWriter::size)
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), CaptureError> {
        let writer = self.frames.as_mut().ok_or_else(|| CaptureError::Open {
            uri: self.path.clone(),
        })?;
        writer.write_frame(frame)
    }

    /// Close the encoder input and wait for the file to be written.
    pub fn finish(&mut self) -> Result<u64, CaptureError> {
        let Some(mut writer) = self.frames.take() else {
            return Ok(0);
        };
        writer.flush()?;
        let written = writer.frames();
        drop(writer.into_inner());

        let status = self.child.wait()?;
        if !status.success() {
            return Err(CaptureError::ProcessFailed {
                program: "ffmpeg",
                status,
            });
        }
        info!(output = %self.path, frames = written, "encoder finished");
        Ok(written)
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        if self.frames.is_some() {
            warn!(output = %self.path, "encoder dropped without finish; output is incomplete");
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Device index for camera inputs given as `0` or `/dev/video0`.
pub fn parse_device_index(uri: &str) -> Option<u32> {
    if let Ok(index) = uri.parse::<u32>() {
        return Some(index);
    }
    let stripped = uri.strip_prefix("/dev/video")?;
    if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
        return stripped.parse().ok();
    }
    None
}

pub(crate) fn is_v4l_source(uri: &str) -> bool {
    parse_device_index(uri).is_some() || uri.starts_with("/dev/video")
}

/// Path handed to ffmpeg: bare device indices become `/dev/videoN`.
pub(crate) fn resolve_source(uri: &str) -> String {
    match parse_device_index(uri) {
        Some(index) => format!("/dev/video{index}"),
        None => uri.to_string(),
    }
}

/// ffmpeg arguments decoding `uri` to rawvideo on stdout at `size`.
pub fn decode_args(uri: &str, size: FrameSize) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
        .map(String::from)
        .to_vec();
    if is_v4l_source(uri) {
        args.extend(["-f", "video4linux2"].map(String::from));
    }
    args.extend([
        "-i".to_string(),
        resolve_source(uri),
        "-an".to_string(),
        "-vf".to_string(),
        format!("scale={}:{}", size.width, size.height),
        "-pix_fmt".to_string(),
        FrameFormat::Bgr8.ffmpeg_pix_fmt().to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-".to_string(),
    ]);
    args
}

/// ffmpeg arguments encoding rawvideo from stdin into `path`.
pub fn encode_args(path: &str, options: &EncodeOptions) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        FrameFormat::Bgr8.ffmpeg_pix_fmt().into(),
        "-s".into(),
        options.size.to_string(),
        "-r".into(),
        format!("{}", options.fps),
        "-i".into(),
        "-".into(),
        "-c:v".into(),
        options.codec.clone(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        path.into(),
    ]
}
