use std::{fmt, io, str::FromStr};

use thiserror::Error;

/// Packed BGR frame as produced by the decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Position in the decoded stream, starting at 0.
    pub sequence: u64,
    /// Wall-clock capture time in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

impl FrameFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            FrameFormat::Bgr8 => 3,
        }
    }

    /// Name of the matching ffmpeg pixel format.
    pub fn ffmpeg_pix_fmt(self) -> &'static str {
        match self {
            FrameFormat::Bgr8 => "bgr24",
        }
    }
}

/// Frame dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Bytes in one packed frame of `format`.
    pub fn frame_bytes(self, format: FrameFormat) -> usize {
        self.width as usize * self.height as usize * format.bytes_per_pixel()
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for FrameSize {
    type Err = CaptureError;

    /// Parses `WIDTHxHEIGHT`, e.g. `1280x720`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CaptureError::InvalidSize(s.to_string());
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(invalid)?;
        let width: u32 = w.parse().map_err(|_| invalid())?;
        let height: u32 = h.parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

impl Frame {
    /// Wrap packed BGR bytes, checking that the buffer matches the dimensions.
    pub fn from_bgr(size: FrameSize, data: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = size.frame_bytes(FrameFormat::Bgr8);
        if data.len() != expected {
            return Err(CaptureError::FrameLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width: size.width,
            height: size.height,
            sequence: 0,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        })
    }

    /// All-zero frame of the given size.
    pub fn black(size: FrameSize) -> Self {
        Self {
            data: vec![0; size.frame_bytes(FrameFormat::Bgr8)],
            width: size.width,
            height: size.height,
            sequence: 0,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    /// Whether `data` holds exactly one frame of the declared size.
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.size().frame_bytes(self.format)
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("failed to launch {program}")]
    Spawn {
        program: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}")]
    ProcessFailed {
        program: &'static str,
        status: std::process::ExitStatus,
    },
    #[error("could not read stream metadata for {uri:?}: {reason}")]
    Probe { uri: String, reason: String },
    #[error("invalid frame size {0:?}, expected WIDTHxHEIGHT")]
    InvalidSize(String),
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    FrameLength { expected: usize, actual: usize },
    #[error("frame is {actual}, stream is {expected}")]
    SizeMismatch { expected: FrameSize, actual: FrameSize },
    #[error("stream ended inside a frame ({read} of {expected} bytes)")]
    PartialFrame { read: usize, expected: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frame_size() {
        assert_eq!("1280x720".parse::<FrameSize>().unwrap(), FrameSize::new(1280, 720));
        assert_eq!(" 64X48 ".parse::<FrameSize>().unwrap(), FrameSize::new(64, 48));
        assert!("1280".parse::<FrameSize>().is_err());
        assert!("0x720".parse::<FrameSize>().is_err());
        assert!("axb".parse::<FrameSize>().is_err());
    }

    #[test]
    fn from_bgr_checks_length() {
        let size = FrameSize::new(4, 2);
        assert!(Frame::from_bgr(size, vec![0; 24]).is_ok());
        assert!(matches!(
            Frame::from_bgr(size, vec![0; 23]),
            Err(CaptureError::FrameLength {
                expected: 24,
                actual: 23
            })
        ));
    }

    #[test]
    fn black_frame_is_consistent() {
        let frame = Frame::black(FrameSize::new(3, 3));
        assert!(frame.is_consistent());
        assert!(frame.data.iter().all(|&b| b == 0));
    }
}
