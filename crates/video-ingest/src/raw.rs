//! Fixed-size raw frame streams.
//!
//! Both the ffmpeg subprocess pipes and `--raw` files carry frames as packed
//! BGR24 bytes back to back with no header, so reading and writing reduce to
//! moving exactly `width * height * 3` bytes at a time.

use std::io::{ErrorKind, Read, Write};

use frame_pipeline::FrameReader;

use crate::types::{CaptureError, Frame, FrameFormat, FrameSize};

pub struct RawFrameReader<R> {
    inner: R,
    size: FrameSize,
    frames: u64,
}

impl<R: Read> RawFrameReader<R> {
    pub fn new(inner: R, size: FrameSize) -> Self {
        Self {
            inner,
            size,
            frames: 0,
        }
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    /// Frames read so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Read one frame. End of stream on a frame boundary is `Ok(None)`; end of
    /// stream inside a frame is [`CaptureError::PartialFrame`].
    pub fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let expected = self.size.frame_bytes(FrameFormat::Bgr8);
        let mut buffer = vec![0u8; expected];
        let mut filled = 0;
        while filled < expected {
            match self.inner.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }

        match filled {
            0 => Ok(None),
            n if n == expected => {
                let frame = Frame::from_bgr(self.size, buffer)?.with_sequence(self.frames);
                self.frames += 1;
                Ok(Some(frame))
            }
            read => Err(CaptureError::PartialFrame { read, expected }),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> FrameReader for RawFrameReader<R> {
    type Payload = Frame;

    fn read_next(&mut self) -> anyhow::Result<Option<Frame>> {
        Ok(self.read_frame()?)
    }
}

pub struct RawFrameWriter<W> {
    inner: W,
    size: FrameSize,
    frames: u64,
}

impl<W: Write> RawFrameWriter<W> {
    pub fn new(inner: W, size: FrameSize) -> Self {
        Self {
            inner,
            size,
            frames: 0,
        }
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Write one frame; its dimensions must match the stream.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), CaptureError> {
        if frame.size() != self.size {
            return Err(CaptureError::SizeMismatch {
                expected: self.size,
                actual: frame.size(),
            });
        }
        if !frame.is_consistent() {
            return Err(CaptureError::FrameLength {
                expected: self.size.frame_bytes(frame.format),
                actual: frame.data.len(),
            });
        }
        self.inner.write_all(&frame.data)?;
        self.frames += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), CaptureError> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn frame(size: FrameSize, fill: u8) -> Frame {
        Frame::from_bgr(size, vec![fill; size.frame_bytes(FrameFormat::Bgr8)]).unwrap()
    }

    #[test]
    fn reads_back_written_frames() {
        let size = FrameSize::new(4, 3);
        let mut writer = RawFrameWriter::new(Vec::new(), size);
        for fill in [10, 20, 30] {
            writer.write_frame(&frame(size, fill)).unwrap();
        }
        assert_eq!(writer.frames(), 3);

        let mut reader = RawFrameReader::new(Cursor::new(writer.into_inner()), size);
        let frames: Vec<Frame> = std::iter::from_fn(|| reader.read_frame().unwrap()).collect();
        let fills: Vec<u8> = frames.iter().map(|f| f.data[0]).collect();
        let sequence: Vec<u64> = frames.iter().map(|f| f.sequence).collect();
        assert_eq!(fills, vec![10, 20, 30]);
        assert_eq!(sequence, vec![0, 1, 2]);
        assert_eq!(reader.frames(), 3);
    }

    #[test]
    fn trailing_partial_frame_is_an_error() {
        let size = FrameSize::new(2, 2);
        let mut bytes = vec![1u8; size.frame_bytes(FrameFormat::Bgr8)];
        bytes.extend_from_slice(&[2, 2, 2, 2, 2]);
        let mut reader = RawFrameReader::new(Cursor::new(bytes), size);

        assert!(reader.read_frame().unwrap().is_some());
        assert!(matches!(
            reader.read_frame(),
            Err(CaptureError::PartialFrame {
                read: 5,
                expected: 12
            })
        ));
    }

    #[test]
    fn empty_stream_has_no_frames() {
        let mut reader = RawFrameReader::new(Cursor::new(Vec::new()), FrameSize::new(8, 8));
        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn writer_rejects_wrong_size() {
        let mut writer = RawFrameWriter::new(Vec::new(), FrameSize::new(4, 4));
        let err = writer.write_frame(&frame(FrameSize::new(2, 2), 0)).unwrap_err();
        assert!(matches!(err, CaptureError::SizeMismatch { .. }));
        assert!(writer.into_inner().is_empty());
    }
}
