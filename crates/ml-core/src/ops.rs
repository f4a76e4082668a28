//! Pixel operations on packed BGR frames.
//!
//! Every function expects a frame whose buffer matches its dimensions; callers
//! validate with [`check_frame`] first.

use image::{ImageBuffer, Rgb, imageops};
use video_ingest::Frame;

use crate::{
    TransformError,
    draw::{Canvas, GLYPH_HEIGHT, WHITE, text_width},
};

/// Three-channel image over the frame bytes. Channels stay in BGR order; only
/// channel-agnostic `imageops` are applied to it.
type BgrImage = ImageBuffer<Rgb<u8>, Vec<u8>>;

pub fn check_frame(frame: &Frame) -> Result<(), TransformError> {
    if frame.is_consistent() {
        return Ok(());
    }
    Err(TransformError::BadBuffer {
        sequence: frame.sequence,
        width: frame.width,
        height: frame.height,
        expected: frame.size().frame_bytes(frame.format),
        actual: frame.data.len(),
    })
}

/// Replace every pixel with its luma, keeping three channels.
pub fn grayscale(frame: &mut Frame) {
    for px in frame.data.chunks_exact_mut(3) {
        let (b, g, r) = (px[0] as u32, px[1] as u32, px[2] as u32);
        // ITU-R BT.601 weights scaled by 256.
        let luma = ((29 * b + 150 * g + 77 * r) >> 8) as u8;
        px.fill(luma);
    }
}

pub fn invert(frame: &mut Frame) {
    with_image(frame, |image| {
        imageops::invert(image);
    });
}

/// Gaussian blur with standard deviation `sigma` pixels.
pub fn blur(frame: &mut Frame, sigma: f32) {
    with_image(frame, |image| {
        *image = imageops::blur(image, sigma);
    });
}

/// Draw `FRAME 000123` in the bottom-right corner.
pub fn stamp(frame: &mut Frame) {
    let text = format!("FRAME {:06}", frame.sequence);
    let (width, height) = (frame.width, frame.height);
    let Some(mut canvas) = Canvas::new(&mut frame.data, width, height) else {
        return;
    };
    let x = (canvas.width() - text_width(&text) - 4).max(1);
    let y = (canvas.height() - GLYPH_HEIGHT - 4).max(1);
    canvas.label(x, y, &text, WHITE);
}

fn with_image(frame: &mut Frame, op: impl FnOnce(&mut BgrImage)) {
    if !frame.is_consistent() {
        return;
    }
    let data = std::mem::take(&mut frame.data);
    if let Some(mut image) = BgrImage::from_raw(frame.width, frame.height, data) {
        op(&mut image);
        frame.data = image.into_raw();
    }
}

#[cfg(test)]
mod tests {
    use video_ingest::FrameSize;

    use super::*;

    fn solid(width: u32, height: u32, bgr: [u8; 3]) -> Frame {
        let mut frame = Frame::black(FrameSize::new(width, height));
        for px in frame.data.chunks_exact_mut(3) {
            px.copy_from_slice(&bgr);
        }
        frame
    }

    #[test]
    fn grayscale_equalises_channels() {
        let mut frame = solid(2, 2, [255, 0, 0]);
        grayscale(&mut frame);
        assert!(frame.data.chunks_exact(3).all(|px| px[0] == px[1] && px[1] == px[2]));
        // Pure blue is dark.
        assert!(frame.data[0] < 40);
    }

    #[test]
    fn invert_twice_is_identity() {
        let original = solid(3, 2, [10, 100, 200]);
        let mut frame = original.clone();
        invert(&mut frame);
        assert_eq!(&frame.data[..3], &[245u8, 155, 55]);
        invert(&mut frame);
        assert_eq!(frame, original);
    }

    #[test]
    fn blur_keeps_size_and_flat_interior() {
        let mut frame = solid(16, 16, [40, 80, 120]);
        blur(&mut frame, 1.0);
        assert!(frame.is_consistent());
        let centre = (8 * 16 + 8) * 3;
        let px = &frame.data[centre..centre + 3];
        assert!(px[0].abs_diff(40) <= 1 && px[1].abs_diff(80) <= 1 && px[2].abs_diff(120) <= 1);
    }

    #[test]
    fn blur_softens_an_edge() {
        let mut frame = solid(16, 1, [0, 0, 0]);
        frame.data[8 * 3..].fill(255);
        blur(&mut frame, 2.0);
        let left_of_edge = frame.data[7 * 3];
        assert!(left_of_edge > 0 && left_of_edge < 255);
    }

    #[test]
    fn stamp_marks_bottom_right() {
        let mut frame = Frame::black(FrameSize::new(96, 24)).with_sequence(42);
        stamp(&mut frame);
        let lit = frame.data.iter().filter(|&&b| b == 255).count();
        assert!(lit > 0);
        // The top-left corner is left alone.
        assert!(frame.data[..3 * 8].iter().all(|&b| b == 0));
    }

    #[test]
    fn check_frame_rejects_short_buffer() {
        let mut frame = Frame::black(FrameSize::new(4, 4));
        frame.data.truncate(10);
        assert!(matches!(
            check_frame(&frame),
            Err(TransformError::BadBuffer { actual: 10, .. })
        ));
    }
}
