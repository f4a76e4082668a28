//! Minimal in-place drawing on packed BGR buffers: outlines, filled boxes and
//! a 5x7 bitmap font for frame counters and detection labels.

/// Colour in BGR channel order.
pub type Bgr = [u8; 3];

pub const GREEN: Bgr = [0, 255, 0];
pub const WHITE: Bgr = [255, 255, 255];
pub const BLACK: Bgr = [0, 0, 0];

/// Horizontal advance of one glyph, including spacing.
pub const GLYPH_ADVANCE: i32 = 6;
pub const GLYPH_HEIGHT: i32 = 7;

/// Mutable view over a packed BGR frame. Drawing outside the frame is clipped.
pub struct Canvas<'a> {
    data: &'a mut [u8],
    width: i32,
    height: i32,
}

impl<'a> Canvas<'a> {
    /// `data` must hold exactly `width * height * 3` bytes.
    pub fn new(data: &'a mut [u8], width: u32, height: u32) -> Option<Self> {
        if data.len() != width as usize * height as usize * 3 {
            return None;
        }
        Some(Self {
            data,
            width: width as i32,
            height: height as i32,
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn put(&mut self, x: i32, y: i32, color: Bgr) {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        self.data[offset..offset + 3].copy_from_slice(&color);
    }

    /// Blend `color` over the pixel at `alpha`/255.
    pub fn blend(&mut self, x: i32, y: i32, color: Bgr, alpha: u8) {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        let a = alpha as u16;
        for (dst, src) in self.data[offset..offset + 3].iter_mut().zip(color) {
            *dst = ((src as u16 * a + *dst as u16 * (255 - a)) / 255) as u8;
        }
    }

    /// Clamp box corners `[left, top, right, bottom]` onto the canvas.
    pub fn clamp_box(&self, [left, top, right, bottom]: [i32; 4]) -> Option<[i32; 4]> {
        if self.width <= 0 || self.height <= 0 {
            return None;
        }
        let x = |v: i32| v.clamp(0, self.width - 1);
        let y = |v: i32| v.clamp(0, self.height - 1);
        Some([x(left), y(top), x(right), y(bottom)])
    }

    /// One-pixel outline with inclusive corners, clamped to the canvas.
    pub fn outline(&mut self, left: i32, top: i32, right: i32, bottom: i32, color: Bgr) {
        let Some([left, top, right, bottom]) = self.clamp_box([left, top, right, bottom]) else {
            return;
        };
        for x in left..=right {
            self.put(x, top, color);
            self.put(x, bottom, color);
        }
        for y in top..=bottom {
            self.put(left, y, color);
            self.put(right, y, color);
        }
    }

    pub fn shade(&mut self, left: i32, top: i32, right: i32, bottom: i32, color: Bgr, alpha: u8) {
        let (left, right) = (left.max(0), right.min(self.width - 1));
        let (top, bottom) = (top.max(0), bottom.min(self.height - 1));
        for y in top..=bottom {
            for x in left..=right {
                self.blend(x, y, color, alpha);
            }
        }
    }

    /// Render `text` with its top-left corner at (`x`, `y`). Characters without
    /// a glyph leave a gap.
    pub fn text(&mut self, x: i32, y: i32, text: &str, color: Bgr) {
        let mut pen = x;
        for ch in text.chars().flat_map(char::to_uppercase) {
            if let Some(rows) = glyph(ch) {
                for (row, bits) in rows.iter().enumerate() {
                    for col in 0..5i32 {
                        if (bits >> (4 - col)) & 1 == 1 {
                            self.put(pen + col, y + row as i32, color);
                        }
                    }
                }
            }
            pen += GLYPH_ADVANCE;
        }
    }

    /// Text on a translucent dark plate.
    pub fn label(&mut self, x: i32, y: i32, text: &str, color: Bgr) {
        let width = text_width(text);
        self.shade(x - 1, y - 1, x + width, y + GLYPH_HEIGHT, BLACK, 180);
        self.text(x, y, text, color);
    }
}

pub fn text_width(text: &str) -> i32 {
    text.chars().count() as i32 * GLYPH_ADVANCE
}

fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'A' => [0x0e, 0x11, 0x11, 0x1f, 0x11, 0x11, 0x11],
        'E' => [0x1f, 0x10, 0x1e, 0x10, 0x10, 0x10, 0x1f],
        'F' => [0x1f, 0x10, 0x1e, 0x10, 0x10, 0x10, 0x10],
        'M' => [0x11, 0x1b, 0x15, 0x15, 0x11, 0x11, 0x11],
        'R' => [0x1e, 0x11, 0x11, 0x1e, 0x14, 0x12, 0x11],
        'C' => [0x0e, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0e],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1f],
        'S' => [0x0f, 0x10, 0x0e, 0x01, 0x01, 0x11, 0x0e],
        '0' => [0x0e, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0e],
        '1' => [0x04, 0x0c, 0x04, 0x04, 0x04, 0x04, 0x0e],
        '2' => [0x0e, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1f],
        '3' => [0x1e, 0x01, 0x01, 0x0e, 0x01, 0x01, 0x1e],
        '4' => [0x02, 0x06, 0x0a, 0x12, 0x1f, 0x02, 0x02],
        '5' => [0x1f, 0x10, 0x1e, 0x01, 0x01, 0x11, 0x0e],
        '6' => [0x06, 0x08, 0x10, 0x1e, 0x11, 0x11, 0x0e],
        '7' => [0x1f, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0e, 0x11, 0x11, 0x0e, 0x11, 0x11, 0x0e],
        '9' => [0x0e, 0x11, 0x11, 0x0f, 0x01, 0x02, 0x0c],
        '%' => [0x11, 0x12, 0x04, 0x08, 0x12, 0x11, 0x00],
        '.' => [0, 0, 0, 0, 0, 0x06, 0x06],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        let mut data = vec![0u8; 10];
        assert!(Canvas::new(&mut data, 2, 2).is_none());
    }

    #[test]
    fn drawing_outside_the_frame_is_clipped() {
        let mut data = vec![0u8; 4 * 4 * 3];
        let mut canvas = Canvas::new(&mut data, 4, 4).unwrap();
        canvas.outline(-3, -3, 10, 10, GREEN);
        canvas.text(2, 2, "88", WHITE);
        canvas.shade(-10, -10, 100, 100, BLACK, 255);
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn outline_leaves_interior_untouched() {
        let mut data = vec![0u8; 5 * 5 * 3];
        let mut canvas = Canvas::new(&mut data, 5, 5).unwrap();
        canvas.outline(0, 0, 4, 4, GREEN);
        let pixel = |x: usize, y: usize| &data[(y * 5 + x) * 3..(y * 5 + x) * 3 + 3];
        assert_eq!(pixel(0, 0), &GREEN);
        assert_eq!(pixel(4, 2), &GREEN);
        assert_eq!(pixel(2, 2), &BLACK);
    }

    #[test]
    fn runaway_box_is_clamped_to_frame() {
        let mut data = vec![0u8; 6 * 4 * 3];
        let mut canvas = Canvas::new(&mut data, 6, 4).unwrap();
        assert_eq!(
            canvas.clamp_box([-40, i32::MIN, i32::MAX, 9]),
            Some([0, 0, 5, 3])
        );
        canvas.outline(1, 1, i32::MAX, i32::MAX, GREEN);
        let pixel = |x: usize, y: usize| &data[(y * 6 + x) * 3..(y * 6 + x) * 3 + 3];
        assert_eq!(pixel(5, 1), &GREEN);
        assert_eq!(pixel(1, 3), &GREEN);
        assert_eq!(pixel(0, 0), &BLACK);
    }

    #[test]
    fn empty_canvas_has_no_box() {
        let mut data = Vec::new();
        let canvas = Canvas::new(&mut data, 0, 0).unwrap();
        assert_eq!(canvas.clamp_box([0, 0, 1, 1]), None);
    }

    #[test]
    fn text_sets_glyph_pixels() {
        let mut data = vec![0u8; 12 * 7 * 3];
        let mut canvas = Canvas::new(&mut data, 12, 7).unwrap();
        canvas.text(0, 0, "1", WHITE);
        // '1' has its stem in column 2.
        assert_eq!(&data[(6 * 12 + 2) * 3..(6 * 12 + 2) * 3 + 3], &WHITE);
        assert_eq!(text_width("FRAME 000001"), 72);
    }
}
