//! Frame container and annotation.
//!
//! - `Frame`: packed RGB24 pixel buffer with dimensions. Frames are treated
//!   as immutable once captured; annotation draws on an explicit copy.
//! - Box/label drawing for detection overlays, using a small embedded glyph
//!   table (uppercase letters used by the overlays, digits, '.', ':').
//! - JPEG encoding for the multipart stream.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;

use crate::detect::BoundingBox;

/// Bytes per pixel for packed RGB24.
pub const RGB_BYTES_PER_PIXEL: usize = 3;

/// Overlay color for boxes and labels (green, as rendered on annotated frames).
pub const OVERLAY_COLOR: [u8; 3] = [0, 255, 0];

/// A packed RGB24 frame.
///
/// The pixel buffer is row-major, `width * height * 3` bytes. A captured
/// frame is never mutated in place by the pipeline; annotated variants are
/// produced by cloning first (`annotated()`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    /// Wrap an RGB24 buffer. Fails when the buffer length does not match the
    /// dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(RGB_BYTES_PER_PIXEL))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// A solid-color frame.
    pub fn solid(width: u32, height: u32, color: [u8; 3]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * RGB_BYTES_PER_PIXEL);
        for _ in 0..pixels {
            data.extend_from_slice(&color);
        }
        Self {
            data,
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Copy for annotation. The capture copy stays untouched.
    pub fn annotated(&self) -> Frame {
        self.clone()
    }

    fn put_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = ((y as usize) * (self.width as usize) + (x as usize)) * RGB_BYTES_PER_PIXEL;
        self.data[idx..idx + RGB_BYTES_PER_PIXEL].copy_from_slice(&color);
    }

    /// Draw a rectangle outline. Coordinates outside the frame are clipped by
    /// the pixel writer, so partially visible boxes are safe.
    pub fn draw_rect(&mut self, bbox: BoundingBox, color: [u8; 3], thickness: u32) {
        for t in 0..thickness {
            let x1 = bbox.x1.saturating_add(t);
            let y1 = bbox.y1.saturating_add(t);
            let x2 = bbox.x2.saturating_sub(t);
            let y2 = bbox.y2.saturating_sub(t);
            if x1 > x2 || y1 > y2 {
                break;
            }
            for x in x1..=x2 {
                self.put_pixel(x, y1, color);
                self.put_pixel(x, y2, color);
            }
            for y in y1..=y2 {
                self.put_pixel(x1, y, color);
                self.put_pixel(x2, y, color);
            }
        }
    }

    /// Fill a rectangle (used for label backgrounds).
    pub fn fill_rect(&mut self, bbox: BoundingBox, color: [u8; 3]) {
        for y in bbox.y1..=bbox.y2.min(self.height.saturating_sub(1)) {
            for x in bbox.x1..=bbox.x2.min(self.width.saturating_sub(1)) {
                self.put_pixel(x, y, color);
            }
        }
    }

    /// Render `text` at `(x, y)` (top-left corner) with the embedded glyph
    /// table. Characters without a glyph render as blanks. Lowercase input is
    /// uppercased.
    pub fn draw_label(&mut self, text: &str, x: u32, y: u32, scale: u32, color: [u8; 3]) {
        let scale = scale.max(1);
        let advance = (GLYPH_WIDTH + 1) * scale;
        let mut cursor = x;
        for ch in text.chars() {
            if let Some(rows) = glyph(ch.to_ascii_uppercase()) {
                for (row, bits) in rows.iter().enumerate() {
                    for col in 0..GLYPH_WIDTH {
                        if bits & (1u8 << (GLYPH_WIDTH - 1 - col)) != 0 {
                            for dy in 0..scale {
                                for dx in 0..scale {
                                    self.put_pixel(
                                        cursor + col * scale + dx,
                                        y + (row as u32) * scale + dy,
                                        color,
                                    );
                                }
                            }
                        }
                    }
                }
            }
            cursor = cursor.saturating_add(advance);
        }
    }

    /// Pixel width of `text` as rendered by `draw_label`.
    pub fn label_width(text: &str, scale: u32) -> u32 {
        let scale = scale.max(1);
        (text.chars().count() as u32) * (GLYPH_WIDTH + 1) * scale
    }

    /// Encode as JPEG.
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        encoder
            .encode(
                &self.data,
                self.width,
                self.height,
                image::ExtendedColorType::Rgb8,
            )
            .context("encode frame as jpeg")?;
        Ok(buf)
    }
}

// ----------------------------------------------------------------------------
// Glyphs
// ----------------------------------------------------------------------------

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

/// 5x7 bitmap glyphs, one bit per column, MSB leftmost. Covers the overlay
/// alphabet only; everything else renders as a blank advance.
fn glyph(ch: char) -> Option<&'static [u8; 7]> {
    match ch {
        'A' => Some(&[0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001]),
        'C' => Some(&[0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110]),
        'E' => Some(&[0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111]),
        'F' => Some(&[0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000]),
        'M' => Some(&[0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001]),
        'N' => Some(&[0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001]),
        'O' => Some(&[0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110]),
        'P' => Some(&[0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000]),
        'R' => Some(&[0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001]),
        'S' => Some(&[0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110]),
        '0' => Some(&[0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110]),
        '1' => Some(&[0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110]),
        '2' => Some(&[0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111]),
        '3' => Some(&[0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110]),
        '4' => Some(&[0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010]),
        '5' => Some(&[0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110]),
        '6' => Some(&[0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110]),
        '7' => Some(&[0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000]),
        '8' => Some(&[0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110]),
        '9' => Some(&[0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100]),
        '.' => Some(&[0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b01100]),
        ':' => Some(&[0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000]),
        _ => None,
    }
}

/// Pixel height of a rendered label line.
pub fn label_height(scale: u32) -> u32 {
    GLYPH_HEIGHT * scale.max(1)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
