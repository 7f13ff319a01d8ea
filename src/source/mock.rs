//! Placeholder frame source.
//!
//! Used when no capture hardware is available (or degraded mode is forced).
//! Every read succeeds and returns a fixed-size placeholder frame carrying a
//! visible "NO CAMERA" marker, so downstream consumers keep working end to
//! end without a device. The capture loop paces mock cycles at roughly one
//! frame per second instead of the configured rate.

use anyhow::Result;

use crate::frame::Frame;

use super::SourceStats;

/// Placeholder frame width.
pub const PLACEHOLDER_WIDTH: u32 = 640;
/// Placeholder frame height.
pub const PLACEHOLDER_HEIGHT: u32 = 480;

const BACKGROUND: [u8; 3] = [32, 36, 44];
const MARKER: &str = "NO CAMERA";
const MARKER_SCALE: u32 = 4;

/// Always-succeeding placeholder source.
pub struct MockSource {
    frame_count: u64,
}

impl MockSource {
    pub fn new() -> Self {
        Self { frame_count: 0 }
    }

    pub fn read_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;

        let mut frame = Frame::solid(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, BACKGROUND);

        let marker_w = Frame::label_width(MARKER, MARKER_SCALE);
        let x = PLACEHOLDER_WIDTH.saturating_sub(marker_w) / 2;
        let y = PLACEHOLDER_HEIGHT / 2;
        frame.draw_label(MARKER, x, y, MARKER_SCALE, [200, 200, 200]);

        // Rolling frame counter, bottom-left. Makes consecutive placeholder
        // frames distinguishable on the live stream.
        let counter = format!("FRAME {}", self.frame_count);
        frame.draw_label(&counter, 8, PLACEHOLDER_HEIGHT - 24, 2, [120, 120, 120]);

        Ok(frame)
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            identifier: "mock".to_string(),
        }
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_has_fixed_dimensions() {
        let mut source = MockSource::new();
        let frame = source.read_frame().unwrap();
        assert_eq!(frame.width(), PLACEHOLDER_WIDTH);
        assert_eq!(frame.height(), PLACEHOLDER_HEIGHT);
        assert_eq!(
            frame.data().len(),
            (PLACEHOLDER_WIDTH * PLACEHOLDER_HEIGHT * 3) as usize
        );
    }

    #[test]
    fn marker_is_drawn_over_background() {
        let mut source = MockSource::new();
        let frame = source.read_frame().unwrap();
        assert!(frame.data().chunks(3).any(|p| p == [200, 200, 200]));
    }

    #[test]
    fn reads_never_fail_and_count_up() {
        let mut source = MockSource::new();
        for _ in 0..3 {
            assert!(source.read_frame().is_ok());
        }
        assert_eq!(source.stats().frames_captured, 3);
    }
}
