use serde::{Deserialize, Serialize};

use crate::frame::Frame;

/// Pixel-space bounding box, inclusive corners.
///
/// Invariants enforced by `from_normalized`: `0 <= x1 <= x2 <= width - 1`
/// and `0 <= y1 <= y2 <= height - 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    /// Convert a normalized `[x1, y1, x2, y2]` box (0..1 coordinates) into
    /// pixel space. Non-finite coordinates are sanitized to 0 before scaling,
    /// corners are clipped to the frame and reordered so the invariants hold
    /// regardless of what the model emitted.
    pub fn from_normalized(coords: [f32; 4], width: u32, height: u32) -> Self {
        let scale = |v: f32, dim: u32| -> u32 {
            let v = if v.is_finite() { v } else { 0.0 };
            let max = dim.saturating_sub(1) as f32;
            (v * dim as f32).clamp(0.0, max) as u32
        };
        let (ax, bx) = (scale(coords[0], width), scale(coords[2], width));
        let (ay, by) = (scale(coords[1], height), scale(coords[3], height));
        Self {
            x1: ax.min(bx),
            y1: ay.min(by),
            x2: ax.max(bx),
            y2: ay.max(by),
        }
    }
}

/// One accepted person detection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Detection {
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Result of one detection pass over a frame.
///
/// `count` always equals `detections.len()`; the frame is the annotated copy
/// when box drawing was requested, the capture frame otherwise.
#[derive(Clone, Debug)]
pub struct DetectionResult {
    pub count: usize,
    pub detections: Vec<Detection>,
    pub frame: Frame,
}

impl DetectionResult {
    /// The fail-soft result: nothing detected, frame passed through.
    pub fn empty(frame: Frame) -> Self {
        Self {
            count: 0,
            detections: Vec::new(),
            frame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_box_scales_and_clips() {
        let bbox = BoundingBox::from_normalized([0.25, 0.5, 0.75, 1.5], 640, 480);
        assert_eq!(bbox.x1, 160);
        assert_eq!(bbox.y1, 240);
        assert_eq!(bbox.x2, 480);
        assert_eq!(bbox.y2, 479);
    }

    #[test]
    fn non_finite_coordinates_become_zero() {
        let bbox = BoundingBox::from_normalized([f32::NAN, f32::INFINITY, 0.5, f32::NEG_INFINITY], 640, 480);
        assert_eq!(bbox.x1, 0);
        assert_eq!(bbox.y1, 0);
        assert_eq!(bbox.x2, 320);
        assert_eq!(bbox.y2, 0);
    }

    #[test]
    fn corners_are_reordered() {
        let bbox = BoundingBox::from_normalized([0.9, 0.8, 0.1, 0.2], 100, 100);
        assert!(bbox.x1 <= bbox.x2);
        assert!(bbox.y1 <= bbox.y2);
        assert_eq!(bbox.x1, 10);
        assert_eq!(bbox.x2, 90);
    }

    #[test]
    fn serialized_shape_matches_consumers() {
        let det = Detection {
            confidence: 0.87,
            bbox: BoundingBox {
                x1: 1,
                y1: 2,
                x2: 3,
                y2: 4,
            },
        };
        let json = serde_json::to_value(&det).unwrap();
        assert_eq!(json["bbox"]["x1"], 1);
        assert_eq!(json["bbox"]["y2"], 4);
        assert!((json["confidence"].as_f64().unwrap() - 0.87).abs() < 1e-6);
    }
}
