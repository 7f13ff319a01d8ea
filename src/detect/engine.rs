//! Detection engine.
//!
//! Wraps one shared detector backend behind a dedicated lock and turns raw
//! model candidates into sanitized person detections. The engine is
//! fail-soft: a missing model, a load error, or an inference error produces
//! the zero result (`count 0`, no detections, frame passed through) instead
//! of an error. Callers never see a failure.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::backends::SsdBackend;
use crate::detect::result::{BoundingBox, Detection, DetectionResult};
use crate::frame::{self, Frame, OVERLAY_COLOR};

/// The single class the pipeline counts.
const TRACKED_CLASS: &str = "person";
/// Box outline thickness on annotated frames.
const BOX_THICKNESS: u32 = 2;
/// Label text scale on annotated frames.
const LABEL_SCALE: u32 = 2;

/// Model artifact paths and inference defaults.
#[derive(Clone, Debug)]
pub struct ModelConfig {
    /// ONNX graph artifact.
    pub graph_path: PathBuf,
    /// Class labels artifact (one name per line).
    pub labels_path: PathBuf,
    /// Fixed square input size the frame is resized to.
    pub input_size: u32,
    /// Default confidence threshold when the caller does not override it.
    pub confidence_threshold: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            graph_path: PathBuf::from("models/mobilenet_ssd.onnx"),
            labels_path: PathBuf::from("models/mobilenet_ssd.labels"),
            input_size: 300,
            confidence_threshold: 0.5,
        }
    }
}

/// Shared detection engine.
///
/// The backend lock serializes access to the non-reentrant model and is
/// independent of the published-state lock; it is held for one backend call
/// plus the candidate filtering, never across frame I/O.
pub struct DetectionEngine {
    backend: Mutex<Option<Box<dyn DetectorBackend>>>,
    config: ModelConfig,
}

impl DetectionEngine {
    /// Engine that lazily loads the SSD backend from the configured artifacts
    /// on first use.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            backend: Mutex::new(None),
            config,
        }
    }

    /// Engine with a pre-built backend (custom models, deterministic tests).
    pub fn with_backend(config: ModelConfig, backend: Box<dyn DetectorBackend>) -> Self {
        Self {
            backend: Mutex::new(Some(backend)),
            config,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Detect people in `frame`.
    ///
    /// Candidates at or below the threshold, or whose class does not map to
    /// the tracked class, are skipped. Accepted boxes are rescaled to pixel
    /// space, sanitized, and clipped. With `draw_boxes` the returned frame is
    /// an annotated copy; otherwise the capture frame comes back unchanged.
    pub fn detect(
        &self,
        frame: &Frame,
        draw_boxes: bool,
        confidence_threshold: Option<f32>,
    ) -> DetectionResult {
        let threshold = confidence_threshold.unwrap_or(self.config.confidence_threshold);

        let detections = {
            // A panic inside a previous detect() poisons the lock but leaves
            // no partial state behind; recover the guard rather than wedging
            // every later cycle.
            let mut guard = match self.backend.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };

            if guard.is_none() {
                match self.load_backend() {
                    Ok(backend) => {
                        log::info!("detection backend '{}' loaded", backend.name());
                        *guard = Some(backend);
                    }
                    Err(err) => {
                        log::warn!("detection model unavailable: {err:#}");
                        return DetectionResult::empty(frame.clone());
                    }
                }
            }

            let Some(backend) = guard.as_mut() else {
                return DetectionResult::empty(frame.clone());
            };

            let candidates = match backend.detect(frame) {
                Ok(candidates) => candidates,
                Err(err) => {
                    log::warn!("inference failed: {err:#}");
                    return DetectionResult::empty(frame.clone());
                }
            };

            let mut detections = Vec::new();
            for candidate in candidates {
                if !candidate.confidence.is_finite() || candidate.confidence <= threshold {
                    continue;
                }
                if backend.class_name(candidate.class_id) != Some(TRACKED_CLASS) {
                    continue;
                }
                detections.push(Detection {
                    confidence: candidate.confidence.clamp(0.0, 1.0),
                    bbox: BoundingBox::from_normalized(
                        candidate.bbox,
                        frame.width(),
                        frame.height(),
                    ),
                });
            }
            detections
        };

        let frame = if draw_boxes && !detections.is_empty() {
            annotate(frame, &detections)
        } else {
            frame.clone()
        };

        DetectionResult {
            count: detections.len(),
            detections,
            frame,
        }
    }

    fn load_backend(&self) -> Result<Box<dyn DetectorBackend>> {
        let backend = SsdBackend::load(
            &self.config.graph_path,
            &self.config.labels_path,
            self.config.input_size,
        )
        .context("load SSD model artifacts")?;
        Ok(Box::new(backend))
    }
}

/// Draw boxes and confidence labels on a copy of the capture frame.
fn annotate(frame: &Frame, detections: &[Detection]) -> Frame {
    let mut annotated = frame.annotated();
    for detection in detections {
        annotated.draw_rect(detection.bbox, OVERLAY_COLOR, BOX_THICKNESS);
        let label = format!("PERSON: {:.2}", detection.confidence);
        let label_h = frame::label_height(LABEL_SCALE);
        // Label above the box when it fits, inside it otherwise.
        let y = if detection.bbox.y1 > label_h + 2 {
            detection.bbox.y1 - label_h - 2
        } else {
            detection.bbox.y1 + BOX_THICKNESS + 2
        };
        annotated.draw_label(&label, detection.bbox.x1, y, LABEL_SCALE, OVERLAY_COLOR);
    }
    annotated
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backend::testing::ScriptedBackend;
    use crate::detect::backend::Candidate;

    fn person(confidence: f32) -> Candidate {
        Candidate {
            class_id: 15,
            confidence,
            bbox: [0.1, 0.1, 0.4, 0.6],
        }
    }

    fn engine_with(candidates: Vec<Candidate>) -> DetectionEngine {
        DetectionEngine::with_backend(
            ModelConfig::default(),
            Box::new(ScriptedBackend::new(candidates)),
        )
    }

    fn test_frame() -> Frame {
        Frame::solid(64, 48, [8, 8, 8])
    }

    #[test]
    fn threshold_excludes_at_and_below() {
        let engine = engine_with(vec![person(0.49), person(0.51), person(0.5)]);
        let result = engine.detect(&test_frame(), false, Some(0.5));
        assert_eq!(result.count, 1);
        assert!((result.detections[0].confidence - 0.51).abs() < 1e-6);
    }

    #[test]
    fn non_tracked_classes_are_skipped() {
        let mut car = person(0.9);
        car.class_id = 7;
        let mut unknown = person(0.9);
        unknown.class_id = 42;
        let engine = engine_with(vec![car, unknown, person(0.9)]);
        let result = engine.detect(&test_frame(), false, None);
        assert_eq!(result.count, 1);
    }

    #[test]
    fn count_matches_detections() {
        let engine = engine_with(vec![person(0.8), person(0.7), person(0.6)]);
        let result = engine.detect(&test_frame(), false, None);
        assert_eq!(result.count, result.detections.len());
        assert_eq!(result.count, 3);
    }

    #[test]
    fn boxes_are_clipped_to_frame() {
        let mut oversized = person(0.9);
        oversized.bbox = [-0.5, f32::NAN, 2.0, 1.5];
        let engine = engine_with(vec![oversized]);
        let frame = test_frame();
        let result = engine.detect(&frame, false, None);
        let bbox = result.detections[0].bbox;
        assert!(bbox.x2 <= frame.width() - 1);
        assert!(bbox.y2 <= frame.height() - 1);
        assert!(bbox.x1 <= bbox.x2);
        assert!(bbox.y1 <= bbox.y2);
    }

    #[test]
    fn missing_artifacts_yield_zero_result() {
        let config = ModelConfig {
            graph_path: PathBuf::from("/nonexistent/model.onnx"),
            labels_path: PathBuf::from("/nonexistent/model.labels"),
            ..ModelConfig::default()
        };
        let engine = DetectionEngine::new(config);
        let frame = test_frame();
        let result = engine.detect(&frame, true, None);
        assert_eq!(result.count, 0);
        assert!(result.detections.is_empty());
        assert_eq!(result.frame, frame);
    }

    #[test]
    fn backend_errors_yield_zero_result() {
        let engine = DetectionEngine::with_backend(
            ModelConfig::default(),
            Box::new(ScriptedBackend::failing()),
        );
        let frame = test_frame();
        let result = engine.detect(&frame, true, None);
        assert_eq!(result.count, 0);
        assert_eq!(result.frame, frame);
    }

    #[test]
    fn drawing_operates_on_a_copy() {
        let engine = engine_with(vec![person(0.9)]);
        let frame = test_frame();
        let result = engine.detect(&frame, true, None);
        assert_eq!(result.count, 1);
        // Capture frame untouched, annotated copy differs.
        assert!(frame.data().iter().all(|&b| b == 8));
        assert_ne!(result.frame, frame);
    }

    #[test]
    fn without_drawing_frame_passes_through() {
        let engine = engine_with(vec![person(0.9)]);
        let frame = test_frame();
        let result = engine.detect(&frame, false, None);
        assert_eq!(result.frame, frame);
    }

    #[test]
    fn caller_threshold_overrides_default() {
        let engine = engine_with(vec![person(0.3)]);
        assert_eq!(engine.detect(&test_frame(), false, None).count, 0);
        assert_eq!(engine.detect(&test_frame(), false, Some(0.2)).count, 1);
    }
}
