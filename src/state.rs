//! Shared detection state.
//!
//! One writer (the capture loop) publishes whole `DetectionResult` snapshots;
//! any number of readers copy them out. The lock is held only for the
//! copy/assignment, never across capture, inference, or encoding, so readers
//! never block the pipeline beyond a clone.

use std::sync::{Arc, Mutex};

use crate::detect::{Detection, DetectionResult};
use crate::frame::Frame;

#[derive(Default)]
struct StateInner {
    /// Monotonic publication counter; lets consumers detect fresh data.
    revision: u64,
    latest: Option<DetectionResult>,
}

/// Latest-result snapshot store. `None` until the first publication.
///
/// Publication is all-or-nothing: a reader always sees count, detections,
/// and frame from the same capture cycle.
#[derive(Clone, Default)]
pub struct SharedDetectionState {
    inner: Arc<Mutex<StateInner>>,
}

impl SharedDetectionState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StateInner> {
        // A poisoned lock still holds the last fully assigned snapshot
        // (assignment of one Option is not observable half-done here);
        // recover instead of propagating so readers never fail.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Replace the snapshot. Called only by the capture loop.
    pub(crate) fn publish(&self, result: DetectionResult) {
        let mut inner = self.lock();
        inner.revision = inner.revision.wrapping_add(1);
        inner.latest = Some(result);
    }

    /// Latest people count; 0 before the first publication.
    pub fn count(&self) -> usize {
        self.lock().latest.as_ref().map_or(0, |r| r.count)
    }

    /// Latest detections; empty before the first publication.
    pub fn detections(&self) -> Vec<Detection> {
        self.lock()
            .latest
            .as_ref()
            .map_or_else(Vec::new, |r| r.detections.clone())
    }

    /// Latest frame, if any cycle has completed.
    pub fn latest_frame(&self) -> Option<Frame> {
        self.lock().latest.as_ref().map(|r| r.frame.clone())
    }

    /// Full snapshot of the latest result.
    pub fn snapshot(&self) -> Option<DetectionResult> {
        self.lock().latest.clone()
    }

    /// Whether any cycle has published yet.
    pub fn has_data(&self) -> bool {
        self.lock().latest.is_some()
    }

    /// Publication counter; increments once per published cycle.
    pub fn revision(&self) -> u64 {
        self.lock().revision
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection};

    fn result_with_count(count: usize) -> DetectionResult {
        let detections = (0..count)
            .map(|i| Detection {
                confidence: 0.9,
                bbox: BoundingBox {
                    x1: i as u32,
                    y1: 0,
                    x2: i as u32 + 1,
                    y2: 1,
                },
            })
            .collect();
        DetectionResult {
            count,
            detections,
            frame: Frame::solid(8, 8, [0, 0, 0]),
        }
    }

    #[test]
    fn empty_state_reads_as_zero() {
        let state = SharedDetectionState::new();
        assert_eq!(state.count(), 0);
        assert!(state.detections().is_empty());
        assert!(state.latest_frame().is_none());
        assert!(!state.has_data());
        assert_eq!(state.revision(), 0);
    }

    #[test]
    fn publish_replaces_whole_snapshot() {
        let state = SharedDetectionState::new();
        state.publish(result_with_count(2));
        state.publish(result_with_count(5));

        let snapshot = state.snapshot().unwrap();
        assert_eq!(snapshot.count, 5);
        assert_eq!(snapshot.count, snapshot.detections.len());
        assert_eq!(state.revision(), 2);
    }

    #[test]
    fn readers_share_the_same_cycle() {
        let state = SharedDetectionState::new();
        state.publish(result_with_count(3));
        assert_eq!(state.count(), state.detections().len());
    }
}
