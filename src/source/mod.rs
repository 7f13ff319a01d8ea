//! Frame acquisition sources.
//!
//! `CameraSource` fronts one of two backends behind the same capability set
//! (`open` / `read_frame` / `release`):
//! - `LiveSource`: local capture devices, compiled in with the `live-v4l2`
//!   feature.
//! - `MockSource`: always available; publishes a fixed placeholder frame for
//!   degraded operation without hardware.
//!
//! Backend choice is explicit: the mock flag (or a build without the live
//! feature) selects the mock backend; there is no runtime probing. Read
//! failures are reported to the caller; recovery (release, backoff, re-open)
//! belongs to the capture loop.

#[cfg(feature = "live-v4l2")]
pub mod live;
pub mod mock;

#[cfg(feature = "live-v4l2")]
pub use live::LiveSource;
pub use mock::{MockSource, PLACEHOLDER_HEIGHT, PLACEHOLDER_WIDTH};

use anyhow::Result;

use crate::frame::Frame;

/// Acquisition settings for a source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Device index ("0", "5", ...) or a device path.
    pub identifier: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Target frame rate.
    pub target_fps: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            identifier: "0".to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
        }
    }
}

/// Camera frame source.
pub struct CameraSource {
    backend: SourceBackend,
}

enum SourceBackend {
    Mock(MockSource),
    #[cfg(feature = "live-v4l2")]
    Live(LiveSource),
    #[cfg(test)]
    Scripted(scripted::ScriptedSource),
}

impl CameraSource {
    /// Build a source for `config`. `mock` forces the placeholder backend;
    /// without the `live-v4l2` feature it is the only backend available.
    pub fn new(config: &SourceConfig, mock: bool) -> Self {
        #[cfg(feature = "live-v4l2")]
        {
            if !mock {
                return Self {
                    backend: SourceBackend::Live(LiveSource::new(config.clone())),
                };
            }
        }
        #[cfg(not(feature = "live-v4l2"))]
        {
            if !mock {
                log::info!(
                    "live capture support not compiled in; using placeholder source for '{}'",
                    config.identifier
                );
            }
        }
        let _ = config;
        Self {
            backend: SourceBackend::Mock(MockSource::new()),
        }
    }

    #[cfg(test)]
    pub(crate) fn scripted(source: scripted::ScriptedSource) -> Self {
        Self {
            backend: SourceBackend::Scripted(source),
        }
    }

    /// Open the underlying device. Always true for the mock backend.
    pub fn open(&mut self) -> bool {
        match &mut self.backend {
            SourceBackend::Mock(_) => true,
            #[cfg(feature = "live-v4l2")]
            SourceBackend::Live(source) => source.open(),
            #[cfg(test)]
            SourceBackend::Scripted(source) => source.open(),
        }
    }

    /// Whether the source currently holds an open device.
    pub fn is_open(&self) -> bool {
        match &self.backend {
            SourceBackend::Mock(_) => true,
            #[cfg(feature = "live-v4l2")]
            SourceBackend::Live(source) => source.is_open(),
            #[cfg(test)]
            SourceBackend::Scripted(source) => source.is_open(),
        }
    }

    /// Capture the next frame. Failures are transient; the caller decides
    /// whether to release and retry.
    pub fn read_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            SourceBackend::Mock(source) => source.read_frame(),
            #[cfg(feature = "live-v4l2")]
            SourceBackend::Live(source) => source.read_frame(),
            #[cfg(test)]
            SourceBackend::Scripted(source) => source.read_frame(),
        }
    }

    /// Release the underlying device; the next `open()` starts fresh.
    pub fn release(&mut self) {
        match &mut self.backend {
            SourceBackend::Mock(_) => {}
            #[cfg(feature = "live-v4l2")]
            SourceBackend::Live(source) => source.release(),
            #[cfg(test)]
            SourceBackend::Scripted(source) => source.release(),
        }
    }

    /// True when this source publishes placeholder frames.
    pub fn is_mock(&self) -> bool {
        matches!(self.backend, SourceBackend::Mock(_))
    }

    /// Frame statistics.
    pub fn stats(&self) -> SourceStats {
        match &self.backend {
            SourceBackend::Mock(source) => source.stats(),
            #[cfg(feature = "live-v4l2")]
            SourceBackend::Live(source) => source.stats(),
            #[cfg(test)]
            SourceBackend::Scripted(source) => source.stats(),
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub identifier: String,
}

/// Candidate device indices for an integer identifier: the requested index
/// first, then 0, 1, 2 as fallbacks, deduplicated. `None` when the
/// identifier is not an integer (it is a path then).
pub fn candidate_indices(identifier: &str) -> Option<Vec<u32>> {
    let given: u32 = identifier.trim().parse().ok()?;
    let mut indices = vec![given];
    for fallback in [0, 1, 2] {
        if !indices.contains(&fallback) {
            indices.push(fallback);
        }
    }
    Some(indices)
}

// ----------------------------------------------------------------------------
// Scripted source (tests)
// ----------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod scripted {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, Result};

    use crate::frame::Frame;

    use super::SourceStats;

    /// Recorded source lifecycle events, observable from tests.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) enum SourceEvent {
        Open,
        Read,
        ReadFailed,
        Release,
    }

    /// Source that replays a plan of read outcomes and records every call.
    pub(crate) struct ScriptedSource {
        plan: VecDeque<bool>,
        opened: bool,
        frames: u64,
        events: Arc<Mutex<Vec<SourceEvent>>>,
    }

    impl ScriptedSource {
        /// `plan` holds one entry per `read_frame` call: `true` yields a
        /// frame, `false` fails. An exhausted plan keeps yielding frames.
        pub(crate) fn new(plan: Vec<bool>) -> (Self, Arc<Mutex<Vec<SourceEvent>>>) {
            let events = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    plan: plan.into(),
                    opened: false,
                    frames: 0,
                    events: events.clone(),
                },
                events,
            )
        }

        fn record(&self, event: SourceEvent) {
            if let Ok(mut events) = self.events.lock() {
                events.push(event);
            }
        }

        pub(crate) fn open(&mut self) -> bool {
            self.record(SourceEvent::Open);
            self.opened = true;
            true
        }

        pub(crate) fn is_open(&self) -> bool {
            self.opened
        }

        pub(crate) fn read_frame(&mut self) -> Result<Frame> {
            let ok = self.plan.pop_front().unwrap_or(true);
            if !ok {
                self.record(SourceEvent::ReadFailed);
                return Err(anyhow!("scripted read failure"));
            }
            self.record(SourceEvent::Read);
            self.frames += 1;
            Ok(Frame::solid(32, 24, [(self.frames % 256) as u8, 0, 0]))
        }

        pub(crate) fn release(&mut self) {
            self.record(SourceEvent::Release);
            self.opened = false;
        }

        pub(crate) fn stats(&self) -> SourceStats {
            SourceStats {
                frames_captured: self.frames,
                identifier: "scripted".to_string(),
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_identifier_expands_with_fallbacks() {
        assert_eq!(candidate_indices("5"), Some(vec![5, 0, 1, 2]));
        assert_eq!(candidate_indices(" 5 "), Some(vec![5, 0, 1, 2]));
    }

    #[test]
    fn fallback_indices_are_deduplicated() {
        assert_eq!(candidate_indices("0"), Some(vec![0, 1, 2]));
        assert_eq!(candidate_indices("1"), Some(vec![1, 0, 2]));
        assert_eq!(candidate_indices("2"), Some(vec![2, 0, 1]));
    }

    #[test]
    fn path_identifiers_are_not_indices() {
        assert_eq!(candidate_indices("/dev/video0"), None);
        assert_eq!(candidate_indices("rtsp://camera-1"), None);
        assert_eq!(candidate_indices("-1"), None);
    }

    #[test]
    fn mock_flag_selects_placeholder_backend() {
        let source = CameraSource::new(&SourceConfig::default(), true);
        assert!(source.is_mock());
    }
}
