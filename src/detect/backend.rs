use anyhow::Result;

use crate::frame::Frame;

/// One raw model candidate, before thresholding and class filtering.
///
/// Coordinates are normalized 0..1; sanitization and clipping happen when the
/// engine converts accepted candidates into pixel-space detections.
#[derive(Clone, Copy, Debug)]
pub struct Candidate {
    pub class_id: usize,
    pub confidence: f32,
    /// Normalized `[x1, y1, x2, y2]`.
    pub bbox: [f32; 4],
}

/// Detector backend trait.
///
/// Backends are not assumed to be reentrant; the engine serializes all calls
/// behind its own lock. Implementations must treat the frame as read-only and
/// must not retain it beyond the call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class label for a raw class index, when the index is known.
    fn class_name(&self, class_id: usize) -> Option<&str>;

    /// Run one forward pass and return every raw candidate.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Candidate>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use anyhow::anyhow;

    use super::*;

    /// Backend that replays a fixed candidate list (or fails every call).
    pub(crate) struct ScriptedBackend {
        candidates: Vec<Candidate>,
        fail: bool,
    }

    impl ScriptedBackend {
        pub(crate) fn new(candidates: Vec<Candidate>) -> Self {
            Self {
                candidates,
                fail: false,
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                candidates: Vec::new(),
                fail: true,
            }
        }
    }

    impl DetectorBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn class_name(&self, class_id: usize) -> Option<&str> {
            match class_id {
                0 => Some("background"),
                7 => Some("car"),
                15 => Some("person"),
                _ => None,
            }
        }

        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Candidate>> {
            if self.fail {
                return Err(anyhow!("scripted failure"));
            }
            Ok(self.candidates.clone())
        }
    }
}
