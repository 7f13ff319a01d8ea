//! Crowdwatch
//!
//! People-counting core for a camera feed: a background capture loop runs
//! object-detection inference over frames from a local device (or a
//! placeholder source when no hardware is available) and publishes the latest
//! count, detections, and annotated frame for any number of concurrent
//! consumers.
//!
//! # Architecture
//!
//! - `frame`: RGB frame container, overlay drawing, JPEG encoding
//! - `source`: frame acquisition (live V4L2 behind the `live-v4l2` feature,
//!   placeholder mock otherwise)
//! - `detect`: detector backends, the shared fail-soft `DetectionEngine`
//! - `state`: mutex-guarded latest-result snapshot
//! - `monitor`: `CrowdMonitor`, the capture thread lifecycle and loop
//! - `stream`: infinite multipart JPEG iterator for live viewing
//! - `config`: file + environment configuration
//! - `api`: thin HTTP forwarding layer used by `crowdwatchd`
//!
//! # Guarantees
//!
//! Consumers always observe a self-consistent result (count, detections, and
//! frame from the same cycle), possibly stale, never torn. The capture loop
//! survives camera loss, missing model artifacts, and inference errors; only
//! an explicit `stop()` ends it.

pub mod api;
pub mod config;
pub mod detect;
pub mod frame;
pub mod monitor;
pub mod source;
pub mod state;
pub mod stream;

pub use config::{CameraSettings, CrowdwatchConfig, DetectionSettings};
pub use detect::{
    BoundingBox, Candidate, Detection, DetectionEngine, DetectionResult, DetectorBackend,
    ModelConfig, SsdBackend,
};
pub use frame::Frame;
pub use monitor::CrowdMonitor;
pub use source::{CameraSource, MockSource, SourceConfig};
pub use state::SharedDetectionState;
pub use stream::{FrameStream, STREAM_BOUNDARY, STREAM_CONTENT_TYPE};
