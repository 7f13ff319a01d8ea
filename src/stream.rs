//! Live frame streaming.
//!
//! `FrameStream` is a pull-based, infinite sequence of multipart JPEG chunks
//! over the shared detection state. Each consumer gets its own iterator;
//! consumers only ever copy the latest published frame, so slow clients
//! neither block the capture loop nor each other.
//!
//! The iterator never ends and never panics toward its caller: with no frame
//! published yet it polls, and an encode failure skips the cycle.

use std::time::{Duration, Instant};

use crate::state::SharedDetectionState;

/// Boundary marker used between multipart segments.
pub const STREAM_BOUNDARY: &str = "frame";
/// Content type for an HTTP response wrapping this stream.
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Poll interval while waiting for the first published frame.
const EMPTY_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// JPEG quality for streamed frames.
const JPEG_QUALITY: u8 = 80;

/// Infinite iterator of encoded multipart frame chunks.
pub struct FrameStream {
    state: SharedDetectionState,
    frame_interval: Duration,
    last_emit: Option<Instant>,
}

impl FrameStream {
    pub(crate) fn new(state: SharedDetectionState, fps: u32) -> Self {
        Self {
            state,
            frame_interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            last_emit: None,
        }
    }
}

impl Iterator for FrameStream {
    type Item = Vec<u8>;

    /// Always `Some`; blocks (politely) until a frame can be emitted.
    fn next(&mut self) -> Option<Vec<u8>> {
        loop {
            let Some(frame) = self.state.latest_frame() else {
                std::thread::sleep(EMPTY_POLL_INTERVAL);
                continue;
            };

            let jpeg = match frame.to_jpeg(JPEG_QUALITY) {
                Ok(jpeg) => jpeg,
                Err(err) => {
                    log::warn!("stream frame encode failed: {err:#}; skipping");
                    std::thread::sleep(EMPTY_POLL_INTERVAL);
                    continue;
                }
            };

            // Pace to the configured frame rate.
            if let Some(last) = self.last_emit {
                let elapsed = last.elapsed();
                if elapsed < self.frame_interval {
                    std::thread::sleep(self.frame_interval - elapsed);
                }
            }
            self.last_emit = Some(Instant::now());

            return Some(multipart_chunk(&jpeg));
        }
    }
}

/// Wrap one encoded image as a boundary-delimited multipart segment.
fn multipart_chunk(jpeg: &[u8]) -> Vec<u8> {
    let mut chunk = Vec::with_capacity(jpeg.len() + 64);
    chunk.extend_from_slice(b"--");
    chunk.extend_from_slice(STREAM_BOUNDARY.as_bytes());
    chunk.extend_from_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    chunk.extend_from_slice(jpeg);
    chunk.extend_from_slice(b"\r\n");
    chunk
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DetectionResult;
    use crate::frame::Frame;
    use std::sync::mpsc;
    use std::time::Duration;

    fn publish_placeholder(state: &SharedDetectionState) {
        state.publish(DetectionResult::empty(Frame::solid(32, 24, [50, 60, 70])));
    }

    #[test]
    fn chunk_is_boundary_delimited_jpeg() {
        let chunk = multipart_chunk(&[0xFF, 0xD8, 0xFF, 0xD9]);
        assert!(chunk.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
        assert!(chunk.ends_with(&[0xFF, 0xD9, b'\r', b'\n']));
    }

    #[test]
    fn stream_emits_once_a_frame_exists() {
        let state = SharedDetectionState::new();
        publish_placeholder(&state);

        let mut stream = FrameStream::new(state, 30);
        let chunk = stream.next().unwrap();
        assert!(chunk.starts_with(b"--frame\r\n"));
        // SOI marker right after the blank line.
        let header_end = chunk.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        assert_eq!(&chunk[header_end..header_end + 2], &[0xFF, 0xD8]);
    }

    #[test]
    fn stream_waits_for_the_first_frame() {
        let state = SharedDetectionState::new();
        let (tx, rx) = mpsc::channel();

        let consumer_state = state.clone();
        std::thread::spawn(move || {
            let mut stream = FrameStream::new(consumer_state, 30);
            let chunk = stream.next().unwrap();
            tx.send(chunk).unwrap();
        });

        // Nothing published yet: the consumer stays quietly blocked.
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

        publish_placeholder(&state);
        let chunk = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("stream must emit after the first publication");
        assert!(chunk.starts_with(b"--frame\r\n"));
    }

    #[test]
    fn consumers_are_independent() {
        let state = SharedDetectionState::new();
        publish_placeholder(&state);

        let mut a = FrameStream::new(state.clone(), 30);
        let mut b = FrameStream::new(state, 30);
        assert!(a.next().is_some());
        assert!(b.next().is_some());
        assert!(a.next().is_some());
    }
}
