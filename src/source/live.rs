//! Live V4L2 frame source (feature `live-v4l2`).
//!
//! Opens a local capture device and reads packed RGB frames. Integer
//! identifiers are treated as device indices and resolved against the
//! candidate order `[given, 0, 1, 2]`: the first device that opens, accepts
//! the requested format, and yields one test frame wins. Anything else is
//! opened as a device path directly.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use crate::frame::{Frame, RGB_BYTES_PER_PIXEL};

use super::{candidate_indices, SourceConfig, SourceStats};

/// Live capture source.
pub struct LiveSource {
    config: SourceConfig,
    state: Option<LiveState>,
    frame_count: u64,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct LiveState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl LiveSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            frame_count: 0,
        }
    }

    /// Open the device. Returns false when no candidate could be opened and
    /// read; the caller retries later.
    pub fn open(&mut self) -> bool {
        if self.state.is_some() {
            return true;
        }

        match candidate_indices(&self.config.identifier) {
            Some(indices) => {
                for index in indices {
                    let path = format!("/dev/video{index}");
                    match self.try_open(&path) {
                        Ok(()) => {
                            log::info!(
                                "LiveSource: opened {} ({}x{})",
                                path,
                                self.active_width,
                                self.active_height
                            );
                            return true;
                        }
                        Err(err) => {
                            log::warn!("LiveSource: candidate {} unusable: {:#}", path, err);
                        }
                    }
                }
                log::warn!(
                    "LiveSource: no usable device for identifier '{}'",
                    self.config.identifier
                );
                false
            }
            None => {
                let path = self.config.identifier.clone();
                match self.try_open(&path) {
                    Ok(()) => {
                        log::info!(
                            "LiveSource: opened {} ({}x{})",
                            path,
                            self.active_width,
                            self.active_height
                        );
                        true
                    }
                    Err(err) => {
                        log::warn!("LiveSource: failed to open {}: {:#}", path, err);
                        false
                    }
                }
            }
        }
    }

    /// Open one device path, apply the requested format, and verify it with a
    /// single test read. Leaves the source open on success.
    fn try_open(&mut self, path: &str) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device =
            v4l::Device::with_path(path).with_context(|| format!("open capture device {path}"))?;
        let mut format = device.format().context("read device format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("LiveSource: failed to set format on {}: {}", path, err);
                device.format().context("read format after set failure")?
            }
        };

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("LiveSource: failed to set fps on {}: {}", path, err);
            }
        }

        let mut state = LiveStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create buffer stream"))
            },
        }
        .try_build()?;

        // One test read: an index that opens but cannot deliver frames does
        // not count as usable.
        state
            .with_stream_mut(|stream| {
                use v4l::io::traits::CaptureStream;
                stream.next().map(|_| ())
            })
            .context("test read")?;

        self.active_width = format.width;
        self.active_height = format.height;
        self.state = Some(state);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    pub fn read_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().ok_or_else(|| anyhow!("device not open"))?;
        let expected = (self.active_width as usize)
            * (self.active_height as usize)
            * RGB_BYTES_PER_PIXEL;

        let data = state.with_stream_mut(|stream| -> Result<Vec<u8>> {
            let (buf, _meta) = stream.next().context("capture frame")?;
            if buf.len() < expected {
                return Err(anyhow!(
                    "short capture buffer: {} bytes, expected {}",
                    buf.len(),
                    expected
                ));
            }
            Ok(buf[..expected].to_vec())
        })?;

        self.frame_count += 1;
        Frame::new(data, self.active_width, self.active_height)
    }

    pub fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!("LiveSource: released {}", self.config.identifier);
        }
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            identifier: self.config.identifier.clone(),
        }
    }
}
