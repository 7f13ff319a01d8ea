//! Capture worker and its lifecycle.
//!
//! `CrowdMonitor` owns the background acquisition loop: pull a frame, run
//! detection, publish the result, sleep to the configured rate. One monitor
//! runs at most one capture thread; any number of reader threads consume the
//! published state concurrently.
//!
//! Lifecycle invariants:
//! - `start()` is guarded by an atomic compare-and-set, so concurrent calls
//!   spawn exactly one thread.
//! - Each run gets its own stop token. `stop()` trips the current token and
//!   joins with a bounded timeout; a timed-out (detached) loop keeps seeing
//!   its own token and can never be revived by a later `start()`.
//! - The loop exits only in response to its stop token. Source and model
//!   failures are recovered in place with a fixed backoff.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::CrowdwatchConfig;
use crate::detect::{Detection, DetectionEngine, DetectionResult};
use crate::source::CameraSource;
use crate::state::SharedDetectionState;
use crate::stream::FrameStream;

/// Backoff after a failed source open or read.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);
/// Pace of placeholder publication in degraded mode.
const MOCK_INTERVAL: Duration = Duration::from_secs(1);
/// Granularity of stop-aware sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(25);
/// How long `stop()` waits for the capture thread before detaching it.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

struct MonitorShared {
    config: CrowdwatchConfig,
    state: SharedDetectionState,
    engine: DetectionEngine,
    running: AtomicBool,
    /// Stop token of the current run; replaced on every `start()`.
    stop: Mutex<Arc<AtomicBool>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    retry_backoff: Duration,
    mock_interval: Duration,
}

/// People-counting capture monitor.
///
/// Construct once, share by cloning (cheap, `Arc` inside), stop on teardown.
#[derive(Clone)]
pub struct CrowdMonitor {
    shared: Arc<MonitorShared>,
}

impl CrowdMonitor {
    pub fn new(config: CrowdwatchConfig) -> Self {
        let engine = DetectionEngine::new(config.model_config());
        Self::with_engine(config, engine)
    }

    /// Monitor over a caller-supplied engine (custom backends, tests).
    pub fn with_engine(config: CrowdwatchConfig, engine: DetectionEngine) -> Self {
        Self {
            shared: Arc::new(MonitorShared {
                config,
                state: SharedDetectionState::new(),
                engine,
                running: AtomicBool::new(false),
                stop: Mutex::new(Arc::new(AtomicBool::new(false))),
                worker: Mutex::new(None),
                retry_backoff: RETRY_BACKOFF,
                mock_interval: MOCK_INTERVAL,
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_engine_and_pacing(
        config: CrowdwatchConfig,
        engine: DetectionEngine,
        retry_backoff: Duration,
        mock_interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(MonitorShared {
                config,
                state: SharedDetectionState::new(),
                engine,
                running: AtomicBool::new(false),
                stop: Mutex::new(Arc::new(AtomicBool::new(false))),
                worker: Mutex::new(None),
                retry_backoff,
                mock_interval,
            }),
        }
    }

    /// Start the capture thread. Returns true when this call started it,
    /// false when it was already running. Safe to call from any thread; the
    /// compare-and-set guarantees a single worker even under races.
    pub fn start(&self) -> bool {
        let Some(stop) = self.begin_start() else {
            return false;
        };
        let source = CameraSource::new(
            &self.shared.config.source_config(),
            self.shared.config.camera.mock,
        );
        self.spawn_worker(source, stop);
        true
    }

    #[cfg(test)]
    pub(crate) fn start_with_source(&self, source: CameraSource) -> bool {
        let Some(stop) = self.begin_start() else {
            return false;
        };
        self.spawn_worker(source, stop);
        true
    }

    /// Claim the Stopped -> Running transition. The fresh stop token is
    /// installed under the token lock so a concurrent `stop()` either trips
    /// the previous run or this one, never a token no loop is watching.
    fn begin_start(&self) -> Option<Arc<AtomicBool>> {
        if self.shared.running.load(Ordering::SeqCst) {
            return None;
        }
        let mut token_guard = lock_unpoisoned(&self.shared.stop);
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        let stop = Arc::new(AtomicBool::new(false));
        *token_guard = stop.clone();
        Some(stop)
    }

    fn spawn_worker(&self, source: CameraSource, stop: Arc<AtomicBool>) {
        let shared = self.shared.clone();
        let spawned = std::thread::Builder::new()
            .name("crowd-capture".into())
            .spawn(move || capture_loop(shared, source, stop));
        match spawned {
            Ok(handle) => {
                *lock_unpoisoned(&self.shared.worker) = Some(handle);
            }
            Err(err) => {
                log::error!("failed to spawn capture thread: {err}");
                self.shared.running.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Stop the capture thread and release the source. Idempotent; safe to
    /// call before any `start()` and from any thread.
    pub fn stop(&self) {
        lock_unpoisoned(&self.shared.stop).store(true, Ordering::SeqCst);

        let handle = lock_unpoisoned(&self.shared.worker).take();
        if let Some(handle) = handle {
            let deadline = Instant::now() + JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(SLEEP_SLICE);
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                // The loop owns a tripped stop token, so it can only wind
                // down; detach rather than block the caller.
                log::warn!("capture thread did not stop within {JOIN_TIMEOUT:?}; detaching");
            }
        }
        self.shared.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Latest people count; starts the worker if needed. Returns 0 until the
    /// first cycle publishes.
    pub fn count(&self) -> usize {
        self.start();
        self.shared.state.count()
    }

    /// Latest detections snapshot (read-only copy).
    pub fn detections(&self) -> Vec<Detection> {
        self.shared.state.detections()
    }

    /// Live multipart frame stream; starts the worker if needed. Each call
    /// returns an independent consumer.
    pub fn stream(&self) -> FrameStream {
        self.start();
        FrameStream::new(self.shared.state.clone(), self.shared.config.camera.fps)
    }

    /// Shared state handle for in-process consumers.
    pub fn state(&self) -> &SharedDetectionState {
        &self.shared.state
    }

    /// The configuration this monitor runs with.
    pub fn config(&self) -> &CrowdwatchConfig {
        &self.shared.config
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ----------------------------------------------------------------------------
// Capture loop
// ----------------------------------------------------------------------------

fn capture_loop(shared: Arc<MonitorShared>, mut source: CameraSource, stop: Arc<AtomicBool>) {
    let mode = if source.is_mock() { "mock" } else { "live" };
    log::info!(
        "capture loop started (mode={}, source='{}', {}x{} @ {} fps)",
        mode,
        shared.config.camera.source,
        shared.config.camera.width,
        shared.config.camera.height,
        shared.config.camera.fps
    );

    let frame_interval = Duration::from_secs_f64(1.0 / shared.config.camera.fps.max(1) as f64);

    while !stop.load(Ordering::SeqCst) {
        if source.is_mock() {
            mock_cycle(&shared, &mut source);
            sleep_with_stop(&stop, shared.mock_interval);
            continue;
        }

        if !source.is_open() && !source.open() {
            log::warn!(
                "no capture device available for '{}'; retrying in {:?}",
                shared.config.camera.source,
                shared.retry_backoff
            );
            sleep_with_stop(&stop, shared.retry_backoff);
            continue;
        }

        match source.read_frame() {
            Ok(frame) => {
                let result = shared.engine.detect(&frame, true, None);
                shared.state.publish(result);
                sleep_with_stop(&stop, frame_interval);
            }
            Err(err) => {
                log::warn!("frame read failed: {err:#}; releasing source for re-open");
                source.release();
                sleep_with_stop(&stop, shared.retry_backoff);
            }
        }
    }

    source.release();
    log::info!(
        "capture loop stopped after {} frames",
        source.stats().frames_captured
    );
}

/// Degraded-mode cycle: publish the placeholder without touching hardware or
/// the model. The count is always zero.
fn mock_cycle(shared: &Arc<MonitorShared>, source: &mut CameraSource) {
    match source.read_frame() {
        Ok(frame) => shared.state.publish(DetectionResult::empty(frame)),
        Err(err) => log::warn!("placeholder frame failed: {err:#}"),
    }
}

/// Sleep `total`, waking early when the stop token trips.
fn sleep_with_stop(stop: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
