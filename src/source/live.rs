//! Live camera stream source.
//!
//! A `LiveStream` produces frames one at a time at sensor rate and hands each
//! one to the pipeline's `FrameSlot`. Two backends exist:
//! - `stub://` URIs start a synthetic camera thread that renders a moving
//!   coloured object, for tests and the demo.
//! - `LiveStream::manual` returns a `FramePusher`, the entry point for a real
//!   camera analyzer callback delivering raw sensor buffers.
//!
//! Frames are never buffered beyond the single slot and never logged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::CameraSettings;
use crate::error::{DetectError, DetectResult};
use crate::frame::Frame;

use super::normalize::{normalize_to_rgba, PixelFormat};
use super::slot::SlotSender;

const BACKGROUND: [u8; 4] = [96, 96, 96, 255];
const OBJECT_COLOURS: [[u8; 4]; 4] = [
    [220, 30, 30, 255],
    [240, 200, 20, 255],
    [40, 190, 50, 255],
    [60, 60, 220, 255],
];

/// Configuration for a live stream.
#[derive(Clone, Debug)]
pub struct LiveStreamConfig {
    /// Camera URI. Only `stub://` is understood by the built-in backend.
    pub uri: String,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for LiveStreamConfig {
    fn default() -> Self {
        Self::from(&CameraSettings::default())
    }
}

impl From<&CameraSettings> for LiveStreamConfig {
    fn from(settings: &CameraSettings) -> Self {
        Self {
            uri: settings.uri.clone(),
            target_fps: settings.target_fps,
            width: settings.width,
            height: settings.height,
        }
    }
}

/// Live camera frame source.
pub struct LiveStream {
    backend: LiveBackend,
}

enum LiveBackend {
    Synthetic(LiveStreamConfig),
    Manual(Arc<Mutex<PusherState>>),
}

impl LiveStream {
    pub fn new(config: LiveStreamConfig) -> DetectResult<Self> {
        if config.target_fps == 0 {
            return Err(DetectError::InvalidConfig(
                "camera target_fps must be greater than zero".to_string(),
            ));
        }
        if config.width == 0 || config.height == 0 {
            return Err(DetectError::invalid_dimensions(config.width, config.height));
        }
        if !config.uri.starts_with("stub://") {
            return Err(DetectError::InvalidConfig(format!(
                "unsupported camera URI '{}': only stub:// or a manual pusher",
                config.uri
            )));
        }
        Ok(Self {
            backend: LiveBackend::Synthetic(config),
        })
    }

    /// A stream fed by the returned pusher instead of a capture thread.
    pub fn manual() -> (Self, FramePusher) {
        let shared = Arc::new(Mutex::new(PusherState::default()));
        (
            Self {
                backend: LiveBackend::Manual(shared.clone()),
            },
            FramePusher { shared },
        )
    }

    pub fn describe(&self) -> String {
        match &self.backend {
            LiveBackend::Synthetic(config) => config.uri.clone(),
            LiveBackend::Manual(_) => "manual".to_string(),
        }
    }

    /// Start delivering frames into `sink` until the returned capture is stopped.
    pub(crate) fn attach(&self, sink: SlotSender) -> DetectResult<Capture> {
        match &self.backend {
            LiveBackend::Synthetic(config) => {
                let stop = Arc::new(AtomicBool::new(false));
                let mut camera = SyntheticCamera::new(config.clone());
                let flag = stop.clone();
                let handle = thread::Builder::new()
                    .name("live-detect-camera".to_string())
                    .spawn(move || camera.run(sink, flag))
                    .map_err(|e| {
                        DetectError::EngineInit(format!("failed to spawn camera thread: {}", e))
                    })?;
                log::info!("LiveStream: connected to {} (synthetic)", config.uri);
                Ok(Capture::Thread {
                    stop,
                    handle: Some(handle),
                })
            }
            LiveBackend::Manual(shared) => {
                let mut state = lock(shared);
                state.sink = Some(sink);
                state.started = None;
                log::info!("LiveStream: manual pusher attached");
                Ok(Capture::Manual(shared.clone()))
            }
        }
    }
}

/// Running capture for an attached stream. Stopping detaches the slot sender,
/// which disconnects the pipeline worker.
pub(crate) enum Capture {
    Thread {
        stop: Arc<AtomicBool>,
        handle: Option<JoinHandle<()>>,
    },
    Manual(Arc<Mutex<PusherState>>),
}

impl Capture {
    pub(crate) fn stop(&mut self) {
        match self {
            Capture::Thread { stop, handle } => {
                stop.store(true, Ordering::SeqCst);
                if let Some(handle) = handle.take() {
                    if handle.join().is_err() {
                        log::warn!("LiveStream: camera thread panicked");
                    }
                }
            }
            Capture::Manual(shared) => {
                lock(shared).sink = None;
            }
        }
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.stop();
    }
}

// ----------------------------------------------------------------------------
// Manual pusher (camera analyzer callback)
// ----------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct PusherState {
    sink: Option<SlotSender>,
    next_sequence: u64,
    started: Option<Instant>,
}

/// Hands raw camera buffers to whichever pipeline the stream is bound to.
#[derive(Clone)]
pub struct FramePusher {
    shared: Arc<Mutex<PusherState>>,
}

impl FramePusher {
    /// Normalize a raw sensor buffer to RGBA and offer it to the bound pipeline.
    ///
    /// Returns `Ok(false)` when the stream is not bound and the frame was discarded.
    pub fn push(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> DetectResult<bool> {
        if width == 0 || height == 0 {
            return Err(DetectError::invalid_dimensions(width, height));
        }
        if !self.is_bound() {
            return Ok(false);
        }
        let rgba = normalize_to_rgba(pixels, width, height, format).map_err(|e| {
            log::debug!("FramePusher: rejected {:?} buffer: {:#}", format, e);
            DetectError::invalid_dimensions(width, height)
        })?;
        let frame = Frame::new(rgba, width, height, 0, 0)?;
        Ok(self.push_frame(frame))
    }

    /// Offer an already-decoded frame. Sequence and timestamp are reassigned.
    pub fn push_frame(&self, frame: Frame) -> bool {
        let mut state = lock(&self.shared);
        let Some(sink) = state.sink.clone() else {
            return false;
        };
        let started = *state.started.get_or_insert_with(Instant::now);
        state.next_sequence += 1;
        let frame = frame.with_position(
            state.next_sequence,
            started.elapsed().as_millis() as u64,
        );
        drop(state);
        sink.offer(frame)
    }

    pub fn is_bound(&self) -> bool {
        lock(&self.shared)
            .sink
            .as_ref()
            .is_some_and(|sink| !sink.is_closed())
    }
}

fn lock(shared: &Mutex<PusherState>) -> MutexGuard<'_, PusherState> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://)
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    config: LiveStreamConfig,
    frame_count: u64,
    /// Index into `OBJECT_COLOURS`; advances every 50 frames.
    scene_state: usize,
}

impl SyntheticCamera {
    fn new(config: LiveStreamConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn run(&mut self, sink: SlotSender, stop: Arc<AtomicBool>) {
        let period = Duration::from_micros(1_000_000 / self.config.target_fps.max(1) as u64);
        let started = Instant::now();
        while !stop.load(Ordering::SeqCst) {
            let frame = match self.next_frame(started) {
                Ok(frame) => frame,
                Err(err) => {
                    log::warn!("LiveStream: synthetic frame failed: {}", err);
                    break;
                }
            };
            if !sink.offer(frame) {
                log::debug!("LiveStream: pipeline went away, stopping capture");
                break;
            }
            thread::sleep(period);
        }
        log::info!(
            "LiveStream: {} stopped after {} frames",
            self.config.uri,
            self.frame_count
        );
    }

    fn next_frame(&mut self, started: Instant) -> DetectResult<Frame> {
        self.frame_count += 1;
        if self.frame_count % 50 == 0 {
            self.scene_state = (self.scene_state + 1) % OBJECT_COLOURS.len();
        }

        let width = self.config.width;
        let height = self.config.height;
        let mut frame = Frame::filled(width, height, BACKGROUND)?;

        // A square object sweeping left to right with a little sensor jitter.
        let side = (width.min(height) / 4).max(1);
        let travel = width.saturating_sub(side).max(1) as u64;
        let jitter: i64 = rand::thread_rng().gen_range(-2..=2);
        let left = ((self.frame_count * 4) % travel) as i64 + jitter;
        let top = (height.saturating_sub(side) / 2) as i64 + jitter;
        frame.fill_rect(
            left.max(0) as u32,
            top.max(0) as u32,
            side,
            side,
            OBJECT_COLOURS[self.scene_state],
        );

        Ok(frame.with_position(self.frame_count, started.elapsed().as_millis() as u64))
    }
}
