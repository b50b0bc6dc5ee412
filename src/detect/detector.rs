//! Uniform adapter over a `DetectorBackend`.
//!
//! A `Detector` is created for one `RunningMode` and owns its engine handle
//! exclusively. It applies the pipeline's threshold and result limit, measures
//! inference time, and releases the engine exactly once.

use std::time::Instant;

use crate::config::PipelineConfig;
use crate::detect::backend::{DetectorBackend, RunningMode};
use crate::detect::registry::BackendRegistry;
use crate::detect::result::{Detection, DetectionBatch, DetectionResult};
use crate::error::{DetectError, DetectResult};
use crate::frame::Frame;

pub struct Detector {
    backend: Option<Box<dyn DetectorBackend>>,
    config: PipelineConfig,
    mode: RunningMode,
    /// Last accepted frame position: media timestamp in video mode, sequence in live mode.
    last_position: Option<u64>,
}

impl Detector {
    /// Build the engine for `config` from the registry and prepare it for `mode`.
    pub fn new(
        config: &PipelineConfig,
        mode: RunningMode,
        registry: &BackendRegistry,
    ) -> DetectResult<Self> {
        config.validate()?;
        let backend = registry.create(config)?;
        Self::with_backend(backend, config.clone(), mode)
    }

    pub fn with_backend(
        mut backend: Box<dyn DetectorBackend>,
        config: PipelineConfig,
        mode: RunningMode,
    ) -> DetectResult<Self> {
        if let Err(err) = config.validate() {
            backend.release();
            return Err(err);
        }
        if !backend.supports(mode) {
            let name = backend.name();
            backend.release();
            return Err(DetectError::EngineInit(format!(
                "backend '{}' does not support {:?} mode",
                name, mode
            )));
        }
        if let Err(err) = backend.warm_up() {
            let name = backend.name();
            backend.release();
            return Err(DetectError::EngineInit(format!(
                "backend '{}' warm-up failed: {:#}",
                name, err
            )));
        }
        log::info!(
            "Detector: {} ready (mode={:?}, threshold={}, max_results={})",
            backend.name(),
            mode,
            config.confidence_threshold,
            config.max_results
        );
        Ok(Self {
            backend: Some(backend),
            config,
            mode,
            last_position: None,
        })
    }

    pub fn mode(&self) -> RunningMode {
        self.mode
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.backend.is_none()
    }

    /// Detect objects in one still image.
    pub fn detect_single(&mut self, frame: &Frame) -> DetectResult<DetectionResult> {
        self.require_mode(RunningMode::Image)?;
        self.run(frame, 0)
    }

    /// Detect objects in every sampled frame of a video.
    ///
    /// Each frame lands at slot `timestamp_ms / sample_interval_ms`. Slots the
    /// decoder skipped and frames whose inference failed hold empty results,
    /// so batch indices always line up with media time.
    pub fn detect_batch(
        &mut self,
        frames: &[Frame],
        sample_interval_ms: u64,
    ) -> DetectResult<DetectionBatch> {
        self.detect_batch_until(frames, sample_interval_ms, || false)
            .map(|batch| batch.unwrap_or_else(|| DetectionBatch::empty(sample_interval_ms)))
    }

    /// `detect_batch` that checks `cancelled` before every frame.
    ///
    /// Returns `Ok(None)` once `cancelled` reports true; the remaining frames
    /// are never handed to the engine and the partial batch is discarded.
    pub fn detect_batch_until<C>(
        &mut self,
        frames: &[Frame],
        sample_interval_ms: u64,
        cancelled: C,
    ) -> DetectResult<Option<DetectionBatch>>
    where
        C: Fn() -> bool,
    {
        self.require_mode(RunningMode::Video)?;
        if sample_interval_ms == 0 {
            return Err(DetectError::InvalidConfig(
                "sample interval must be greater than zero".to_string(),
            ));
        }
        if self.is_closed() {
            return Err(DetectError::EngineClosed);
        }
        if frames.is_empty() {
            return Ok(Some(DetectionBatch::empty(sample_interval_ms)));
        }

        // Each batch is a fresh media timeline.
        self.last_position = None;
        let started = Instant::now();
        let mut results: Vec<DetectionResult> = Vec::with_capacity(frames.len());
        let mut failures = 0usize;

        for frame in frames {
            if cancelled() {
                log::info!(
                    "Detector: batch cancelled after {} of {} frames",
                    results.len(),
                    frames.len()
                );
                return Ok(None);
            }
            let slot = (frame.timestamp_ms / sample_interval_ms) as usize;
            if slot < results.len() {
                log::warn!(
                    "Detector: frame #{} at {}ms shares slot {} with an earlier frame; skipped",
                    frame.sequence,
                    frame.timestamp_ms,
                    slot
                );
                continue;
            }
            while results.len() < slot {
                let gap = results.len() as u64;
                results.push(DetectionResult::empty(
                    frame.dimensions(),
                    gap,
                    gap * sample_interval_ms,
                ));
            }
            match self.run(frame, frame.timestamp_ms) {
                Ok(result) => results.push(result),
                Err(DetectError::EngineClosed) => return Err(DetectError::EngineClosed),
                Err(err) => {
                    failures += 1;
                    log::warn!(
                        "Detector: frame #{} at {}ms failed, keeping empty slot: {}",
                        frame.sequence,
                        frame.timestamp_ms,
                        err
                    );
                    results.push(DetectionResult::empty(
                        frame.dimensions(),
                        frame.sequence,
                        frame.timestamp_ms,
                    ));
                }
            }
        }

        let total_ms = started.elapsed().as_millis() as u64;
        let per_frame_ms = total_ms / frames.len() as u64;
        log::info!(
            "Detector: batch of {} frames -> {} slots in {}ms ({} failed)",
            frames.len(),
            results.len(),
            total_ms,
            failures
        );
        Ok(Some(DetectionBatch::new(results, sample_interval_ms, per_frame_ms)))
    }

    /// Detect objects in a live frame and hand the outcome to `deliver`.
    ///
    /// After `close()` the frame is dropped and `deliver` is never called.
    pub fn detect_streaming<F>(&mut self, frame: &Frame, deliver: F)
    where
        F: FnOnce(DetectResult<DetectionResult>),
    {
        if let Err(err) = self.require_mode(RunningMode::LiveStream) {
            deliver(Err(err));
            return;
        }
        if self.is_closed() {
            log::debug!("Detector: dropping frame #{} after close", frame.sequence);
            return;
        }
        deliver(self.run(frame, frame.timestamp_ms));
    }

    /// Release the engine handle. Later calls are no-ops.
    pub fn close(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.release();
            log::info!("Detector: released {} engine", backend.name());
        }
    }

    fn require_mode(&self, expected: RunningMode) -> DetectResult<()> {
        if self.mode != expected {
            return Err(DetectError::WrongRunningMode {
                expected,
                actual: self.mode,
            });
        }
        Ok(())
    }

    fn run(&mut self, frame: &Frame, timestamp_ms: u64) -> DetectResult<DetectionResult> {
        let mode = self.mode;
        let backend = self.backend.as_mut().ok_or(DetectError::EngineClosed)?;

        let position = match mode {
            RunningMode::Image => None,
            RunningMode::Video => Some(timestamp_ms),
            RunningMode::LiveStream => Some(frame.sequence),
        };
        if let (Some(position), Some(last)) = (position, self.last_position) {
            if position <= last {
                return Err(DetectError::InferenceFailure(format!(
                    "frame position {} is not after previous {}",
                    position, last
                )));
            }
        }

        let started = Instant::now();
        let raw = backend
            .detect(frame, mode, timestamp_ms)
            .map_err(|e| DetectError::InferenceFailure(format!("{:#}", e)))?;
        let inference_time_ms = started.elapsed().as_millis() as u64;
        if position.is_some() {
            self.last_position = position;
        }

        Ok(DetectionResult {
            detections: self.apply_limits(raw),
            inference_time_ms,
            frame: frame.dimensions(),
            sequence: frame.sequence,
            timestamp_ms: frame.timestamp_ms,
        })
    }

    fn apply_limits(&self, mut detections: Vec<Detection>) -> Vec<Detection> {
        detections.retain(|d| d.score() >= self.config.confidence_threshold);
        detections.sort_by(|a, b| b.score().total_cmp(&a.score()));
        detections.truncate(self.config.max_results);
        detections
    }
}

impl Drop for Detector {
    fn drop(&mut self) {
        self.close();
    }
}
