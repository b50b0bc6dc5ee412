//! Live camera pipeline.
//!
//! One dedicated worker pulls the newest frame from the slot, runs streaming
//! detection and routes the outcome to the listener through the pipeline's
//! cancellation token. The camera thread never waits on inference: frames
//! that arrive while the worker is busy replace the queued one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::detect::{BackendRegistry, Detector, RunningMode};
use crate::error::{DetectError, DetectResult};
use crate::source::{
    frame_slot, CameraBinding, CameraProvider, LiveStream, SlotReceiver, SlotStats,
};

use super::listener::{Outlet, ResultListener};
use super::token::CancellationToken;

/// How often an idle worker re-checks the liveness flag.
const IDLE_POLL: Duration = Duration::from_millis(50);

static NEXT_PIPELINE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Running,
    Stopped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub frames_submitted: u64,
    /// Frames replaced in the slot before the worker got to them.
    pub frames_dropped: u64,
    pub frames_processed: u64,
    pub results_delivered: u64,
    /// Results (or errors) that completed after disposal and were suppressed.
    pub results_discarded: u64,
    pub errors_delivered: u64,
}

#[derive(Default)]
struct WorkerCounters {
    processed: AtomicU64,
    delivered: AtomicU64,
    discarded: AtomicU64,
    errors: AtomicU64,
}

pub struct StreamingPipeline {
    id: u64,
    config: PipelineConfig,
    registry: Arc<BackendRegistry>,
    camera: Arc<CameraProvider>,
    outlet: Outlet,
    state: PipelineState,
    binding: Option<CameraBinding>,
    worker: Option<JoinHandle<()>>,
    slot_stats: Option<Arc<SlotStats>>,
    counters: Arc<WorkerCounters>,
}

impl StreamingPipeline {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<BackendRegistry>,
        camera: Arc<CameraProvider>,
        listener: Arc<dyn ResultListener>,
    ) -> Self {
        Self {
            id: NEXT_PIPELINE_ID.fetch_add(1, Ordering::Relaxed),
            config,
            registry,
            camera,
            outlet: Outlet::new(CancellationToken::new(), listener),
            state: PipelineState::Idle,
            binding: None,
            worker: None,
            slot_stats: None,
            counters: Arc::new(WorkerCounters::default()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// The pipeline's liveness flag.
    pub fn token(&self) -> CancellationToken {
        self.outlet.token().clone()
    }

    pub fn stats(&self) -> PipelineStats {
        let (submitted, dropped) = self
            .slot_stats
            .as_ref()
            .map_or((0, 0), |s| (s.offered(), s.dropped()));
        PipelineStats {
            frames_submitted: submitted,
            frames_dropped: dropped,
            frames_processed: self.counters.processed.load(Ordering::Relaxed),
            results_delivered: self.counters.delivered.load(Ordering::Relaxed),
            results_discarded: self.counters.discarded.load(Ordering::Relaxed),
            errors_delivered: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    /// Build the detector, bind the camera and start the worker.
    ///
    /// On failure the pipeline stays Idle and nothing is left bound.
    pub fn start(&mut self, stream: LiveStream) -> DetectResult<()> {
        if self.state != PipelineState::Idle {
            return Err(DetectError::InvalidConfig(format!(
                "pipeline #{} already started",
                self.id
            )));
        }

        let detector = Detector::new(&self.config, RunningMode::LiveStream, &self.registry)?;
        let (sink, frames) = frame_slot();
        let slot_stats = frames.stats();
        let binding = self.camera.bind(self.id, &stream, sink)?;

        let outlet = self.outlet.clone();
        let counters = self.counters.clone();
        let id = self.id;
        let worker = thread::Builder::new()
            .name(format!("live-detect-stream-{}", id))
            .spawn(move || run_worker(id, detector, frames, outlet, counters))
            .map_err(|e| DetectError::EngineInit(format!("failed to spawn worker: {}", e)))?;

        self.binding = Some(binding);
        self.worker = Some(worker);
        self.slot_stats = Some(slot_stats);
        self.state = PipelineState::Running;
        log::info!(
            "StreamingPipeline #{}: running on {}",
            self.id,
            stream.describe()
        );
        Ok(())
    }

    /// Dispose the pipeline. Idempotent.
    ///
    /// When this returns no listener call is running or will ever start. Safe
    /// to call from inside the pipeline's own listener.
    pub fn stop(&mut self) {
        if self.state == PipelineState::Stopped {
            return;
        }
        self.outlet.token().cancel();
        if let Some(mut binding) = self.binding.take() {
            binding.unbind();
        }
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() == thread::current().id() {
                // Stopped from our own listener; the worker exits after this callback.
                log::debug!("StreamingPipeline #{}: stop from worker thread", self.id);
            } else if worker.join().is_err() {
                log::warn!("StreamingPipeline #{}: worker panicked", self.id);
            }
        }
        self.state = PipelineState::Stopped;
        let stats = self.stats();
        log::info!(
            "StreamingPipeline #{}: stopped (processed={}, delivered={}, dropped={}, discarded={})",
            self.id,
            stats.frames_processed,
            stats.results_delivered,
            stats.frames_dropped,
            stats.results_discarded
        );
    }
}

impl Drop for StreamingPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(
    id: u64,
    mut detector: Detector,
    frames: SlotReceiver,
    outlet: Outlet,
    counters: Arc<WorkerCounters>,
) {
    let token = outlet.token().clone();
    loop {
        if token.is_cancelled() {
            break;
        }
        let frame = match frames.recv_timeout(IDLE_POLL) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("StreamingPipeline #{}: source disconnected", id);
                break;
            }
        };
        if token.is_cancelled() {
            break;
        }

        detector.detect_streaming(&frame, |outcome| {
            counters.processed.fetch_add(1, Ordering::Relaxed);
            let delivered = match &outcome {
                Ok(result) => {
                    let sent = outlet.result(result);
                    if sent {
                        counters.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    sent
                }
                Err(err) => {
                    log::warn!("StreamingPipeline #{}: frame #{}: {}", id, frame.sequence, err);
                    let sent = outlet.error(err);
                    if sent {
                        counters.errors.fetch_add(1, Ordering::Relaxed);
                    }
                    sent
                }
            };
            if !delivered {
                counters.discarded.fetch_add(1, Ordering::Relaxed);
            }
        });
    }
    detector.close();
}
