//! Video timeline replay.
//!
//! Phase 1 runs batch detection once over every sampled frame of a decoded
//! video. Phase 2 replays the batch against a clock: a timer ticking at the
//! sampling interval (first tick immediately) emits the result for
//! `elapsed / interval` until that index runs past the batch, which ends the
//! replay for good.
//!
//! Elapsed time comes from a monotonic clock sampled when replay starts, not
//! from the media player, so pausing or seeking the player is not reflected.
//! Every replayed result reports the batch's average per-frame inference time.
//!
//! Stopping during phase 1 does not wait for the batch: the worker notices the
//! cancelled token before its next frame, discards the partial batch and
//! releases the engine on its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};

use crate::config::PipelineConfig;
use crate::detect::{BackendRegistry, DetectionBatch, Detector, RunningMode};
use crate::error::{DetectError, DetectResult};
use crate::source::DecodedVideo;

use super::listener::{Outlet, ResultListener};
use super::token::CancellationToken;

/// Batch slot for a point on the playback clock.
pub fn result_index(elapsed_ms: u64, sample_interval_ms: u64) -> usize {
    (elapsed_ms / sample_interval_ms.max(1)) as usize
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayTick {
    /// Show the batch result at this index.
    Emit(usize),
    /// Playback ran past the batch; the timer must stop.
    Finished,
}

/// Pure index bookkeeping for one replay.
#[derive(Clone, Debug)]
pub struct ReplayCursor {
    len: usize,
    sample_interval_ms: u64,
    last: Option<usize>,
    finished: bool,
}

impl ReplayCursor {
    pub fn new(len: usize, sample_interval_ms: u64) -> Self {
        Self {
            len,
            sample_interval_ms,
            last: None,
            finished: false,
        }
    }

    /// Advance to `elapsed_ms`. Indices never move backwards, and once the
    /// cursor finishes every later tick is `Finished`.
    pub fn tick(&mut self, elapsed_ms: u64) -> ReplayTick {
        if self.finished {
            return ReplayTick::Finished;
        }
        let index = result_index(elapsed_ms, self.sample_interval_ms).max(self.last.unwrap_or(0));
        if index >= self.len {
            self.finished = true;
            return ReplayTick::Finished;
        }
        self.last = Some(index);
        ReplayTick::Emit(index)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn last_index(&self) -> Option<usize> {
        self.last
    }
}

// ----------------------------------------------------------------------------
// Timer-driven replayer
// ----------------------------------------------------------------------------

/// Handle to a running batch + replay job. Dropping it stops the timer.
pub struct ReplayHandle {
    token: CancellationToken,
    stop_tx: Option<Sender<()>>,
    /// Set while the worker is still running batch detection.
    batching: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ReplayHandle {
    /// Build the video detector synchronously, then run both phases on a worker.
    pub fn start(
        config: &PipelineConfig,
        registry: &BackendRegistry,
        video: DecodedVideo,
        listener: Arc<dyn ResultListener>,
    ) -> DetectResult<Self> {
        let sample_interval_ms = video.sample_interval_ms();
        if sample_interval_ms == 0 {
            return Err(DetectError::InvalidConfig(
                "sample interval must be greater than zero".to_string(),
            ));
        }
        let detector = Detector::new(config, RunningMode::Video, registry)?;
        let token = CancellationToken::new();
        let outlet = Outlet::new(token.clone(), listener);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let batching = Arc::new(AtomicBool::new(true));
        let phase = batching.clone();

        let worker = thread::Builder::new()
            .name("live-detect-replay".to_string())
            .spawn(move || {
                let batch = run_batch(detector, &video, &outlet);
                phase.store(false, Ordering::SeqCst);
                if let Some(batch) = batch {
                    replay(&batch, &outlet, &stop_rx);
                }
            })
            .map_err(|e| DetectError::EngineInit(format!("failed to spawn worker: {}", e)))?;

        Ok(Self {
            token,
            stop_tx: Some(stop_tx),
            batching,
            worker: Some(worker),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |w| w.is_finished())
    }

    /// Block until the replay reaches its terminal state.
    pub fn wait(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                log::warn!("TimelineReplay: worker panicked");
            }
        }
    }

    /// Stop the timer and suppress further results. Idempotent.
    ///
    /// A worker still in batch detection is detached rather than joined; it
    /// exits before touching another frame.
    pub fn stop(&mut self) {
        self.token.cancel();
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.try_send(());
        }
        if self.batching.load(Ordering::SeqCst) {
            if self.worker.take().is_some() {
                log::debug!("TimelineReplay: stopped during batch detection; worker detached");
            }
            return;
        }
        self.wait();
    }
}

impl Drop for ReplayHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_batch(
    mut detector: Detector,
    video: &DecodedVideo,
    outlet: &Outlet,
) -> Option<DetectionBatch> {
    let outcome = detector.detect_batch_until(video.frames(), video.sample_interval_ms(), || {
        outlet.token().is_cancelled()
    });
    detector.close();
    match outcome {
        Ok(None) => None,
        Ok(Some(batch)) if batch.is_empty() => {
            log::info!("TimelineReplay: empty batch, playing without overlay");
            None
        }
        Ok(Some(batch)) => {
            log::info!(
                "TimelineReplay: batch ready ({} results, {}ms per frame)",
                batch.len(),
                batch.inference_time_ms()
            );
            Some(batch)
        }
        Err(err) => {
            log::warn!("TimelineReplay: batch failed, playing without overlay: {}", err);
            outlet.error(&err);
            None
        }
    }
}

fn replay(batch: &DetectionBatch, outlet: &Outlet, stop_rx: &Receiver<()>) {
    let interval = Duration::from_millis(batch.sample_interval_ms());
    let started = Instant::now();
    let ticker = tick(interval);
    let mut cursor = ReplayCursor::new(batch.len(), batch.sample_interval_ms());

    // First tick fires immediately.
    let mut keep_going = emit(&mut cursor, started, batch, outlet);
    while keep_going {
        select! {
            recv(ticker) -> _ => keep_going = emit(&mut cursor, started, batch, outlet),
            recv(stop_rx) -> _ => keep_going = false,
        }
    }
    log::debug!(
        "TimelineReplay: timer stopped at index {:?} of {}",
        cursor.last_index(),
        batch.len()
    );
}

fn emit(
    cursor: &mut ReplayCursor,
    started: Instant,
    batch: &DetectionBatch,
    outlet: &Outlet,
) -> bool {
    if outlet.token().is_cancelled() {
        return false;
    }
    match cursor.tick(started.elapsed().as_millis() as u64) {
        ReplayTick::Emit(index) => match batch.get(index) {
            Some(result) => {
                let mut shown = result.clone();
                shown.inference_time_ms = batch.inference_time_ms();
                outlet.result(&shown)
            }
            None => false,
        },
        ReplayTick::Finished => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_is_floor_of_elapsed_over_interval() {
        assert_eq!(result_index(0, 300), 0);
        assert_eq!(result_index(299, 300), 0);
        assert_eq!(result_index(950, 300), 3);
        assert_eq!(result_index(3100, 300), 10);
    }

    #[test]
    fn cursor_finishes_at_batch_length() {
        let mut cursor = ReplayCursor::new(10, 300);
        assert_eq!(cursor.tick(950), ReplayTick::Emit(3));
        assert_eq!(cursor.tick(3100), ReplayTick::Finished);
        assert!(cursor.is_finished());
        // Terminal: even an earlier clock reading emits nothing.
        assert_eq!(cursor.tick(0), ReplayTick::Finished);
    }

    #[test]
    fn cursor_never_moves_backwards() {
        let mut cursor = ReplayCursor::new(10, 300);
        assert_eq!(cursor.tick(1500), ReplayTick::Emit(5));
        assert_eq!(cursor.tick(600), ReplayTick::Emit(5));
        assert_eq!(cursor.tick(1800), ReplayTick::Emit(6));
    }

    #[test]
    fn empty_batch_finishes_on_first_tick() {
        let mut cursor = ReplayCursor::new(0, 300);
        assert_eq!(cursor.tick(0), ReplayTick::Finished);
    }
}
