use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::PipelineConfig;
use crate::detect::{BackendRegistry, Detector, RunningMode};
use crate::error::{DetectError, DetectResult};
use crate::source::StillImage;

use super::listener::{Outlet, ResultListener};
use super::token::CancellationToken;

/// One-shot detection over a still image, run on its own worker.
pub struct StillImageJob {
    token: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl StillImageJob {
    /// Build the detector synchronously, then detect on a background thread.
    pub fn spawn(
        config: &PipelineConfig,
        registry: &BackendRegistry,
        image: StillImage,
        listener: Arc<dyn ResultListener>,
    ) -> DetectResult<Self> {
        let mut detector = Detector::new(config, RunningMode::Image, registry)?;
        let token = CancellationToken::new();
        let outlet = Outlet::new(token.clone(), listener);

        let worker = thread::Builder::new()
            .name("live-detect-still".to_string())
            .spawn(move || {
                let frame = image.into_frame();
                match detector.detect_single(&frame) {
                    Ok(result) => {
                        log::info!(
                            "StillImageJob: {} detections in {}ms",
                            result.detections.len(),
                            result.inference_time_ms
                        );
                        outlet.result(&result);
                    }
                    Err(err) => {
                        log::warn!("StillImageJob: {}", err);
                        outlet.error(&err);
                    }
                }
                detector.close();
            })
            .map_err(|e| DetectError::EngineInit(format!("failed to spawn worker: {}", e)))?;

        Ok(Self {
            token,
            worker: Some(worker),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |w| w.is_finished())
    }

    /// Block until the job has delivered (or discarded) its result.
    pub fn wait(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                log::warn!("StillImageJob: worker panicked");
            }
        }
    }

    /// Suppress any result not yet delivered. Idempotent.
    ///
    /// An inference still in flight is not waited for: the worker is detached,
    /// discards its result and releases the engine when the call returns.
    pub fn stop(&mut self) {
        self.token.cancel();
        match self.worker.as_ref().map(|w| w.is_finished()) {
            Some(true) => self.wait(),
            Some(false) => {
                self.worker.take();
                log::debug!("StillImageJob: stopped mid-inference; worker detached");
            }
            None => {}
        }
    }
}

impl Drop for StillImageJob {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionBackend;
    use crate::detect::{DetectorBackend, StubBackend};
    use crate::frame::Frame;
    use crate::pipeline::listener::CallbackListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    #[test]
    fn delivers_exactly_one_result() {
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = results.clone();
        let listener = CallbackListener::new().with_result(move |r| {
            sink.lock().unwrap().push(r.frame);
        });

        let mut frame = Frame::filled(320, 320, [100, 100, 100, 255]).unwrap();
        frame.fill_rect(40, 40, 80, 80, [220, 20, 20, 255]);
        let mut job = StillImageJob::spawn(
            &PipelineConfig::default(),
            &BackendRegistry::with_defaults(),
            StillImage::from_frame(frame),
            Arc::new(listener),
        )
        .unwrap();
        job.wait();

        let results = results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].width, 320);
    }

    #[test]
    fn stop_mid_inference_returns_promptly_and_delivers_nothing() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicUsize::new(0));
        let counter = delivered.clone();
        let listener = CallbackListener::new().with_result(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let release_counter = released.clone();
        let mut registry = BackendRegistry::new();
        registry.register(ExecutionBackend::Cpu, move |_| {
            Ok(Box::new(
                StubBackend::new()
                    .with_latency(Duration::from_millis(300))
                    .with_release_counter(release_counter.clone()),
            ) as Box<dyn DetectorBackend>)
        });

        let frame = Frame::filled(16, 16, [100, 100, 100, 255]).unwrap();
        let mut job = StillImageJob::spawn(
            &PipelineConfig::default(),
            &registry,
            StillImage::from_frame(frame),
            Arc::new(listener),
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(30));

        let started = Instant::now();
        job.stop();
        assert!(started.elapsed() < Duration::from_millis(150));

        std::thread::sleep(Duration::from_millis(450));
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
