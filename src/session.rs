//! Presentation-facing entry point.
//!
//! A `DetectionSession` holds the current `PipelineConfig` and listeners and
//! runs at most one job at a time. `start` dispatches on the `FrameSource`
//! variant: live streams get a `StreamingPipeline`, still images a
//! `StillImageJob`, decoded video a `ReplayHandle` that replays at the
//! interval the video was sampled with.
//!
//! Listeners are captured when a job starts; registering new ones takes effect
//! on the next `start`. Do not call back into the session from a listener.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{AppConfig, PipelineConfig};
use crate::detect::{BackendRegistry, DetectionResult};
use crate::error::{DetectResult, ErrorKind};
use crate::pipeline::{
    CallbackListener, ErrorCallback, ReplayHandle, ResultCallback, ResultListener, StillImageJob,
    StreamingPipeline,
};
use crate::source::{CameraProvider, FrameSource};

const NO_INFERENCE_YET: u64 = u64::MAX;

enum ActiveJob {
    Streaming(StreamingPipeline),
    Still(StillImageJob),
    Replay(ReplayHandle),
}

impl ActiveJob {
    fn stop(&mut self) {
        match self {
            ActiveJob::Streaming(pipeline) => pipeline.stop(),
            ActiveJob::Still(job) => job.stop(),
            ActiveJob::Replay(handle) => handle.stop(),
        }
    }
}

pub struct DetectionSession {
    config: PipelineConfig,
    registry: Arc<BackendRegistry>,
    camera: Arc<CameraProvider>,
    on_result: Option<ResultCallback>,
    on_error: Option<ErrorCallback>,
    last_inference_ms: Arc<AtomicU64>,
    job: Option<ActiveJob>,
}

impl DetectionSession {
    /// Session on the default engines and the process-wide camera.
    pub fn new(config: PipelineConfig) -> DetectResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry: Arc::new(BackendRegistry::with_defaults()),
            camera: CameraProvider::shared(),
            on_result: None,
            on_error: None,
            last_inference_ms: Arc::new(AtomicU64::new(NO_INFERENCE_YET)),
            job: None,
        })
    }

    pub fn from_app_config(app: &AppConfig) -> DetectResult<Self> {
        Self::new(app.pipeline.clone())
    }

    pub fn with_registry(mut self, registry: Arc<BackendRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_camera(mut self, camera: Arc<CameraProvider>) -> Self {
        self.camera = camera;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn on_result<F>(&mut self, f: F)
    where
        F: Fn(&DetectionResult) + Send + Sync + 'static,
    {
        self.on_result = Some(Arc::new(f));
    }

    pub fn on_error<F>(&mut self, f: F)
    where
        F: Fn(ErrorKind, &str) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
    }

    /// Replace the pipeline config. A running job is torn down; the next
    /// `start` builds a fresh detector from the new config.
    pub fn configure(&mut self, config: PipelineConfig) -> DetectResult<()> {
        config.validate()?;
        if self.job.is_some() {
            log::info!("DetectionSession: config changed, tearing down running job");
            self.stop();
        }
        self.config = config;
        Ok(())
    }

    /// Stop any current job, then run the strategy matching `source`.
    pub fn start(&mut self, source: FrameSource) -> DetectResult<()> {
        self.stop();
        let kind = source.kind();
        let listener = self.listener();
        let job = match source {
            FrameSource::LiveStream(stream) => {
                let mut pipeline = StreamingPipeline::new(
                    self.config.clone(),
                    self.registry.clone(),
                    self.camera.clone(),
                    listener,
                );
                pipeline.start(stream)?;
                ActiveJob::Streaming(pipeline)
            }
            FrameSource::StillImage(image) => ActiveJob::Still(StillImageJob::spawn(
                &self.config,
                &self.registry,
                image,
                listener,
            )?),
            FrameSource::DecodedVideo(video) => ActiveJob::Replay(ReplayHandle::start(
                &self.config,
                &self.registry,
                video,
                listener,
            )?),
        };
        log::info!("DetectionSession: started {} job", kind);
        self.job = Some(job);
        Ok(())
    }

    /// Stop the running job, if any. Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut job) = self.job.take() {
            job.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.job.is_some()
    }

    /// Inference time of the most recent delivered result.
    pub fn last_inference_time_ms(&self) -> Option<u64> {
        match self.last_inference_ms.load(Ordering::SeqCst) {
            NO_INFERENCE_YET => None,
            ms => Some(ms),
        }
    }

    /// Block until a still-image or replay job has run to completion.
    /// Live streams run until stopped, so this returns at once for them.
    pub fn wait(&mut self) {
        match &mut self.job {
            Some(ActiveJob::Still(job)) => job.wait(),
            Some(ActiveJob::Replay(handle)) => handle.wait(),
            _ => {}
        }
    }

    fn listener(&self) -> Arc<dyn ResultListener> {
        let user = self.on_result.clone();
        let last = self.last_inference_ms.clone();
        let on_result: ResultCallback = Arc::new(move |result: &DetectionResult| {
            last.store(result.inference_time_ms, Ordering::SeqCst);
            if let Some(f) = &user {
                f(result);
            }
        });
        Arc::new(CallbackListener::from_parts(
            Some(on_result),
            self.on_error.clone(),
        ))
    }
}

impl Drop for DetectionSession {
    fn drop(&mut self) {
        self.stop();
    }
}
