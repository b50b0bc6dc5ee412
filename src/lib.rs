//! live-detect
//!
//! Real-time object detection over three kinds of frame source: a live camera
//! stream, a single still image and a decoded video clip. Results come back
//! with the frame geometry the detector saw, so they can be drawn over the
//! displayed media, and video results are replayed in step with playback.
//!
//! # Guarantees
//!
//! 1. **Keep-latest**: a live source never queues more than one frame; a busy
//!    worker only ever sees the newest one.
//! 2. **No stale delivery**: once a job is stopped no result or error reaches
//!    its listener, including results from inference already in flight.
//! 3. **Exclusive camera**: binding a second live pipeline fails until the
//!    first is unbound.
//! 4. **Single release**: every detector releases its engine exactly once.
//! 5. **Aligned replay**: batch index `i` is media time `i * interval`.
//!
//! # Module Structure
//!
//! - `detect`: engine trait, registry, `Detector` adapter, result types
//! - `source`: live stream, camera provider, still image, decoded video
//! - `pipeline`: streaming pipeline, still-image job, timeline replay
//! - `overlay`: inference-space to display-space mapping
//! - `session`: `DetectionSession`, the presentation-facing entry point
//! - `config`, `error`, `frame`: ambient types

pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod overlay;
pub mod pipeline;
pub mod session;
pub mod source;

pub use config::{AppConfig, ExecutionBackend, ModelVariant, PipelineConfig};
pub use detect::{
    BackendRegistry, BoundingBox, Detection, DetectionBatch, DetectionResult, Detector,
    DetectorBackend, RunningMode,
};
pub use error::{DetectError, DetectResult, ErrorKind};
pub use frame::{Frame, FrameDimensions};
pub use overlay::{caption, fitted_viewport, map_box, map_result, OverlayBox, OverlayItem, Viewport};
pub use pipeline::{
    CallbackListener, CancellationToken, PipelineState, PipelineStats, ReplayHandle,
    ResultListener, StillImageJob, StreamingPipeline,
};
pub use session::DetectionSession;
pub use source::{
    CameraProvider, DecodedVideo, FramePusher, FrameSource, LiveStream, LiveStreamConfig,
    PixelFormat, StillImage, SyntheticVideo, VideoDecoder,
};
