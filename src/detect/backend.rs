use anyhow::Result;
use serde::Serialize;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// How a detector instance is driven. Fixed when the detector is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum RunningMode {
    /// One decoded still image.
    Image,
    /// Pre-sampled frames of a decoded video, with media timestamps.
    Video,
    /// Live camera frames, results handed to a callback.
    LiveStream,
}

/// The external inference engine.
///
/// Implementations receive the frame read-only for the duration of `detect`
/// and return raw detections in source-frame pixel units. Thresholding,
/// result limits, timing and lifecycle are handled by `Detector`.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend can run in the given mode.
    fn supports(&self, mode: RunningMode) -> bool;

    /// Run detection on one frame.
    ///
    /// `timestamp_ms` is the media or capture time of the frame; image mode passes 0.
    fn detect(&mut self, frame: &Frame, mode: RunningMode, timestamp_ms: u64)
        -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release the engine handle. Called exactly once by the owning `Detector`.
    fn release(&mut self) {}
}
