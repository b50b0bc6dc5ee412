use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::detect::backend::{DetectorBackend, RunningMode};
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

const STUB_LABELS: [&str; 6] = ["tomato", "orange", "banana", "lettuce", "blueberry", "grape"];

/// Stub backend for tests and the demo.
///
/// By default it reports one detection whose label, score and box are derived
/// from a SHA-256 digest of the pixels, so identical frames give identical
/// results. Builders add scripted output, latency and failure injection.
pub struct StubBackend {
    fixed: Option<Vec<Detection>>,
    latency: Duration,
    fail_every: Option<usize>,
    modes: Vec<RunningMode>,
    calls: Arc<AtomicUsize>,
    released: Option<Arc<AtomicUsize>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            fixed: None,
            latency: Duration::ZERO,
            fail_every: None,
            modes: vec![
                RunningMode::Image,
                RunningMode::Video,
                RunningMode::LiveStream,
            ],
            calls: Arc::new(AtomicUsize::new(0)),
            released: None,
        }
    }

    /// Always report these detections (before thresholding).
    pub fn with_fixed_detections(mut self, detections: Vec<Detection>) -> Self {
        self.fixed = Some(detections);
        self
    }

    /// Block each `detect` call for `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every `n`th call (1-based). `n == 0` disables failures.
    pub fn failing_every(mut self, n: usize) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    pub fn with_modes(mut self, modes: &[RunningMode]) -> Self {
        self.modes = modes.to_vec();
        self
    }

    /// Share a counter incremented on every `detect` call.
    pub fn with_call_counter(mut self, calls: Arc<AtomicUsize>) -> Self {
        self.calls = calls;
        self
    }

    /// Share a counter incremented when the engine handle is released.
    pub fn with_release_counter(mut self, released: Arc<AtomicUsize>) -> Self {
        self.released = Some(released);
        self
    }

    fn digest_detection(frame: &Frame) -> Detection {
        let digest: [u8; 32] = Sha256::digest(frame.pixels()).into();
        let width = frame.width() as f32;
        let height = frame.height() as f32;
        let label = STUB_LABELS[digest[0] as usize % STUB_LABELS.len()];
        let score = 0.5 + digest[1] as f32 / 510.0;
        let left = digest[2] as f32 / 255.0 * width / 2.0;
        let top = digest[3] as f32 / 255.0 * height / 2.0;
        let box_width = (0.25 + digest[4] as f32 / 1020.0) * width;
        let box_height = (0.25 + digest[5] as f32 / 1020.0) * height;
        Detection::new(
            label,
            score,
            BoundingBox::new(left, top, box_width, box_height),
        )
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports(&self, mode: RunningMode) -> bool {
        self.modes.contains(&mode)
    }

    fn detect(
        &mut self,
        frame: &Frame,
        _mode: RunningMode,
        _timestamp_ms: u64,
    ) -> Result<Vec<Detection>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        if let Some(n) = self.fail_every {
            if call % n == 0 {
                return Err(anyhow!("stub failure on call {}", call));
            }
        }
        Ok(match &self.fixed {
            Some(fixed) => fixed.clone(),
            None => vec![Self::digest_detection(frame)],
        })
    }

    fn release(&mut self) {
        if let Some(released) = &self.released {
            released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_detection_is_deterministic_and_in_frame() {
        let mut backend = StubBackend::new();
        let mut frame = Frame::filled(64, 48, [0, 0, 0, 255]).unwrap();
        frame.fill_rect(5, 5, 10, 10, [200, 10, 10, 255]);

        let a = backend.detect(&frame, RunningMode::Image, 0).unwrap();
        let b = backend.detect(&frame, RunningMode::Image, 0).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 1);
        assert!(a[0].score() >= 0.5);
        assert!(a[0].bounding_box().is_within(frame.dimensions()));
    }

    #[test]
    fn failure_injection_counts_calls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut backend = StubBackend::new()
            .failing_every(2)
            .with_call_counter(calls.clone());
        let frame = Frame::filled(4, 4, [1, 1, 1, 255]).unwrap();

        assert!(backend.detect(&frame, RunningMode::Video, 0).is_ok());
        assert!(backend.detect(&frame, RunningMode::Video, 300).is_err());
        assert!(backend.detect(&frame, RunningMode::Video, 600).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
