use serde::Serialize;

use crate::frame::FrameDimensions;

/// Axis-aligned box in source-frame pixel units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    /// True when the box lies entirely inside a frame of the given size.
    pub fn is_within(&self, frame: FrameDimensions) -> bool {
        self.left >= 0.0
            && self.top >= 0.0
            && self.width >= 0.0
            && self.height >= 0.0
            && self.right() <= frame.width as f32
            && self.bottom() <= frame.height as f32
    }
}

/// One labelled, scored, localized object.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    label: String,
    score: f32,
    bounding_box: BoundingBox,
}

impl Detection {
    /// Scores are clamped into `[0, 1]`.
    pub fn new(label: impl Into<String>, score: f32, bounding_box: BoundingBox) -> Self {
        let score = if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 1.0)
        };
        Self {
            label: label.into(),
            score,
            bounding_box,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }
}

/// Detections for one processed frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
    pub inference_time_ms: u64,
    /// Frame size the detector saw; boxes are relative to this.
    pub frame: FrameDimensions,
    pub sequence: u64,
    pub timestamp_ms: u64,
}

impl DetectionResult {
    /// Placeholder for a frame that produced nothing (gap or per-frame failure).
    pub fn empty(frame: FrameDimensions, sequence: u64, timestamp_ms: u64) -> Self {
        Self {
            detections: Vec::new(),
            inference_time_ms: 0,
            frame,
            sequence,
            timestamp_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Results for every sampled frame of a video, in capture order.
///
/// Index `i` holds the result for media time `i * sample_interval_ms`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionBatch {
    results: Vec<DetectionResult>,
    sample_interval_ms: u64,
    inference_time_ms: u64,
}

impl DetectionBatch {
    pub(crate) fn new(
        results: Vec<DetectionResult>,
        sample_interval_ms: u64,
        inference_time_ms: u64,
    ) -> Self {
        Self {
            results,
            sample_interval_ms,
            inference_time_ms,
        }
    }

    pub fn empty(sample_interval_ms: u64) -> Self {
        Self::new(Vec::new(), sample_interval_ms, 0)
    }

    pub fn get(&self, index: usize) -> Option<&DetectionResult> {
        self.results.get(index)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> &[DetectionResult] {
        &self.results
    }

    pub fn sample_interval_ms(&self) -> u64 {
        self.sample_interval_ms
    }

    /// Average wall-clock inference time per sampled frame.
    pub fn inference_time_ms(&self) -> u64 {
        self.inference_time_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_clamps_score() {
        let d = Detection::new("banana", 1.7, BoundingBox::default());
        assert_eq!(d.score(), 1.0);
        let d = Detection::new("banana", f32::NAN, BoundingBox::default());
        assert_eq!(d.score(), 0.0);
    }

    #[test]
    fn box_containment() {
        let frame = FrameDimensions {
            width: 100,
            height: 50,
        };
        assert!(BoundingBox::new(10.0, 10.0, 90.0, 40.0).is_within(frame));
        assert!(!BoundingBox::new(10.0, 10.0, 91.0, 40.0).is_within(frame));
        assert!(!BoundingBox::new(-1.0, 0.0, 5.0, 5.0).is_within(frame));
    }

    #[test]
    fn batch_lookup_is_bounded() {
        let dims = FrameDimensions {
            width: 4,
            height: 4,
        };
        let batch = DetectionBatch::new(
            vec![
                DetectionResult::empty(dims, 0, 0),
                DetectionResult::empty(dims, 1, 300),
            ],
            300,
            12,
        );
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get(1).map(|r| r.timestamp_ms), Some(300));
        assert!(batch.get(2).is_none());
        assert!(DetectionBatch::empty(300).is_empty());
    }
}
