//! Mapping detection geometry from source-frame pixels into display units.
//!
//! The mapping is a plain proportional scale per axis. It assumes the media is
//! drawn to fill the viewport at the frame's aspect ratio; letterboxing is not
//! corrected for.

use serde::{Deserialize, Serialize};

use crate::config::ViewportSettings;
use crate::detect::{BoundingBox, Detection, DetectionResult};
use crate::error::{DetectError, DetectResult};
use crate::frame::FrameDimensions;

/// Destination surface size in display units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl From<&ViewportSettings> for Viewport {
    fn from(settings: &ViewportSettings) -> Self {
        Self::new(settings.width, settings.height)
    }
}

/// A rectangle in display units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct OverlayBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// One drawable overlay entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OverlayItem {
    pub rect: OverlayBox,
    pub caption: String,
}

/// Scale `bounding_box` from a `frame_width` x `frame_height` frame into `viewport`.
pub fn map_box(
    bounding_box: BoundingBox,
    frame_width: f32,
    frame_height: f32,
    viewport: Viewport,
) -> DetectResult<OverlayBox> {
    // NaN fails both comparisons.
    if !(frame_width > 0.0 && frame_height > 0.0) {
        return Err(DetectError::invalid_dimensions(frame_width, frame_height));
    }
    Ok(OverlayBox {
        left: bounding_box.left / frame_width * viewport.width,
        top: bounding_box.top / frame_height * viewport.height,
        width: bounding_box.width / frame_width * viewport.width,
        height: bounding_box.height / frame_height * viewport.height,
    })
}

/// Map every detection of `result` using the frame size recorded on it.
pub fn map_result(result: &DetectionResult, viewport: Viewport) -> DetectResult<Vec<OverlayItem>> {
    let frame_width = result.frame.width as f32;
    let frame_height = result.frame.height as f32;
    result
        .detections
        .iter()
        .map(|detection| {
            Ok(OverlayItem {
                rect: map_box(detection.bounding_box(), frame_width, frame_height, viewport)?,
                caption: caption(detection),
            })
        })
        .collect()
}

/// `"<label> <score>"` with the score text cut to four characters.
pub fn caption(detection: &Detection) -> String {
    let score: String = format!("{:?}", detection.score()).chars().take(4).collect();
    format!("{} {}", detection.label(), score)
}

/// Viewport for media shown at `display_width`, keeping the frame's aspect ratio.
pub fn fitted_viewport(display_width: f32, frame: FrameDimensions) -> DetectResult<Viewport> {
    if frame.width == 0 || frame.height == 0 {
        return Err(DetectError::invalid_dimensions(frame.width, frame.height));
    }
    Ok(Viewport::new(
        display_width,
        display_width * (frame.height as f32 / frame.width as f32),
    ))
}
