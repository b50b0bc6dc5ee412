//! Decoded pixel buffers handed to the detector.
//!
//! - `Frame`: one RGBA8888 buffer with authoritative dimensions, a sequence
//!   position and a timestamp. Pixel bytes are private; detectors read them
//!   through `pixels()`.
//! - `FrameDimensions`: the width/height pair carried on every result so the
//!   overlay can map boxes without holding on to the frame.

use serde::{Deserialize, Serialize};

use crate::error::{DetectError, DetectResult};

/// Every frame in the core is RGBA8888.
pub const BYTES_PER_PIXEL: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameDimensions {
    pub width: u32,
    pub height: u32,
}

impl FrameDimensions {
    pub fn new(width: u32, height: u32) -> DetectResult<Self> {
        if width == 0 || height == 0 {
            return Err(DetectError::invalid_dimensions(width, height));
        }
        Ok(Self { width, height })
    }

    /// Number of bytes an RGBA buffer of this size occupies.
    pub fn rgba_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(BYTES_PER_PIXEL))
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One decoded frame.
///
/// `sequence` is assigned by the producing source and increases monotonically.
/// `timestamp_ms` is media time for decoded video and milliseconds since the
/// stream started for live sources.
#[derive(Clone)]
pub struct Frame {
    data: Vec<u8>,
    dimensions: FrameDimensions,
    pub sequence: u64,
    pub timestamp_ms: u64,
}

impl Frame {
    /// Wrap an RGBA8888 buffer. The buffer length must match the dimensions exactly.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        sequence: u64,
        timestamp_ms: u64,
    ) -> DetectResult<Self> {
        let dimensions = FrameDimensions::new(width, height)?;
        let expected = dimensions
            .rgba_len()
            .ok_or_else(|| DetectError::invalid_dimensions(width, height))?;
        if data.len() != expected {
            log::debug!(
                "Frame: RGBA length mismatch for {}x{}: expected {}, got {}",
                width,
                height,
                expected,
                data.len()
            );
            return Err(DetectError::invalid_dimensions(width, height));
        }
        Ok(Self {
            data,
            dimensions,
            sequence,
            timestamp_ms,
        })
    }

    /// A frame filled with a single RGBA colour.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> DetectResult<Self> {
        let dimensions = FrameDimensions::new(width, height)?;
        let len = dimensions
            .rgba_len()
            .ok_or_else(|| DetectError::invalid_dimensions(width, height))?;
        let data = rgba.iter().copied().cycle().take(len).collect();
        Self::new(data, width, height, 0, 0)
    }

    pub fn with_position(mut self, sequence: u64, timestamp_ms: u64) -> Self {
        self.sequence = sequence;
        self.timestamp_ms = timestamp_ms;
        self
    }

    pub fn width(&self) -> u32 {
        self.dimensions.width
    }

    pub fn height(&self) -> u32 {
        self.dimensions.height
    }

    pub fn dimensions(&self) -> FrameDimensions {
        self.dimensions
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// RGBA value at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let offset = (y as usize * self.width() as usize + x as usize) * BYTES_PER_PIXEL;
        let px = self.data.get(offset..offset + BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Paint an axis-aligned rectangle, clipped to the frame.
    pub fn fill_rect(&mut self, left: u32, top: u32, width: u32, height: u32, rgba: [u8; 4]) {
        let right = left.saturating_add(width).min(self.width());
        let bottom = top.saturating_add(height).min(self.height());
        let stride = self.width() as usize * BYTES_PER_PIXEL;
        for y in top..bottom {
            for x in left..right {
                let offset = y as usize * stride + x as usize * BYTES_PER_PIXEL;
                self.data[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&rgba);
            }
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel bytes stay out of logs.
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("sequence", &self.sequence)
            .field("timestamp_ms", &self.timestamp_ms)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
