//! Decoded video: a finite, eagerly sampled frame sequence.
//!
//! Decoding itself is an external capability (`VideoDecoder`). `DecodedVideo`
//! samples it at a fixed interval over the whole duration before any result
//! is produced, so the batch detector sees the complete sequence at once.

use anyhow::{anyhow, Result};

use crate::error::{DetectError, DetectResult};
use crate::frame::{Frame, FrameDimensions};

/// Upper bound on frames held by one `DecodedVideo`.
pub const MAX_SAMPLED_FRAMES: u64 = 10_000;

/// Random-access video frame decoder.
pub trait VideoDecoder {
    /// Total media duration in milliseconds.
    fn duration_ms(&self) -> u64;

    /// Decode the frame closest to `timestamp_ms`.
    fn frame_at(&mut self, timestamp_ms: u64) -> Result<Frame>;

    fn describe(&self) -> String {
        "video".to_string()
    }
}

#[derive(Clone, Debug)]
pub struct DecodedVideo {
    frames: Vec<Frame>,
    sample_interval_ms: u64,
    duration_ms: u64,
}

impl DecodedVideo {
    /// Sample `decoder` at `0, i, 2i, ...` up to and including its duration.
    ///
    /// Frames the decoder cannot produce are skipped; the batch detector
    /// leaves their slots empty.
    pub fn sample(decoder: &mut dyn VideoDecoder, sample_interval_ms: u64) -> DetectResult<Self> {
        if sample_interval_ms == 0 {
            return Err(DetectError::InvalidConfig(
                "sample interval must be greater than zero".to_string(),
            ));
        }
        let duration_ms = decoder.duration_ms();
        let count = (duration_ms / sample_interval_ms)
            .checked_add(1)
            .filter(|count| *count <= MAX_SAMPLED_FRAMES)
            .ok_or_else(|| {
                DetectError::InvalidConfig(format!(
                    "{} lasts {}ms; sampling every {}ms exceeds {} frames",
                    decoder.describe(),
                    duration_ms,
                    sample_interval_ms,
                    MAX_SAMPLED_FRAMES
                ))
            })?;
        let mut frames = Vec::with_capacity(count as usize);
        for index in 0..count {
            let timestamp_ms = index * sample_interval_ms;
            match decoder.frame_at(timestamp_ms) {
                Ok(frame) => frames.push(frame.with_position(index, timestamp_ms)),
                Err(err) => log::warn!(
                    "DecodedVideo: {} has no frame at {}ms: {:#}",
                    decoder.describe(),
                    timestamp_ms,
                    err
                ),
            }
        }
        log::info!(
            "DecodedVideo: sampled {}/{} frames from {} ({}ms every {}ms)",
            frames.len(),
            count,
            decoder.describe(),
            duration_ms,
            sample_interval_ms
        );
        Ok(Self {
            frames,
            sample_interval_ms,
            duration_ms,
        })
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn sample_interval_ms(&self) -> u64 {
        self.sample_interval_ms
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Size of the sampled frames, if any were decoded.
    pub fn dimensions(&self) -> Option<FrameDimensions> {
        self.frames.first().map(Frame::dimensions)
    }
}

// ----------------------------------------------------------------------------
// Synthetic decoder (stub://)
// ----------------------------------------------------------------------------

/// Decoder that renders a coloured block crossing the frame over the clip.
pub struct SyntheticVideo {
    uri: String,
    duration_ms: u64,
    width: u32,
    height: u32,
    unreadable: Vec<u64>,
}

impl SyntheticVideo {
    pub fn open(uri: &str, duration_ms: u64, width: u32, height: u32) -> DetectResult<Self> {
        if !uri.starts_with("stub://") {
            return Err(DetectError::InvalidConfig(format!(
                "unsupported video URI '{}': only stub:// is decodable",
                uri
            )));
        }
        FrameDimensions::new(width, height)?;
        Ok(Self {
            uri: uri.to_string(),
            duration_ms,
            width,
            height,
            unreadable: Vec::new(),
        })
    }

    /// Make `frame_at` fail for these timestamps.
    pub fn with_unreadable(mut self, timestamps_ms: &[u64]) -> Self {
        self.unreadable = timestamps_ms.to_vec();
        self
    }
}

impl VideoDecoder for SyntheticVideo {
    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn frame_at(&mut self, timestamp_ms: u64) -> Result<Frame> {
        if timestamp_ms > self.duration_ms {
            return Err(anyhow!(
                "timestamp {}ms past end of {}ms clip",
                timestamp_ms,
                self.duration_ms
            ));
        }
        if self.unreadable.contains(&timestamp_ms) {
            return Err(anyhow!("corrupt packet at {}ms", timestamp_ms));
        }

        let mut frame = Frame::filled(self.width, self.height, [30, 30, 30, 255])?;
        let side = (self.width.min(self.height) / 3).max(1);
        let travel = self.width.saturating_sub(side) as u64;
        let left = if self.duration_ms == 0 {
            0
        } else {
            travel * timestamp_ms / self.duration_ms
        };
        frame.fill_rect(
            left as u32,
            (self.height - side.min(self.height)) / 2,
            side,
            side,
            [230, 120, 20, 255],
        );
        Ok(frame.with_position(0, timestamp_ms))
    }

    fn describe(&self) -> String {
        self.uri.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_whole_duration_inclusive() {
        let mut decoder = SyntheticVideo::open("stub://clip", 3000, 32, 24).unwrap();
        let video = DecodedVideo::sample(&mut decoder, 300).unwrap();
        assert_eq!(video.len(), 11);
        let stamps: Vec<_> = video.frames().iter().map(|f| f.timestamp_ms).collect();
        assert_eq!(stamps.first(), Some(&0));
        assert_eq!(stamps.last(), Some(&3000));
        assert!(video.frames().windows(2).all(|w| w[0].sequence < w[1].sequence));
    }

    #[test]
    fn unreadable_frames_are_skipped() {
        let mut decoder = SyntheticVideo::open("stub://clip", 900, 16, 16)
            .unwrap()
            .with_unreadable(&[300]);
        let video = DecodedVideo::sample(&mut decoder, 300).unwrap();
        let stamps: Vec<_> = video.frames().iter().map(|f| f.timestamp_ms).collect();
        assert_eq!(stamps, vec![0, 600, 900]);
    }

    #[test]
    fn zero_interval_is_invalid() {
        let mut decoder = SyntheticVideo::open("stub://clip", 900, 16, 16).unwrap();
        assert!(matches!(
            DecodedVideo::sample(&mut decoder, 0),
            Err(DetectError::InvalidConfig(_))
        ));
    }

    #[test]
    fn oversized_sampling_is_rejected_before_decoding() {
        let mut decoder = SyntheticVideo::open("stub://endless", u64::MAX, 4, 4).unwrap();
        assert!(matches!(
            DecodedVideo::sample(&mut decoder, 1),
            Err(DetectError::InvalidConfig(_))
        ));
        let mut decoder = SyntheticVideo::open("stub://long", 3_600_000, 4, 4).unwrap();
        assert!(matches!(
            DecodedVideo::sample(&mut decoder, 300),
            Err(DetectError::InvalidConfig(_))
        ));
        let mut decoder =
            SyntheticVideo::open("stub://edge", (MAX_SAMPLED_FRAMES - 1) * 10, 4, 4).unwrap();
        assert_eq!(
            DecodedVideo::sample(&mut decoder, 10).unwrap().len(),
            MAX_SAMPLED_FRAMES as usize
        );
    }

    #[test]
    fn only_stub_uris_open() {
        assert!(SyntheticVideo::open("file:///clip.mp4", 100, 4, 4).is_err());
    }
}
