#[cfg(feature = "decode-image")]
use std::path::Path;

use crate::error::DetectResult;
#[cfg(feature = "decode-image")]
use crate::error::DetectError;
use crate::frame::{Frame, FrameDimensions};

/// A single still image, decoded once.
#[derive(Clone, Debug)]
pub struct StillImage {
    frame: Frame,
}

impl StillImage {
    pub fn from_frame(frame: Frame) -> Self {
        Self {
            frame: frame.with_position(0, 0),
        }
    }

    /// Wrap a raw RGBA8888 buffer.
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32) -> DetectResult<Self> {
        Ok(Self::from_frame(Frame::new(data, width, height, 0, 0)?))
    }

    /// Decode an encoded image (PNG, JPEG) held in memory.
    #[cfg(feature = "decode-image")]
    pub fn decode(bytes: &[u8]) -> DetectResult<Self> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| DetectError::InferenceFailure(format!("image decode failed: {}", e)))?;
        Self::from_dynamic(image)
    }

    /// Decode an image file from a local path.
    #[cfg(feature = "decode-image")]
    pub fn open(path: impl AsRef<Path>) -> DetectResult<Self> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|e| {
            DetectError::InferenceFailure(format!("failed to open {}: {}", path.display(), e))
        })?;
        log::debug!(
            "StillImage: decoded {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        Self::from_dynamic(image)
    }

    #[cfg(feature = "decode-image")]
    fn from_dynamic(image: image::DynamicImage) -> DetectResult<Self> {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_rgba(rgba.into_raw(), width, height)
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }

    pub fn dimensions(&self) -> FrameDimensions {
        self.frame.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgba_validates_length() {
        assert!(matches!(
            StillImage::from_rgba(vec![0u8; 15], 2, 2),
            Err(crate::error::DetectError::InvalidFrameDimensions { .. })
        ));
        let image = StillImage::from_rgba(vec![0u8; 16], 2, 2).unwrap();
        assert_eq!(image.dimensions(), FrameDimensions { width: 2, height: 2 });
    }

    #[cfg(feature = "decode-image")]
    #[test]
    fn decodes_png_bytes() {
        use image::{ImageBuffer, ImageFormat, Rgba};
        use std::io::Cursor;

        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(3, 2, Rgba([200, 10, 10, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let still = StillImage::decode(&bytes).unwrap();
        assert_eq!(still.frame().width(), 3);
        assert_eq!(still.frame().pixel(2, 1), Some([200, 10, 10, 255]));
    }

    #[cfg(feature = "decode-image")]
    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(StillImage::decode(b"not an image").is_err());
    }
}
