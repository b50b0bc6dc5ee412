use anyhow::{anyhow, Result};

use crate::frame::BYTES_PER_PIXEL;

/// Raw sensor layouts accepted from the camera analyzer callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8888,
    Rgb24,
    Nv12,
}

/// Convert a raw sensor buffer into RGBA8888.
pub(crate) fn normalize_to_rgba(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    match format {
        PixelFormat::Rgba8888 => {
            check_len(pixels, width, height, BYTES_PER_PIXEL, "RGBA")?;
            Ok(pixels.to_vec())
        }
        PixelFormat::Rgb24 => {
            check_len(pixels, width, height, 3, "RGB")?;
            let mut rgba = Vec::with_capacity(pixels.len() / 3 * BYTES_PER_PIXEL);
            for px in pixels.chunks_exact(3) {
                rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
            }
            Ok(rgba)
        }
        PixelFormat::Nv12 => nv12_to_rgba(pixels, width, height),
    }
}

fn check_len(pixels: &[u8], width: u32, height: u32, bpp: usize, name: &str) -> Result<()> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(bpp))
        .ok_or_else(|| anyhow!("{} frame dimensions overflow", name))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "{} frame length mismatch: expected {}, got {}",
            name,
            expected,
            pixels.len()
        ));
    }
    Ok(())
}

fn nv12_to_rgba(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    if w % 2 != 0 || h % 2 != 0 {
        return Err(anyhow!("NV12 frames need even dimensions, got {}x{}", w, h));
    }
    let y_plane = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    let expected = y_plane + y_plane / 2;
    if pixels.len() != expected {
        return Err(anyhow!(
            "NV12 frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgba = vec![255u8; y_plane * BYTES_PER_PIXEL];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;

            let offset = (j * w + i) * BYTES_PER_PIXEL;
            rgba[offset] = clamp_to_u8(y + 1.402_f32 * v);
            rgba[offset + 1] = clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v);
            rgba[offset + 2] = clamp_to_u8(y + 1.772_f32 * u);
        }
    }

    Ok(rgba)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_neutral_chroma_is_gray() -> Result<()> {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();
        let rgba = normalize_to_rgba(&nv12, 2, 2, PixelFormat::Nv12)?;
        assert_eq!(rgba, [128, 128, 128, 255].repeat(4));
        Ok(())
    }

    #[test]
    fn rgb_gains_opaque_alpha() -> Result<()> {
        let rgba = normalize_to_rgba(&[1, 2, 3, 4, 5, 6], 2, 1, PixelFormat::Rgb24)?;
        assert_eq!(rgba, vec![1, 2, 3, 255, 4, 5, 6, 255]);
        Ok(())
    }

    #[test]
    fn length_mismatch_is_rejected() {
        assert!(normalize_to_rgba(&[0u8; 7], 1, 2, PixelFormat::Rgba8888).is_err());
        assert!(normalize_to_rgba(&[0u8; 5], 2, 2, PixelFormat::Nv12).is_err());
    }
}
