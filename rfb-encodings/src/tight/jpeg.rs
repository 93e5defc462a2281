//! JPEG sub-encoding: a baseline JPEG image covering the whole rectangle.

use crate::error::{resize_buffer, DecodeError, Result};
use crate::PixelFormat;
use jpeg_decoder::PixelFormat as JpegPixelFormat;

/// Decode `data` into native pixels of `pixel_format` in `out`.
///
/// The image must be exactly `width` x `height`. RGB and grayscale JPEGs are
/// accepted; each 8-bit channel is scaled into the format with rounding.
pub fn decode_jpeg(
    data: &[u8],
    width: usize,
    height: usize,
    pixel_format: &PixelFormat,
    out: &mut Vec<u8>,
) -> Result<()> {
    let mut decoder = jpeg_decoder::Decoder::new(data);
    let decoded = decoder
        .decode()
        .map_err(|e| DecodeError::codec(format!("JPEG decode failed: {e}")))?;
    let info = decoder
        .info()
        .ok_or_else(|| DecodeError::codec("JPEG decoder returned no image info"))?;

    if info.width as usize != width || info.height as usize != height {
        return Err(DecodeError::codec(format!(
            "JPEG is {}x{} but the rectangle is {}x{}",
            info.width, info.height, width, height
        )));
    }

    let components = match info.pixel_format {
        JpegPixelFormat::RGB24 => 3,
        JpegPixelFormat::L8 => 1,
        other => {
            return Err(DecodeError::codec(format!(
                "unsupported JPEG color format {other:?}"
            )))
        }
    };
    let pixels = width * height;
    if decoded.len() < pixels * components {
        return Err(DecodeError::codec(format!(
            "JPEG produced {} bytes, expected {}",
            decoded.len(),
            pixels * components
        )));
    }

    let bpp = pixel_format.bytes_per_pixel() as usize;
    resize_buffer(out, pixels * bpp)?;

    for (src, dst) in decoded
        .chunks_exact(components)
        .zip(out.chunks_exact_mut(bpp))
    {
        let pixel = if components == 3 {
            pixel_format.pixel_from_rgb24(src[0], src[1], src[2])
        } else {
            pixel_format.pixel_from_rgb24(src[0], src[0], src[0])
        };
        pixel_format.write_pixel(pixel, dst);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ErrorKind;
    use image::codecs::jpeg::JpegEncoder;
    use image::ColorType;

    /// Encode a solid-color RGB image at maximum quality.
    pub(crate) fn solid_jpeg(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let pixels: Vec<u8> = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 100)
            .encode(&pixels, width, height, ColorType::Rgb8)
            .unwrap();
        out
    }

    fn close(a: u32, b: u32, tolerance: u32) -> bool {
        a.abs_diff(b) <= tolerance
    }

    #[test]
    fn test_decode_solid_rgb888() {
        let pf = PixelFormat::rgb888();
        let data = solid_jpeg(16, 8, [200, 100, 50]);
        let mut out = Vec::new();
        decode_jpeg(&data, 16, 8, &pf, &mut out).unwrap();

        assert_eq!(out.len(), 16 * 8 * 4);
        let [r, g, b] = pf.channels();
        for px in out.chunks_exact(4) {
            let v = pf.read_pixel(px);
            assert!(close(r.extract(v), 200, 3), "red {}", r.extract(v));
            assert!(close(g.extract(v), 100, 3), "green {}", g.extract(v));
            assert!(close(b.extract(v), 50, 3), "blue {}", b.extract(v));
        }
    }

    #[test]
    fn test_decode_into_rgb565() {
        let pf = PixelFormat::rgb565();
        let data = solid_jpeg(8, 8, [255, 255, 255]);
        let mut out = Vec::new();
        decode_jpeg(&data, 8, 8, &pf, &mut out).unwrap();

        assert_eq!(out.len(), 8 * 8 * 2);
        for px in out.chunks_exact(2) {
            assert_eq!(pf.read_pixel(px), 0xFFFF);
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let pf = PixelFormat::rgb888();
        let data = solid_jpeg(8, 8, [0, 0, 0]);
        let err = decode_jpeg(&data, 8, 9, &pf, &mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Codec);
    }

    #[test]
    fn test_garbage_is_codec_error() {
        let pf = PixelFormat::rgb888();
        let err = decode_jpeg(&[0xFF, 0xD8, 0x00, 0x01], 1, 1, &pf, &mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Codec);
    }
}
