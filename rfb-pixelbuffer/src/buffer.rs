//! Pixel buffer traits.
//!
//! - [`PixelBuffer`]: read-only access to pixel data
//! - [`MutablePixelBuffer`]: the two write primitives decoders need
//!
//! # Stride is in Pixels, Not Bytes
//!
//! All stride values in this API are measured in **pixels**. To calculate
//! byte offsets:
//!
//! ```text
//! byte_offset = (y * stride + x) * bytes_per_pixel
//! ```

use crate::PixelFormat;
use anyhow::Result;
use rfb_common::Rect;

/// Read-only access to a pixel buffer.
pub trait PixelBuffer {
    /// Buffer dimensions as `(width, height)` in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Pixel format of the stored pixels.
    fn pixel_format(&self) -> &PixelFormat;

    /// Borrow the rows covering `rect`. On success `stride` is set to the
    /// buffer stride in pixels and the returned slice starts at `rect`'s
    /// top-left pixel. Returns `None` when `rect` is outside the buffer.
    fn get_buffer(&self, rect: Rect, stride: &mut usize) -> Option<&[u8]>;
}

/// Write access used by decoders.
///
/// Both operations validate `rect` against the buffer bounds and fail
/// without touching any pixel when it does not fit.
pub trait MutablePixelBuffer: PixelBuffer {
    /// Fill `rect` with one native pixel (`bytes_per_pixel()` bytes).
    fn fill_rect(&mut self, rect: Rect, pixel: &[u8]) -> Result<()>;

    /// Copy native pixels into `dest`. `stride` is the source row length in
    /// pixels; 0 means tightly packed (`dest.width`).
    fn image_rect(&mut self, dest: Rect, pixels: &[u8], stride: usize) -> Result<()>;
}
