//! Owned framebuffer storage.
//!
//! [`ManagedPixelBuffer`] keeps the whole remote screen in one `Vec<u8>` in the
//! negotiated pixel format. The decode path shares it between the dispatcher
//! and Tight workers through a [`FramebufferHandle`].
//!
//! # Example
//!
//! ```
//! use rfb_pixelbuffer::{ManagedPixelBuffer, MutablePixelBuffer, PixelBuffer, PixelFormat};
//! use rfb_common::Rect;
//!
//! let mut buffer = ManagedPixelBuffer::new(100, 100, PixelFormat::rgb888());
//! buffer.fill_rect(Rect::new(10, 10, 50, 50), &[0x00, 0x00, 0xFF, 0x00]).unwrap();
//! assert_eq!(buffer.dimensions(), (100, 100));
//! assert_eq!(buffer.pixel(10, 10), Some(&[0x00, 0x00, 0xFF, 0x00][..]));
//! ```

use crate::{MutablePixelBuffer, PixelBuffer, PixelFormat};
use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use rfb_common::Rect;
use std::sync::Arc;

/// Framebuffer shared between the decoding task and decode workers.
///
/// Workers lock it only for the final blit of a finished rectangle.
pub type FramebufferHandle = Arc<Mutex<dyn MutablePixelBuffer + Send>>;

#[derive(Debug, Clone)]
pub struct ManagedPixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
    stride: usize,
}

impl ManagedPixelBuffer {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let stride = width as usize;
        let bytes_per_pixel = format.bytes_per_pixel() as usize;
        let data = vec![0u8; stride * height as usize * bytes_per_pixel];

        Self {
            width,
            height,
            format,
            data,
            stride,
        }
    }

    /// Wrap the buffer into a [`FramebufferHandle`], returning the concrete
    /// handle as well so the owner can still read pixels back.
    pub fn into_shared(self) -> (Arc<Mutex<ManagedPixelBuffer>>, FramebufferHandle) {
        let concrete = Arc::new(Mutex::new(self));
        let handle: FramebufferHandle = concrete.clone();
        (concrete, handle)
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Native bytes of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel() as usize;
        let offset = (y as usize * self.stride + x as usize) * bpp;
        Some(&self.data[offset..offset + bpp])
    }

    fn validate_rect(&self, rect: Rect) -> Result<()> {
        if !rect.fits_within(self.width, self.height) {
            return Err(anyhow!(
                "Rectangle out of bounds: {:?} (buffer size: {}x{})",
                rect,
                self.width,
                self.height
            ));
        }
        Ok(())
    }
}

impl PixelBuffer for ManagedPixelBuffer {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn pixel_format(&self) -> &PixelFormat {
        &self.format
    }

    fn get_buffer(&self, rect: Rect, stride: &mut usize) -> Option<&[u8]> {
        if self.validate_rect(rect).is_err() || rect.is_empty() {
            return None;
        }

        *stride = self.stride;
        let bytes_per_pixel = self.format.bytes_per_pixel() as usize;
        let start = (rect.y as usize * self.stride + rect.x as usize) * bytes_per_pixel;
        let len = ((rect.height as usize - 1) * self.stride + rect.width as usize) * bytes_per_pixel;

        Some(&self.data[start..start + len])
    }
}

impl MutablePixelBuffer for ManagedPixelBuffer {
    fn fill_rect(&mut self, rect: Rect, pixel: &[u8]) -> Result<()> {
        self.validate_rect(rect)?;

        let bytes_per_pixel = self.format.bytes_per_pixel() as usize;
        if pixel.len() != bytes_per_pixel {
            return Err(anyhow!(
                "Invalid pixel size: got {} bytes, expected {}",
                pixel.len(),
                bytes_per_pixel
            ));
        }

        let row_bytes = rect.width as usize * bytes_per_pixel;
        for y in 0..rect.height as usize {
            let row_offset =
                ((rect.y as usize + y) * self.stride + rect.x as usize) * bytes_per_pixel;
            for chunk in self.data[row_offset..row_offset + row_bytes].chunks_exact_mut(bytes_per_pixel) {
                chunk.copy_from_slice(pixel);
            }
        }

        Ok(())
    }

    fn image_rect(&mut self, dest: Rect, pixels: &[u8], stride: usize) -> Result<()> {
        self.validate_rect(dest)?;
        if dest.is_empty() {
            return Ok(());
        }

        let bytes_per_pixel = self.format.bytes_per_pixel() as usize;
        let rect_width_bytes = dest.width as usize * bytes_per_pixel;

        let src_stride = if stride == 0 {
            dest.width as usize
        } else {
            stride
        };
        let src_stride_bytes = src_stride * bytes_per_pixel;

        let required_src_bytes = src_stride_bytes * (dest.height as usize - 1) + rect_width_bytes;
        if pixels.len() < required_src_bytes {
            return Err(anyhow!(
                "Insufficient source data: got {} bytes, need at least {}",
                pixels.len(),
                required_src_bytes
            ));
        }

        for y in 0..dest.height as usize {
            let dst_offset =
                ((dest.y as usize + y) * self.stride + dest.x as usize) * bytes_per_pixel;
            let src_offset = y * src_stride_bytes;

            self.data[dst_offset..dst_offset + rect_width_bytes]
                .copy_from_slice(&pixels[src_offset..src_offset + rect_width_bytes]);
        }

        Ok(())
    }
}
