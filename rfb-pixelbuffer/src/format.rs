//! RFB pixel format descriptions and conversions.
//!
//! [`PixelFormat`] is the negotiated layout of pixels on the wire and in the
//! framebuffer. Decoders use it to:
//!
//! - read and write native pixels in the negotiated byte order ([`PixelFormat::read_pixel`],
//!   [`PixelFormat::write_pixel`])
//! - compose a pixel from per-channel values ([`PixelFormat::compose`])
//! - convert 8-bit RGB into the format with rounding ([`PixelFormat::pixel_from_rgb24`])
//! - decide whether Tight's 3-byte pixel compaction applies ([`PixelFormat::is_rgb24_compact`])
//!
//! Only true-color formats with 8, 16 or 32 bits per pixel are supported.
//!
//! # Example
//!
//! ```
//! use rfb_pixelbuffer::PixelFormat;
//!
//! let pf = PixelFormat::rgb888();
//! let pixel = pf.pixel_from_rgb24(0xAA, 0xBB, 0xCC);
//! assert_eq!(pixel, 0x00AABBCC);
//!
//! let mut bytes = [0u8; 4];
//! pf.write_pixel(pixel, &mut bytes);
//! assert_eq!(bytes, [0xCC, 0xBB, 0xAA, 0x00]);
//! assert_eq!(pf.read_pixel(&bytes), pixel);
//! ```

use anyhow::{bail, Result};

/// Describes an RFB pixel format.
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct PixelFormat {
    /// Bits used per pixel (bpp): 8, 16 or 32.
    pub bits_per_pixel: u8,

    /// Actual color depth (sum of significant bits), e.g., 24 for RGB888.
    pub depth: u8,

    /// Byte order for multi-byte pixels (`true` = big endian, `false` = little endian).
    pub big_endian: bool,

    /// True color (direct color) vs. color map (`false`).
    pub true_color: bool,

    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,

    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

/// One color channel: its maximum value and bit position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub max: u32,
    pub shift: u32,
}

impl Channel {
    /// Extract this channel's value from a native pixel.
    #[inline]
    pub fn extract(&self, pixel: u32) -> u32 {
        (pixel >> self.shift) & self.max
    }
}

impl PixelFormat {
    /// Returns bytes-per-pixel (storage width), rounded up to the nearest byte.
    pub fn bytes_per_pixel(&self) -> u8 {
        self.bits_per_pixel.div_ceil(8)
    }

    /// Standard little-endian 32bpp format, red at bit 16, green at 8, blue at 0.
    pub fn rgb888() -> Self {
        Self {
            bits_per_pixel: 32,
            depth: 24,
            big_endian: false,
            true_color: true,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
        }
    }

    /// 16bpp RGB565, little-endian.
    pub fn rgb565() -> Self {
        Self {
            bits_per_pixel: 16,
            depth: 16,
            big_endian: false,
            true_color: true,
            red_max: 31,
            green_max: 63,
            blue_max: 31,
            red_shift: 11,
            green_shift: 5,
            blue_shift: 0,
        }
    }

    /// 8bpp BGR233 (the classic low-color VNC format).
    pub fn bgr233() -> Self {
        Self {
            bits_per_pixel: 8,
            depth: 8,
            big_endian: false,
            true_color: true,
            red_max: 7,
            green_max: 7,
            blue_max: 3,
            red_shift: 0,
            green_shift: 3,
            blue_shift: 6,
        }
    }

    /// Check that the format is one the decoders can render into.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.bits_per_pixel, 8 | 16 | 32) {
            bail!("unsupported bits per pixel: {}", self.bits_per_pixel);
        }
        if !self.true_color {
            bail!("color-map pixel formats are not supported");
        }
        if self.depth == 0 || self.depth > self.bits_per_pixel {
            bail!(
                "depth {} does not fit in {} bits per pixel",
                self.depth,
                self.bits_per_pixel
            );
        }

        let mut used = 0u64;
        for (name, ch) in ["red", "green", "blue"].iter().zip(self.channels()) {
            if ch.max == 0 || (ch.max & (ch.max + 1)) != 0 {
                bail!("{} max {} is not of the form 2^n - 1", name, ch.max);
            }
            if ch.shift >= self.bits_per_pixel as u32 {
                bail!(
                    "{} shift {} is outside {} bits per pixel",
                    name,
                    ch.shift,
                    self.bits_per_pixel
                );
            }
            let mask = (ch.max as u64) << ch.shift;
            if mask >> self.bits_per_pixel != 0 {
                bail!(
                    "{} channel (max {}, shift {}) exceeds {} bits per pixel",
                    name,
                    ch.max,
                    ch.shift,
                    self.bits_per_pixel
                );
            }
            if used & mask != 0 {
                bail!("{} channel overlaps another channel", name);
            }
            used |= mask;
        }
        Ok(())
    }

    /// Red, green and blue channel descriptors, in that order.
    pub fn channels(&self) -> [Channel; 3] {
        [
            Channel {
                max: self.red_max as u32,
                shift: self.red_shift as u32,
            },
            Channel {
                max: self.green_max as u32,
                shift: self.green_shift as u32,
            },
            Channel {
                max: self.blue_max as u32,
                shift: self.blue_shift as u32,
            },
        ]
    }

    /// True when Tight sends pixels of this format as 3 bytes (R, G, B)
    /// instead of 4: 32bpp, depth 24, all channel maxima 255.
    pub fn is_rgb24_compact(&self) -> bool {
        self.bits_per_pixel == 32
            && self.depth == 24
            && self.red_max == 255
            && self.green_max == 255
            && self.blue_max == 255
    }

    /// Assemble a native pixel value from `bytes_per_pixel()` bytes in the
    /// format's byte order.
    #[inline]
    pub fn read_pixel(&self, bytes: &[u8]) -> u32 {
        match self.bits_per_pixel {
            8 => bytes[0] as u32,
            16 if self.big_endian => u16::from_be_bytes([bytes[0], bytes[1]]) as u32,
            16 => u16::from_le_bytes([bytes[0], bytes[1]]) as u32,
            _ if self.big_endian => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            _ => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    /// Store a native pixel value into `bytes_per_pixel()` bytes.
    #[inline]
    pub fn write_pixel(&self, pixel: u32, out: &mut [u8]) {
        match self.bits_per_pixel {
            8 => out[0] = pixel as u8,
            16 if self.big_endian => out[..2].copy_from_slice(&(pixel as u16).to_be_bytes()),
            16 => out[..2].copy_from_slice(&(pixel as u16).to_le_bytes()),
            _ if self.big_endian => out[..4].copy_from_slice(&pixel.to_be_bytes()),
            _ => out[..4].copy_from_slice(&pixel.to_le_bytes()),
        }
    }

    /// Compose a pixel from channel values already in the format's range.
    #[inline]
    pub fn compose(&self, r: u32, g: u32, b: u32) -> u32 {
        (r << self.red_shift) | (g << self.green_shift) | (b << self.blue_shift)
    }

    /// Convert 8-bit RGB into this format, scaling each channel with rounding:
    /// `(c * max + 127) / 255`. Exact for 8-bit channels.
    #[inline]
    pub fn pixel_from_rgb24(&self, r: u8, g: u8, b: u8) -> u32 {
        let scale = |c: u8, max: u16| (c as u32 * max as u32 + 127) / 255;
        self.compose(
            scale(r, self.red_max),
            scale(g, self.green_max),
            scale(b, self.blue_max),
        )
    }

    /// Converts a pixel in this format to RGBA8888 `[R, G, B, 255]`.
    pub fn to_rgb888(&self, pixel: &[u8]) -> [u8; 4] {
        let value = self.read_pixel(pixel);
        let [r, g, b] = self
            .channels()
            .map(|ch| ((ch.extract(value) * 255) / ch.max.max(1)) as u8);
        [r, g, b, 255]
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        Self::rgb888()
    }
}
