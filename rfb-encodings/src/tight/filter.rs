//! Tight "basic" filters: Copy, Palette and Gradient.
//!
//! A filter is read from the wire (filter id plus its parameters) before the
//! rectangle's data, and later turns the decoded data into native pixels.
//! [`Filter::bits_per_pixel`] gives the width of one filtered pixel, from which
//! the decoded data size is derived.

use crate::error::{resize_buffer, DecodeError, ReadContext, Result};
use crate::{PixelFormat, RfbInStream};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::AsyncRead;

pub const FILTER_COPY: u8 = 0x00;
pub const FILTER_PALETTE: u8 = 0x01;
pub const FILTER_GRADIENT: u8 = 0x02;

/// Previous-row state of the Gradient filter: three channel values per pixel.
///
/// Cleared whenever a Gradient filter is read, then carried row to row.
#[derive(Debug, Default)]
pub struct GradientRow {
    prev: Vec<u16>,
    this: Vec<u16>,
}

impl GradientRow {
    fn reset(&mut self, width: usize) -> Result<()> {
        let len = width * 3;
        for row in [&mut self.prev, &mut self.this] {
            row.clear();
            row.try_reserve_exact(len)?;
            row.resize(len, 0);
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn previous(&self) -> &[u16] {
        &self.prev
    }
}

/// Palette of 2 to 256 native pixel values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    entries: Vec<u32>,
}

impl Palette {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Two-color palettes pack indices 1 bit per pixel, MSB first.
    fn is_bitmap(&self) -> bool {
        self.entries.len() == 2
    }
}

pub enum Filter {
    /// Pixels as sent. `compact` means 3-byte RGB for a 32bpp depth-24 format.
    Copy { compact: bool },
    Palette(Palette),
    Gradient {
        compact: bool,
        row: Arc<Mutex<GradientRow>>,
    },
}

impl Filter {
    /// Read the filter selection for a basic-compression rectangle.
    ///
    /// Without an explicit filter id the Copy filter applies.
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
        explicit: bool,
        width: usize,
        pixel_format: &PixelFormat,
        gradient_row: &Arc<Mutex<GradientRow>>,
    ) -> Result<Self> {
        let compact = pixel_format.is_rgb24_compact();
        if !explicit {
            return Ok(Filter::Copy { compact });
        }

        let filter_id = stream
            .read_u8()
            .await
            .read_context(|| "reading filter id")?;

        match filter_id {
            FILTER_COPY => Ok(Filter::Copy { compact }),
            FILTER_PALETTE => {
                let count = stream
                    .read_u8()
                    .await
                    .read_context(|| "reading palette size")? as usize
                    + 1;
                if count < 2 {
                    return Err(DecodeError::protocol(format!(
                        "palette of {count} color(s), need at least 2"
                    )));
                }

                let entry_len = if compact {
                    3
                } else {
                    pixel_format.bytes_per_pixel() as usize
                };
                let mut raw = vec![0u8; count * entry_len];
                stream
                    .read_bytes(&mut raw)
                    .await
                    .read_context(|| format!("reading {count} palette entries"))?;

                let entries = raw
                    .chunks_exact(entry_len)
                    .map(|e| {
                        if compact {
                            pixel_format.compose(e[0] as u32, e[1] as u32, e[2] as u32)
                        } else {
                            pixel_format.read_pixel(e)
                        }
                    })
                    .collect();
                Ok(Filter::Palette(Palette { entries }))
            }
            FILTER_GRADIENT => {
                gradient_row.lock().reset(width)?;
                Ok(Filter::Gradient {
                    compact,
                    row: gradient_row.clone(),
                })
            }
            other => Err(DecodeError::protocol(format!("unknown filter id {other}"))),
        }
    }

    /// Bits per filtered pixel in the decoded data.
    pub fn bits_per_pixel(&self, pixel_format: &PixelFormat) -> usize {
        match self {
            Filter::Copy { compact: true } | Filter::Gradient { compact: true, .. } => 24,
            Filter::Copy { compact: false } | Filter::Gradient { compact: false, .. } => {
                pixel_format.bits_per_pixel as usize
            }
            Filter::Palette(p) if p.is_bitmap() => 1,
            Filter::Palette(_) => 8,
        }
    }

    /// Bytes of decoded data for a `width` x `height` rectangle.
    pub fn data_len(&self, width: usize, height: usize, pixel_format: &PixelFormat) -> usize {
        height * ((width * self.bits_per_pixel(pixel_format) + 7) / 8)
    }

    pub fn is_gradient(&self) -> bool {
        matches!(self, Filter::Gradient { .. })
    }

    /// True when the decoded data already is native pixels.
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Filter::Copy { compact: false })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Filter::Copy { .. } => "copy",
            Filter::Palette(_) => "palette",
            Filter::Gradient { .. } => "gradient",
        }
    }

    /// Turn decoded data into native pixels in `out`.
    ///
    /// Not used for pass-through Copy, whose data is blitted as is.
    pub fn render(
        &self,
        data: &[u8],
        width: usize,
        height: usize,
        pixel_format: &PixelFormat,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let bpp = pixel_format.bytes_per_pixel() as usize;
        resize_buffer(out, width * height * bpp)?;

        match self {
            Filter::Copy { compact: false } => {
                out.copy_from_slice(&data[..width * height * bpp]);
                Ok(())
            }
            Filter::Copy { compact: true } => {
                for (src, dst) in data.chunks_exact(3).zip(out.chunks_exact_mut(bpp)) {
                    let pixel = pixel_format.compose(src[0] as u32, src[1] as u32, src[2] as u32);
                    pixel_format.write_pixel(pixel, dst);
                }
                Ok(())
            }
            Filter::Palette(palette) => render_palette(palette, data, width, height, pixel_format, out),
            Filter::Gradient { compact, row } => {
                let mut row = row.lock();
                if *compact {
                    render_gradient24(&mut row, data, width, height, pixel_format, out);
                } else {
                    render_gradient(&mut row, data, width, height, pixel_format, out);
                }
                Ok(())
            }
        }
    }
}

fn render_palette(
    palette: &Palette,
    data: &[u8],
    width: usize,
    height: usize,
    pixel_format: &PixelFormat,
    out: &mut [u8],
) -> Result<()> {
    let bpp = pixel_format.bytes_per_pixel() as usize;
    let mut dst = out.chunks_exact_mut(bpp);

    if palette.is_bitmap() {
        let row_bytes = (width + 7) / 8;
        for y in 0..height {
            let row = &data[y * row_bytes..(y + 1) * row_bytes];
            for x in 0..width {
                let index = (row[x / 8] >> (7 - (x % 8))) & 1;
                if let Some(px) = dst.next() {
                    pixel_format.write_pixel(palette.entries[index as usize], px);
                }
            }
        }
        return Ok(());
    }

    for (i, (&index, px)) in data.iter().zip(dst).enumerate() {
        let pixel = palette.entries.get(index as usize).ok_or_else(|| {
            DecodeError::protocol(format!(
                "palette index {} at pixel {} exceeds palette of {}",
                index,
                i,
                palette.len()
            ))
        })?;
        pixel_format.write_pixel(*pixel, px);
    }
    Ok(())
}

/// Gradient over 3-byte RGB: the prediction is clamped to 0..=255 and the
/// residual added with byte wraparound.
fn render_gradient24(
    row: &mut GradientRow,
    data: &[u8],
    width: usize,
    height: usize,
    pixel_format: &PixelFormat,
    out: &mut [u8],
) {
    let bpp = pixel_format.bytes_per_pixel() as usize;

    for y in 0..height {
        let src = &data[y * width * 3..(y + 1) * width * 3];
        let GradientRow { prev, this } = &mut *row;

        for c in 0..3 {
            this[c] = (prev[c] as u8).wrapping_add(src[c]) as u16;
        }
        for x in 1..width {
            for c in 0..3 {
                let i = x * 3 + c;
                let est = (prev[i] as i32 + this[i - 3] as i32 - prev[i - 3] as i32).clamp(0, 255);
                this[i] = (est as u8).wrapping_add(src[i]) as u16;
            }
        }

        let dst = &mut out[y * width * bpp..(y + 1) * width * bpp];
        for (px, rgb) in dst.chunks_exact_mut(bpp).zip(this.chunks_exact(3)) {
            pixel_format.write_pixel(
                pixel_format.compose(rgb[0] as u32, rgb[1] as u32, rgb[2] as u32),
                px,
            );
        }

        std::mem::swap(prev, this);
    }
}

/// Gradient over native pixels, channel by channel, modulo each channel's max.
fn render_gradient(
    row: &mut GradientRow,
    data: &[u8],
    width: usize,
    height: usize,
    pixel_format: &PixelFormat,
    out: &mut [u8],
) {
    let bpp = pixel_format.bytes_per_pixel() as usize;
    let channels = pixel_format.channels();

    for y in 0..height {
        let GradientRow { prev, this } = &mut *row;

        for x in 0..width {
            let offset = (y * width + x) * bpp;
            let residual = pixel_format.read_pixel(&data[offset..offset + bpp]);

            for (c, ch) in channels.iter().enumerate() {
                let i = x * 3 + c;
                let est = if x == 0 {
                    prev[i] as u32
                } else {
                    (prev[i] as i32 + this[i - 3] as i32 - prev[i - 3] as i32)
                        .clamp(0, ch.max as i32) as u32
                };
                this[i] = (((residual >> ch.shift) + est) & ch.max) as u16;
            }

            let i = x * 3;
            pixel_format.write_pixel(
                pixel_format.compose(this[i] as u32, this[i + 1] as u32, this[i + 2] as u32),
                &mut out[offset..offset + bpp],
            );
        }

        std::mem::swap(prev, this);
    }
}
