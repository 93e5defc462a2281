//! Tight encoding decoder - JPEG or zlib compression with filtering.
//!
//! # Wire Format
//!
//! ```text
//! +------------------+
//! | compression_ctl  |  1 byte: low nibble = zlib channel resets, high nibble = control
//! +------------------+
//! | [encoding data]  |  depends on control (see below)
//! +------------------+
//! ```
//!
//! Bit `i` of the low nibble resets zlib channel `i` before this rectangle.
//! The control value (high nibble) selects the sub-path:
//!
//! - `0x08` **Fill**: one pixel (3 bytes RGB for 24-bit-in-32 formats), painted
//!   over the whole rectangle.
//! - `0x09` **JPEG**: compact length, then a JPEG image of exactly the
//!   rectangle's size. Not allowed for 8bpp formats.
//! - `0x00..=0x07` **Basic**: bit 2 says an explicit filter id follows (Copy,
//!   Palette or Gradient, see [`filter`]); bits 0-1 select the zlib channel.
//!   Filtered data shorter than 12 bytes is sent as is. Otherwise a compact
//!   length and that many zlib bytes follow.
//!
//! A control value with both bits 1 and 3 set (`0x0A`) marks Basic data that
//! was not compressed: those bits are cleared, and a payload of 12 bytes or
//! more is preceded by a compact length equal to its size.
//!
//! # Parallel decoding
//!
//! Once the payload is read, inflate, filtering and the blit run as a
//! [`job::TightJob`] on a [`DecodeThreadPool`] slot. zlib jobs for channel
//! `c` always go to slot `c % N` so each channel inflates in arrival order;
//! JPEG and uncompressed jobs go round-robin. Gradient-filtered rectangles
//! run inline because the filter carries state from one rectangle to the
//! next. [`Decoder::flush`] waits for everything outstanding.
//!
//! # Example
//!
//! ```no_run
//! use rfb_encodings::{Decoder, TightDecoder, ENCODING_TIGHT};
//!
//! let decoder = TightDecoder::new(4).unwrap();
//! assert_eq!(decoder.encoding_type(), ENCODING_TIGHT);
//! ```

pub mod filter;
pub mod jpeg;
pub mod job;
pub mod zlib;

use crate::error::{resize_buffer, DecodeError, ReadContext, Result};
use crate::pool::{resolve_thread_count, DecodeThreadPool};
use crate::{Decoder, FramebufferHandle, PixelFormat, Rectangle, RfbInStream, ENCODING_TIGHT};
use filter::{Filter, GradientRow};
use job::{Payload, TightJob};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::AsyncRead;
use zlib::{ZlibChannelSet, CHANNEL_COUNT};

const TIGHT_EXPLICIT_FILTER: u8 = 0x04;
const TIGHT_FILL: u8 = 0x08;
const TIGHT_JPEG: u8 = 0x09;
const TIGHT_MAX_SUBENCODING: u8 = 0x09;
const TIGHT_NO_ZLIB: u8 = 0x0A;

const TIGHT_MAX_WIDTH: usize = 2048;
const TIGHT_MIN_TO_COMPRESS: usize = 12;

pub struct TightDecoder {
    pool: DecodeThreadPool<TightJob>,
    channels: Arc<ZlibChannelSet>,
    gradient_row: Arc<Mutex<GradientRow>>,
}

impl TightDecoder {
    /// Create a decoder with `threads` decode slots (clamped to 1..=8).
    pub fn new(threads: usize) -> Result<Self> {
        Ok(Self {
            pool: DecodeThreadPool::new(threads)?,
            channels: Arc::new(ZlibChannelSet::new()),
            gradient_row: Arc::new(Mutex::new(GradientRow::default())),
        })
    }

    /// Create a decoder sized by [`resolve_thread_count`].
    pub fn with_thread_request(requested: Option<usize>) -> Result<Self> {
        Self::new(resolve_thread_count(requested))
    }

    pub fn thread_count(&self) -> usize {
        self.pool.len()
    }

    /// The persistent zlib channels, e.g. to check which ones are active.
    pub fn channels(&self) -> &ZlibChannelSet {
        &self.channels
    }

    /// Wait for the current owner of every channel in `mask` and tear it down.
    async fn reset_channels(&mut self, mask: u8) -> Result<()> {
        for channel in 0..CHANNEL_COUNT {
            if mask & (1 << channel) == 0 {
                continue;
            }
            let slot = self.pool.slot_for_channel(channel);
            self.pool.wait_idle(slot).await?;
            if !self.channels.reset(channel) {
                tracing::trace!("Tight: reset of idle zlib channel {}", channel);
            }
        }
        Ok(())
    }

    async fn decode_fill<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        pixel_format: &PixelFormat,
        framebuffer: &FramebufferHandle,
    ) -> Result<()> {
        let bpp = pixel_format.bytes_per_pixel() as usize;
        let mut pixel = [0u8; 4];

        if pixel_format.is_rgb24_compact() {
            let mut rgb = [0u8; 3];
            stream
                .read_bytes(&mut rgb)
                .await
                .read_context(|| "Tight fill: reading RGB color")?;
            let value = pixel_format.compose(rgb[0] as u32, rgb[1] as u32, rgb[2] as u32);
            pixel_format.write_pixel(value, &mut pixel[..bpp]);
        } else {
            stream
                .read_bytes(&mut pixel[..bpp])
                .await
                .read_context(|| "Tight fill: reading pixel")?;
        }

        framebuffer
            .lock()
            .fill_rect(rect.bounds(), &pixel[..bpp])
            .map_err(|e| DecodeError::framebuffer(e).within("Tight fill"))
    }

    async fn decode_jpeg<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        pixel_format: &PixelFormat,
        framebuffer: &FramebufferHandle,
    ) -> Result<()> {
        let len = stream
            .read_compact_length()
            .await
            .read_context(|| "Tight JPEG: reading length")?;
        if len == 0 {
            return Err(DecodeError::protocol("Tight JPEG: zero-length image"));
        }

        let slot = self.pool.next_round_robin();
        let mut scratch = self.pool.acquire(slot).await?;
        if let Err(e) = read_payload(stream, &mut scratch.compressed, len, "Tight JPEG").await {
            self.pool.release(slot, scratch);
            return Err(e);
        }

        let job = TightJob {
            rect: rect.bounds(),
            pixel_format: *pixel_format,
            payload: Payload::Jpeg,
            channels: self.channels.clone(),
            framebuffer: framebuffer.clone(),
        };
        self.pool.submit(slot, job, scratch)
    }

    async fn decode_basic<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        control: u8,
        no_zlib: bool,
        pixel_format: &PixelFormat,
        framebuffer: &FramebufferHandle,
    ) -> Result<&'static str> {
        let width = rect.width as usize;
        let height = rect.height as usize;
        let channel = (control & 0x03) as usize;
        let explicit = control & TIGHT_EXPLICIT_FILTER != 0;

        let filter = Filter::read_from(stream, explicit, width, pixel_format, &self.gradient_row)
            .await
            .map_err(|e| e.within("Tight filter"))?;
        let name = filter.name();
        let data_len = filter.data_len(width, height, pixel_format);

        #[derive(Clone, Copy)]
        enum Source {
            Plain,
            Zlib(usize),
        }
        let source = if data_len < TIGHT_MIN_TO_COMPRESS {
            Source::Plain
        } else {
            let len = stream
                .read_compact_length()
                .await
                .read_context(|| format!("Tight {name}: reading compressed length"))?;
            if no_zlib {
                if len != data_len {
                    return Err(DecodeError::protocol(format!(
                        "Tight {name}: uncompressed length {len} does not match {data_len}"
                    )));
                }
                Source::Plain
            } else {
                if len == 0 {
                    return Err(DecodeError::protocol(format!(
                        "Tight {name}: zero-length zlib data"
                    )));
                }
                Source::Zlib(len)
            }
        };

        let slot = if filter.is_gradient() {
            if matches!(source, Source::Zlib(_)) {
                let owner = self.pool.slot_for_channel(channel);
                self.pool.wait_idle(owner).await?;
            }
            0
        } else if matches!(source, Source::Zlib(_)) {
            self.pool.slot_for_channel(channel)
        } else {
            self.pool.next_round_robin()
        };

        let mut scratch = self.pool.acquire(slot).await?;
        let (buffer, len, path) = match source {
            Source::Plain => (&mut scratch.decoded, data_len, "Tight data"),
            Source::Zlib(len) => (&mut scratch.compressed, len, "Tight zlib data"),
        };
        if let Err(e) = read_payload(stream, buffer, len, path).await {
            self.pool.release(slot, scratch);
            return Err(e);
        }

        let payload = match source {
            Source::Zlib(_) => Payload::Zlib { channel, filter },
            Source::Plain => Payload::Plain { filter },
        };
        let job = TightJob {
            rect: rect.bounds(),
            pixel_format: *pixel_format,
            payload,
            channels: self.channels.clone(),
            framebuffer: framebuffer.clone(),
        };
        self.pool.submit(slot, job, scratch)?;
        Ok(name)
    }
}

/// Read exactly `len` bytes of rectangle payload into a scratch buffer.
async fn read_payload<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    buffer: &mut Vec<u8>,
    len: usize,
    path: &str,
) -> Result<()> {
    resize_buffer(buffer, len).map_err(|e| e.within(path))?;
    stream
        .read_bytes(buffer)
        .await
        .read_context(|| format!("{path}: reading {len} bytes"))
}

impl Decoder for TightDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_TIGHT
    }

    async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        pixel_format: &PixelFormat,
        framebuffer: &FramebufferHandle,
    ) -> Result<()> {
        let start = stream.position();
        tracing::debug!(
            target: "rfb_encodings::framing",
            "Tight decode start: rect=[{},{} {}x{}]",
            rect.x, rect.y, rect.width, rect.height
        );

        if rect.is_empty() {
            tracing::debug!(
                target: "rfb_encodings::framing",
                "Tight decode end: empty rectangle, bytes_consumed=0"
            );
            return Ok(());
        }

        if rect.width as usize > TIGHT_MAX_WIDTH {
            return Err(DecodeError::protocol(format!(
                "Tight: rectangle too wide ({} > {} max)",
                rect.width, TIGHT_MAX_WIDTH
            )));
        }

        let comp_ctl = stream.read_u8().await.read_context(|| {
            format!("Tight: reading compression control at ({}, {})", rect.x, rect.y)
        })?;
        self.reset_channels(comp_ctl & 0x0F).await?;

        let mut control = comp_ctl >> 4;
        let no_zlib = control & TIGHT_NO_ZLIB == TIGHT_NO_ZLIB;
        if no_zlib {
            control &= !TIGHT_NO_ZLIB;
        }
        tracing::trace!(
            "Tight: comp_ctl={:#04x} control={:#x} no_zlib={}",
            comp_ctl,
            control,
            no_zlib
        );

        let path = match control {
            TIGHT_FILL => {
                self.decode_fill(stream, rect, pixel_format, framebuffer)
                    .await?;
                "fill"
            }
            TIGHT_JPEG => {
                if pixel_format.bits_per_pixel == 8 {
                    return Err(DecodeError::protocol(
                        "Tight: JPEG requested for an 8bpp pixel format",
                    ));
                }
                self.decode_jpeg(stream, rect, pixel_format, framebuffer)
                    .await?;
                "jpeg"
            }
            c if c > TIGHT_MAX_SUBENCODING => {
                return Err(DecodeError::protocol(format!(
                    "Tight: bad subencoding {c:#x} (comp_ctl {comp_ctl:#04x})"
                )));
            }
            c => {
                self.decode_basic(stream, rect, c, no_zlib, pixel_format, framebuffer)
                    .await?
            }
        };

        tracing::debug!(
            target: "rfb_encodings::framing",
            "Tight decode end ({}): bytes_consumed={}",
            path,
            stream.position() - start
        );
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.pool.flush().await
    }
}

impl std::fmt::Debug for TightDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TightDecoder")
            .field("threads", &self.pool.len())
            .finish_non_exhaustive()
    }
}
