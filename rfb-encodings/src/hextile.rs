//! Hextile encoding decoder - tiled encoding with per-tile sub-encodings.
//!
//! The rectangle is cut into 16x16 tiles (smaller at the right and bottom
//! edges), visited left to right, then top to bottom.
//!
//! # Wire Format
//!
//! For each tile:
//!
//! ```text
//! +------------------+
//! | tile_type        |  1 byte (bit flags)
//! +------------------+
//! | [raw_pixels]     |  tile_w * tile_h * bpp bytes (if RAW bit set; nothing else follows)
//! +------------------+
//! | [background]     |  bpp bytes (if BACKGROUND_SPECIFIED)
//! +------------------+
//! | [foreground]     |  bpp bytes (if FOREGROUND_SPECIFIED)
//! +------------------+
//! | [num_subrects]   |  1 byte (if ANY_SUBRECTS)
//! +------------------+
//! | [subrects...]    |  For each subrect:
//! |   [pixel]        |    bpp bytes (if SUBRECTS_COLOURED; becomes the new foreground)
//! |   xy             |    1 byte: x=(xy>>4), y=(xy&0xF)
//! |   wh             |    1 byte: w=((wh>>4)+1), h=((wh&0xF)+1)
//! +------------------+
//! ```
//!
//! # State Persistence
//!
//! Background and foreground persist across tiles within one rectangle and
//! start out as the all-zero pixel for every rectangle.
//!
//! Each non-raw tile is composed in a private tile buffer (background fill,
//! then subrects in order) and blitted to the framebuffer in one piece, so a
//! malformed subrect never leaves a half-painted tile behind.

use crate::error::{resize_buffer, DecodeError, ReadContext};
use crate::{
    Decoder, FramebufferHandle, PixelFormat, Rectangle, Result, RfbInStream, ENCODING_HEXTILE,
};
use rfb_common::Rect;
use tokio::io::AsyncRead;

// Hextile tile type flags
const TILE_RAW: u8 = 1 << 0;
const TILE_BACKGROUND_SPECIFIED: u8 = 1 << 1;
const TILE_FOREGROUND_SPECIFIED: u8 = 1 << 2;
const TILE_ANY_SUBRECTS: u8 = 1 << 3;
const TILE_SUBRECTS_COLOURED: u8 = 1 << 4;

const TILE_SIZE: u32 = 16;

/// Colors carried from tile to tile within one rectangle.
struct TileColors {
    background: [u8; 4],
    foreground: [u8; 4],
}

#[derive(Debug, Default)]
pub struct HextileDecoder {
    tile: Vec<u8>,
}

impl HextileDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    async fn decode_tile<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        tile: Rect,
        bpp: usize,
        colors: &mut TileColors,
        framebuffer: &FramebufferHandle,
    ) -> Result<()> {
        let tile_w = tile.width as usize;
        let tile_h = tile.height as usize;

        let tile_type = stream
            .read_u8()
            .await
            .read_context(|| "reading tile type")?;

        resize_buffer(&mut self.tile, tile_w * tile_h * bpp)?;

        if tile_type & TILE_RAW != 0 {
            let len = self.tile.len();
            stream
                .read_bytes(&mut self.tile)
                .await
                .read_context(|| format!("reading {len} bytes of raw tile data"))?;
        } else {
            if tile_type & TILE_BACKGROUND_SPECIFIED != 0 {
                stream
                    .read_bytes(&mut colors.background[..bpp])
                    .await
                    .read_context(|| "reading background pixel")?;
            }
            for px in self.tile.chunks_exact_mut(bpp) {
                px.copy_from_slice(&colors.background[..bpp]);
            }

            if tile_type & TILE_FOREGROUND_SPECIFIED != 0 {
                stream
                    .read_bytes(&mut colors.foreground[..bpp])
                    .await
                    .read_context(|| "reading foreground pixel")?;
            }

            if tile_type & TILE_ANY_SUBRECTS != 0 {
                let num_subrects = stream
                    .read_u8()
                    .await
                    .read_context(|| "reading subrect count")?;
                let coloured = tile_type & TILE_SUBRECTS_COLOURED != 0;

                for i in 0..num_subrects {
                    if coloured {
                        stream
                            .read_bytes(&mut colors.foreground[..bpp])
                            .await
                            .read_context(|| format!("reading color of subrect {i}"))?;
                    }
                    let xy = stream
                        .read_u8()
                        .await
                        .read_context(|| format!("reading position of subrect {i}"))?;
                    let wh = stream
                        .read_u8()
                        .await
                        .read_context(|| format!("reading size of subrect {i}"))?;

                    let sx = (xy >> 4) as usize;
                    let sy = (xy & 0x0F) as usize;
                    let sw = (wh >> 4) as usize + 1;
                    let sh = (wh & 0x0F) as usize + 1;

                    if sx + sw > tile_w || sy + sh > tile_h {
                        return Err(DecodeError::protocol(format!(
                            "subrect {i} at ({sx}, {sy}) size {sw}x{sh} exceeds {tile_w}x{tile_h} tile"
                        )));
                    }

                    let fg = &colors.foreground[..bpp];
                    for row in sy..sy + sh {
                        let start = (row * tile_w + sx) * bpp;
                        for px in self.tile[start..start + sw * bpp].chunks_exact_mut(bpp) {
                            px.copy_from_slice(fg);
                        }
                    }
                }
            }
        }

        framebuffer
            .lock()
            .image_rect(tile, &self.tile, 0)
            .map_err(DecodeError::framebuffer)
    }
}

impl Decoder for HextileDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_HEXTILE
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
            "Hextile decode start: rect=[{},{} {}x{}]",
            rect.x, rect.y, rect.width, rect.height
        );

        if rect.is_empty() {
            tracing::debug!(
                target: "rfb_encodings::framing",
                "Hextile decode end: empty rectangle, bytes_consumed=0"
            );
            return Ok(());
        }

        let bpp = pixel_format.bytes_per_pixel() as usize;
        if bpp == 0 || bpp > 4 {
            return Err(DecodeError::protocol(format!(
                "Hextile: invalid bytes per pixel {bpp}"
            )));
        }

        let mut colors = TileColors {
            background: [0; 4],
            foreground: [0; 4],
        };

        for tile in rect.bounds().tiles(TILE_SIZE) {
            self.decode_tile(stream, tile, bpp, &mut colors, framebuffer)
                .await
                .map_err(|e| {
                    e.within(&format!(
                        "Hextile tile ({}, {}) in rect at ({}, {})",
                        tile.x - rect.x as i32,
                        tile.y - rect.y as i32,
                        rect.x,
                        rect.y
                    ))
                })?;
        }

        tracing::debug!(
            target: "rfb_encodings::framing",
            "Hextile decode end: bytes_consumed={}",
            stream.position() - start
        );

        Ok(())
    }
}
