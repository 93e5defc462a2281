//! The part of a Tight rectangle that runs on a decode slot: inflate or JPEG
//! decode, filtering, and the final blit.
//!
//! The wire bytes are read by the decoder into the slot's [`Scratch`] before
//! the job is submitted, so a job never touches the stream.

use super::filter::Filter;
use super::jpeg::decode_jpeg;
use super::zlib::ZlibChannelSet;
use crate::error::{DecodeError, Result};
use crate::pool::{Job, Scratch};
use crate::{FramebufferHandle, PixelFormat};
use rfb_common::Rect;
use std::sync::Arc;

/// What sits in the scratch arena and how to turn it into filtered data.
pub enum Payload {
    /// A JPEG image in `Scratch::compressed`.
    Jpeg,
    /// Filtered data already in `Scratch::decoded`.
    Plain { filter: Filter },
    /// zlib data in `Scratch::compressed`, to inflate on `channel`.
    Zlib { channel: usize, filter: Filter },
}

pub struct TightJob {
    pub rect: Rect,
    pub pixel_format: PixelFormat,
    pub payload: Payload,
    pub channels: Arc<ZlibChannelSet>,
    pub framebuffer: FramebufferHandle,
}

impl TightJob {
    fn path(&self) -> String {
        match &self.payload {
            Payload::Jpeg => "Tight JPEG".to_string(),
            Payload::Plain { filter } => format!("Tight {}", filter.name()),
            Payload::Zlib { channel, filter } => {
                format!("Tight {} (zlib channel {channel})", filter.name())
            }
        }
    }

    fn execute(&self, scratch: &mut Scratch) -> Result<()> {
        let width = self.rect.width as usize;
        let height = self.rect.height as usize;
        let pf = &self.pixel_format;
        let Scratch {
            compressed,
            decoded,
            pixels,
        } = scratch;

        let filter = match &self.payload {
            Payload::Jpeg => {
                decode_jpeg(compressed, width, height, pf, pixels)?;
                return self.blit(pixels);
            }
            Payload::Plain { filter } => filter,
            Payload::Zlib { channel, filter } => {
                let expected = filter.data_len(width, height, pf);
                self.channels.inflate(*channel, compressed, decoded, expected)?;
                filter
            }
        };

        if filter.is_passthrough() {
            return self.blit(decoded);
        }
        filter.render(decoded, width, height, pf, pixels)?;
        self.blit(pixels)
    }

    fn blit(&self, pixels: &[u8]) -> Result<()> {
        self.framebuffer
            .lock()
            .image_rect(self.rect, pixels, 0)
            .map_err(DecodeError::framebuffer)
    }
}

impl Job for TightJob {
    fn run(self, scratch: &mut Scratch) -> Result<()> {
        self.execute(scratch).map_err(|e| {
            e.within(&format!(
                "{} in rect {}x{}+{}+{}",
                self.path(),
                self.rect.width,
                self.rect.height,
                self.rect.x,
                self.rect.y
            ))
        })
    }
}
