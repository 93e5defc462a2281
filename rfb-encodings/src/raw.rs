//! Raw encoding decoder - uncompressed pixel data.
//!
//! # Wire Format
//!
//! ```text
//! +-------------+
//! | Pixel data  |  width * height * bytes_per_pixel bytes, row-major
//! +-------------+
//! ```
//!
//! Pixels are in the negotiated pixel format and are copied verbatim into the
//! framebuffer once the whole payload has arrived.

use crate::error::{resize_buffer, DecodeError, ReadContext};
use crate::{Decoder, FramebufferHandle, PixelFormat, Rectangle, Result, RfbInStream, ENCODING_RAW};
use tokio::io::AsyncRead;

/// Decoder for raw (uncompressed) pixel data.
///
/// Holds a receive buffer that is reused from one rectangle to the next.
#[derive(Debug, Default)]
pub struct RawDecoder {
    pixels: Vec<u8>,
}

impl RawDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for RawDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_RAW
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
            "Raw decode start: rect=[{},{} {}x{}]",
            rect.x, rect.y, rect.width, rect.height
        );

        if rect.is_empty() {
            tracing::debug!(
                target: "rfb_encodings::framing",
                "Raw decode end: empty rectangle, bytes_consumed=0"
            );
            return Ok(());
        }

        let bytes_per_pixel = pixel_format.bytes_per_pixel() as usize;
        let total_bytes = rect.width as usize * rect.height as usize * bytes_per_pixel;

        resize_buffer(&mut self.pixels, total_bytes).map_err(|e| e.within("Raw"))?;
        stream
            .read_bytes(&mut self.pixels)
            .await
            .read_context(|| format!("Raw: reading {total_bytes} bytes of pixel data"))?;

        framebuffer
            .lock()
            .image_rect(rect.bounds(), &self.pixels, 0)
            .map_err(|e| DecodeError::framebuffer(e).within("Raw"))?;

        tracing::debug!(
            target: "rfb_encodings::framing",
            "Raw decode end: bytes_consumed={}",
            stream.position() - start
        );

        Ok(())
    }
}
