//! Framebuffer state management and decoder registry.
//!
//! [`Framebuffer`] owns the client's pixel surface and one decoder per
//! supported encoding, and applies FramebufferUpdate rectangles to it.

use crate::config::DecoderConfig;
use crate::errors::RfbClientError;
use parking_lot::Mutex;
use rfb_common::Rect;
use rfb_encodings as enc;
use rfb_encodings::{DecodeError, Decoder, FramebufferHandle, PixelFormat, Rectangle, RfbInStream};
use rfb_pixelbuffer::ManagedPixelBuffer;
use rfb_protocol::messages::FramebufferUpdateHeader;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncRead;

/// Registry of decoders keyed by encoding type.
#[derive(Default)]
pub struct DecoderRegistry {
    decoders: HashMap<i32, DecoderEntry>,
}

impl DecoderRegistry {
    /// Raw, Hextile and Tight, with the Tight slot count taken from `config`.
    pub fn with_standard(config: &DecoderConfig) -> Result<Self, RfbClientError> {
        config.validate()?;
        Self::with_tight_threads(config.effective_threads())
    }

    /// Raw, Hextile and Tight with exactly `threads` Tight decode slots.
    pub fn with_tight_threads(threads: usize) -> Result<Self, RfbClientError> {
        let tight = enc::TightDecoder::new(threads)
            .map_err(|e| RfbClientError::Config(format!("cannot start Tight decoder: {e}")))?;
        let mut reg = Self::default();
        reg.register(DecoderEntry::Raw(enc::RawDecoder::new()));
        reg.register(DecoderEntry::Hextile(enc::HextileDecoder::new()));
        reg.register(DecoderEntry::Tight(tight));
        Ok(reg)
    }

    fn register(&mut self, decoder: DecoderEntry) {
        self.decoders.insert(decoder.encoding_type(), decoder);
    }

    /// True when a decoder for `encoding` is registered.
    pub fn supports(&self, encoding: i32) -> bool {
        self.decoders.contains_key(&encoding)
    }

    /// Registered encodings, highest preference first (Tight, Hextile, Raw).
    pub fn encodings(&self) -> Vec<i32> {
        let mut encodings: Vec<i32> = self.decoders.keys().copied().collect();
        encodings.sort_unstable_by(|a, b| b.cmp(a));
        encodings
    }

    /// Wait for deferred work in every decoder; report the first failure.
    pub async fn flush(&mut self) -> Result<(), DecodeError> {
        let mut first_error = None;
        for decoder in self.decoders.values_mut() {
            if let Err(e) = decoder.flush().await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// A concrete decoder entry wrapper for dynamic dispatch over non-object-safe Decoder.
enum DecoderEntry {
    Raw(enc::RawDecoder),
    Hextile(enc::HextileDecoder),
    Tight(enc::TightDecoder),
}

impl DecoderEntry {
    fn encoding_type(&self) -> i32 {
        match self {
            Self::Raw(d) => d.encoding_type(),
            Self::Hextile(d) => d.encoding_type(),
            Self::Tight(d) => d.encoding_type(),
        }
    }

    async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        pixel_format: &PixelFormat,
        framebuffer: &FramebufferHandle,
    ) -> enc::Result<()> {
        match self {
            Self::Raw(d) => d.decode(stream, rect, pixel_format, framebuffer).await,
            Self::Hextile(d) => d.decode(stream, rect, pixel_format, framebuffer).await,
            Self::Tight(d) => d.decode(stream, rect, pixel_format, framebuffer).await,
        }
    }

    async fn flush(&mut self) -> enc::Result<()> {
        match self {
            Self::Raw(d) => d.flush().await,
            Self::Hextile(d) => d.flush().await,
            Self::Tight(d) => d.flush().await,
        }
    }
}

/// Framebuffer state and decoder dispatcher.
pub struct Framebuffer {
    buffer: Arc<Mutex<ManagedPixelBuffer>>,
    /// The same buffer as seen by decoders.
    handle: FramebufferHandle,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    registry: DecoderRegistry,
}

impl Framebuffer {
    /// Create a framebuffer in the negotiated `pixel_format`.
    pub fn new(
        width: u16,
        height: u16,
        pixel_format: PixelFormat,
        config: &DecoderConfig,
    ) -> Result<Self, RfbClientError> {
        Self::with_registry(width, height, pixel_format, DecoderRegistry::with_standard(config)?)
    }

    /// Create a framebuffer whose Tight decoder uses exactly `threads` slots.
    pub fn with_tight_threads(
        width: u16,
        height: u16,
        pixel_format: PixelFormat,
        threads: usize,
    ) -> Result<Self, RfbClientError> {
        Self::with_registry(
            width,
            height,
            pixel_format,
            DecoderRegistry::with_tight_threads(threads)?,
        )
    }

    fn with_registry(
        width: u16,
        height: u16,
        pixel_format: PixelFormat,
        registry: DecoderRegistry,
    ) -> Result<Self, RfbClientError> {
        pixel_format
            .validate()
            .map_err(|e| RfbClientError::Protocol(format!("unusable pixel format: {e:#}")))?;
        let (buffer, handle) =
            ManagedPixelBuffer::new(width as u32, height as u32, pixel_format).into_shared();
        Ok(Self {
            buffer,
            handle,
            width: width as u32,
            height: height as u32,
            pixel_format,
            registry,
        })
    }

    /// Returns the current dimensions.
    pub fn size(&self) -> (u16, u16) {
        (self.width as u16, self.height as u16)
    }

    pub fn pixel_format(&self) -> &PixelFormat {
        &self.pixel_format
    }

    /// Shared access to the pixels, e.g. for a renderer.
    ///
    /// Content is only complete for an update once
    /// [`Framebuffer::apply_update_stream`] or [`Framebuffer::flush`] returned.
    pub fn buffer(&self) -> Arc<Mutex<ManagedPixelBuffer>> {
        self.buffer.clone()
    }

    pub fn registry(&self) -> &DecoderRegistry {
        &self.registry
    }

    /// Apply a single rectangle update from the server.
    ///
    /// The rectangle is checked against the framebuffer before any payload is
    /// read. Tight rectangles may still be in flight when this returns.
    pub async fn apply_rectangle<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
    ) -> Result<(), RfbClientError> {
        if !rect.bounds().fits_within(self.width, self.height) {
            return Err(RfbClientError::Protocol(format!(
                "rectangle {} exceeds framebuffer {}x{}",
                rect, self.width, self.height
            )));
        }

        let decoder = self
            .registry
            .decoders
            .get_mut(&rect.encoding)
            .ok_or(RfbClientError::UnsupportedEncoding(rect.encoding))?;

        decoder
            .decode(stream, rect, &self.pixel_format, &self.handle)
            .await
            .map_err(|source| RfbClientError::Decode {
                rect: *rect,
                source,
            })
    }

    /// Wait until every rectangle applied so far is in the framebuffer.
    pub async fn flush(&mut self) -> Result<(), RfbClientError> {
        self.registry.flush().await.map_err(RfbClientError::Deferred)
    }

    /// Apply an update by streaming from the input (reads header + decodes rectangles).
    ///
    /// The message-type byte must already be consumed. Returns the damaged
    /// regions once all of them are fully drawn.
    pub async fn apply_update_stream<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
    ) -> Result<Vec<Rect>, RfbClientError> {
        let header = FramebufferUpdateHeader::read_from(stream).await?;

        let mut damage: Vec<Rect> = Vec::new();
        let mut remaining = if header.is_last_rect_terminated() {
            None
        } else {
            damage.reserve(header.num_rectangles as usize);
            Some(header.num_rectangles as usize)
        };

        while remaining != Some(0) {
            let rect = Rectangle::read_from(stream).await?;
            tracing::debug!("FramebufferUpdate rect: {}", rect);
            if rect.encoding == enc::PSEUDO_ENCODING_LAST_RECT {
                break;
            }

            self.apply_rectangle(stream, &rect).await?;
            if !rect.is_empty() {
                damage.push(rect.bounds());
            }
            if let Some(n) = remaining.as_mut() {
                *n -= 1;
            }
        }

        self.flush().await?;
        Ok(damage)
    }

    /// Apply rectangles whose headers were already read, returning the list of
    /// damaged regions for repaint.
    pub async fn apply_update<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rects: &[Rectangle],
    ) -> Result<Vec<Rect>, RfbClientError> {
        let mut damage = Vec::with_capacity(rects.len());
        for rect in rects {
            self.apply_rectangle(stream, rect).await?;
            if !rect.is_empty() {
                damage.push(rect.bounds());
            }
        }
        self.flush().await?;
        Ok(damage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfb_encodings::{ErrorKind, ENCODING_HEXTILE, ENCODING_RAW, ENCODING_TIGHT};
    use std::io::Cursor;

    fn framebuffer(width: u16, height: u16) -> Framebuffer {
        Framebuffer::with_tight_threads(width, height, PixelFormat::rgb888(), 2).unwrap()
    }

    fn rect(x: u16, y: u16, width: u16, height: u16, encoding: i32) -> Rectangle {
        Rectangle {
            x,
            y,
            width,
            height,
            encoding,
        }
    }

    #[test]
    fn test_registry_encodings() {
        let registry = DecoderRegistry::with_tight_threads(1).unwrap();
        assert_eq!(
            registry.encodings(),
            vec![ENCODING_TIGHT, ENCODING_HEXTILE, ENCODING_RAW]
        );
        assert!(!registry.supports(16));
    }

    #[test]
    fn test_invalid_pixel_format_rejected() {
        let mut pf = PixelFormat::rgb888();
        pf.bits_per_pixel = 24;
        let err = Framebuffer::with_tight_threads(4, 4, pf, 1).err().unwrap();
        assert!(matches!(err, RfbClientError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_rect_outside_framebuffer_consumes_nothing() {
        let mut fb = framebuffer(4, 4);
        let mut stream = RfbInStream::new(Cursor::new(vec![0u8; 64]));

        let err = fb
            .apply_rectangle(&mut stream, &rect(2, 2, 3, 1, ENCODING_RAW))
            .await
            .unwrap_err();
        assert!(matches!(err, RfbClientError::Protocol(_)));
        assert_eq!(stream.position(), 0);
    }

    #[tokio::test]
    async fn test_unknown_encoding_is_fatal() {
        let mut fb = framebuffer(4, 4);
        let mut stream = RfbInStream::new(Cursor::new(vec![0u8; 4]));

        let err = fb
            .apply_rectangle(&mut stream, &rect(0, 0, 1, 1, 16))
            .await
            .unwrap_err();
        assert!(matches!(err, RfbClientError::UnsupportedEncoding(16)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_decode_error_carries_rect() {
        let mut fb = framebuffer(8, 8);
        let mut stream = RfbInStream::new(Cursor::new(vec![0x80, 0x00]));

        let err = fb
            .apply_rectangle(&mut stream, &rect(1, 2, 3, 4, ENCODING_TIGHT))
            .await
            .unwrap_err();
        match err {
            RfbClientError::Decode { rect: r, source } => {
                assert_eq!(r, rect(1, 2, 3, 4, ENCODING_TIGHT));
                assert_eq!(source.kind(), ErrorKind::Io);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_truncated_headers_are_transport_errors() {
        // Count cut short, then a rectangle header cut short.
        for bytes in [vec![0u8, 0], vec![0u8, 0, 1, 0, 0, 0]] {
            let mut fb = framebuffer(4, 4);
            let mut stream = RfbInStream::new(Cursor::new(bytes));

            let err = fb.apply_update_stream(&mut stream).await.unwrap_err();
            match &err {
                RfbClientError::Transport(e) => {
                    assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof)
                }
                other => panic!("unexpected error {other:?}"),
            }
            assert_eq!(err.kind(), Some(ErrorKind::Io));
        }
    }

    #[tokio::test]
    async fn test_apply_update_returns_damage() {
        let mut fb = framebuffer(4, 4);
        let mut payload = vec![9u8, 8, 7, 0];
        payload.extend([0x80, 1, 2, 3]);
        let mut stream = RfbInStream::new(Cursor::new(payload));

        let rects = [
            rect(0, 0, 1, 1, ENCODING_RAW),
            rect(0, 0, 0, 0, ENCODING_RAW),
            rect(1, 1, 3, 3, ENCODING_TIGHT),
        ];
        let damage = fb.apply_update(&mut stream, &rects).await.unwrap();

        assert_eq!(damage, vec![Rect::new(0, 0, 1, 1), Rect::new(1, 1, 3, 3)]);
        let buffer = fb.buffer();
        let buffer = buffer.lock();
        assert_eq!(buffer.pixel(0, 0).unwrap(), &[9, 8, 7, 0]);
        assert_eq!(fb.pixel_format().to_rgb888(buffer.pixel(3, 3).unwrap()), [1, 2, 3, 255]);
    }
}
