//! Rectangle decoders for RFB (VNC) framebuffer updates.
//!
//! This crate defines the [`Decoder`] trait and the three encodings the client
//! renders: [`RawDecoder`], [`HextileDecoder`] and [`TightDecoder`]. A decoder
//! reads one rectangle's payload from an [`RfbInStream`], converts it into the
//! negotiated [`PixelFormat`] and writes it into the shared framebuffer.
//!
//! # Key Concepts
//!
//! - **Async decoding**: Decoders read from a tokio [`AsyncRead`]-backed [`RfbInStream`]
//! - **Rectangle-based**: Decoders operate on a single rectangle at a time and consume
//!   exactly its payload
//! - **Deferred completion**: Tight may finish a rectangle on a worker thread after
//!   `decode` returns; [`Decoder::flush`] waits for all outstanding work
//! - **Fail-fast policy**: every error is fatal for the session, see [`DecodeError`]
//!
//! # Example
//!
//! ```no_run
//! use rfb_encodings::{Decoder, FramebufferHandle, PixelFormat, Rectangle, Result, RfbInStream};
//! use rfb_encodings::ENCODING_RAW;
//! use tokio::io::AsyncRead;
//!
//! struct NoopDecoder;
//!
//! impl Decoder for NoopDecoder {
//!     fn encoding_type(&self) -> i32 {
//!         ENCODING_RAW
//!     }
//!
//!     async fn decode<R: AsyncRead + Unpin>(
//!         &mut self,
//!         _stream: &mut RfbInStream<R>,
//!         _rect: &Rectangle,
//!         _pixel_format: &PixelFormat,
//!         _framebuffer: &FramebufferHandle,
//!     ) -> Result<()> {
//!         Ok(())
//!     }
//! }
//! ```

use tokio::io::AsyncRead;

// Re-export types from rfb-protocol and rfb-pixelbuffer used by decoders
pub use rfb_pixelbuffer::{FramebufferHandle, MutablePixelBuffer, PixelFormat};
pub use rfb_protocol::io::RfbInStream;
pub use rfb_protocol::messages::types::{
    Rectangle, ENCODING_HEXTILE, ENCODING_RAW, ENCODING_TIGHT, PSEUDO_ENCODING_LAST_RECT,
};

pub mod error;
pub use error::{DecodeError, ErrorKind, Result};

pub mod raw;
pub use raw::RawDecoder;

pub mod hextile;
pub use hextile::HextileDecoder;

pub mod pool;
pub use pool::{resolve_thread_count, DecodeThreadPool, MAX_DECODE_THREADS};

pub mod tight;
pub use tight::TightDecoder;

#[allow(async_fn_in_trait)]
pub trait Decoder {
    fn encoding_type(&self) -> i32;

    /// Consume one rectangle's payload and render it.
    ///
    /// The rectangle has already been checked against the framebuffer bounds.
    /// Implementations may hand the final pixel work to another thread; the
    /// pixels are guaranteed to be in the framebuffer once [`Decoder::flush`]
    /// returns.
    async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        pixel_format: &PixelFormat,
        framebuffer: &FramebufferHandle,
    ) -> Result<()>;

    /// Wait for deferred work and report the first failure.
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
