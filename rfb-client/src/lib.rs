//! Client-side application of RFB framebuffer updates.
//!
//! This crate sits on top of `rfb-protocol` and `rfb-encodings`. It owns the
//! framebuffer, picks the decoder for each rectangle of a FramebufferUpdate,
//! and reports the damaged regions once the update is fully drawn.
//!
//! # Quick Start
//!
//! ```no_run
//! use rfb_client::{DecoderConfig, Framebuffer};
//! use rfb_encodings::{PixelFormat, RfbInStream};
//!
//! # async fn example(socket: tokio::net::TcpStream) -> Result<(), rfb_client::RfbClientError> {
//! rfb_client::init_tracing();
//!
//! let config = DecoderConfig::default().with_env_overrides();
//! let mut framebuffer = Framebuffer::new(1920, 1080, PixelFormat::rgb888(), &config)?;
//! let mut input = RfbInStream::new(socket);
//!
//! // After reading a FramebufferUpdate message-type byte:
//! let damage = framebuffer.apply_update_stream(&mut input).await?;
//! println!("{} rectangles updated", damage.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Every error is fatal for the session: the update stream has no point at
//! which decoding could resume, so the caller's only option is to reconnect.
//!
//! # Safety
//!
//! This crate is `#![forbid(unsafe_code)]` and uses only safe Rust.

#![forbid(unsafe_code)]

pub mod config;
pub mod errors;
pub mod framebuffer;

pub use config::{DecoderConfig, DECODE_THREADS_ENV};
pub use errors::RfbClientError;
pub use framebuffer::{DecoderRegistry, Framebuffer};

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}
