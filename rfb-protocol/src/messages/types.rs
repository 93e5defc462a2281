//! Core RFB protocol types for the decode path.
//!
//! - [`Rectangle`] - rectangle header with encoding type
//! - Encoding constants for the encodings and pseudo-encodings the decoder understands

use crate::io::RfbInStream;
use rfb_common::Rect;
use tokio::io::AsyncRead;

/// Rectangle header from a FramebufferUpdate message.
///
/// # Wire Format
///
/// - 2 bytes: x position
/// - 2 bytes: y position
/// - 2 bytes: width
/// - 2 bytes: height
/// - 4 bytes: encoding type (signed i32)
///
/// The encoding-specific payload follows immediately and is consumed by the
/// decoder registered for `encoding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub encoding: i32,
}

impl Rectangle {
    /// Read a Rectangle header from an RFB input stream.
    ///
    /// **Note**: This only reads the 12-byte header.
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        Ok(Self {
            x: stream.read_u16().await?,
            y: stream.read_u16().await?,
            width: stream.read_u16().await?,
            height: stream.read_u16().await?,
            encoding: stream.read_i32().await?,
        })
    }

    /// Destination area in framebuffer coordinates.
    pub fn bounds(&self) -> Rect {
        Rect::new(
            self.x as i32,
            self.y as i32,
            self.width as u32,
            self.height as u32,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Rectangle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}+{}+{} (encoding {})",
            self.width, self.height, self.x, self.y, self.encoding
        )
    }
}

//
// Encoding type constants
//

/// Raw encoding - uncompressed pixel data.
pub const ENCODING_RAW: i32 = 0;

/// Hextile encoding - 16x16 tile-based compression.
pub const ENCODING_HEXTILE: i32 = 5;

/// Tight encoding - zlib, filters, and JPEG.
pub const ENCODING_TIGHT: i32 = 7;

/// LastRect pseudo-encoding: terminates an update sent with an unknown
/// rectangle count. Carries no payload.
pub const PSEUDO_ENCODING_LAST_RECT: i32 = -224;
