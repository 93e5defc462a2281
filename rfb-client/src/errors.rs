//! Error types for the RFB client.

use rfb_encodings::{DecodeError, ErrorKind, Rectangle};
use std::io;
use thiserror::Error;

/// Errors that can occur while applying framebuffer updates.
#[derive(Debug, Error)]
pub enum RfbClientError {
    /// Transport-level error while reading message framing.
    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    /// Protocol error (malformed message, rectangle outside the framebuffer).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Unsupported encoding type.
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(i32),

    /// A rectangle failed to decode.
    #[error("Failed to decode rectangle {rect}: {source}")]
    Decode {
        rect: Rectangle,
        #[source]
        source: DecodeError,
    },

    /// A rectangle finished on a decode worker failed. The error message
    /// names the rectangle.
    #[error("Deferred decode failed: {0}")]
    Deferred(#[source] DecodeError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RfbClientError {
    /// Classify the failure. Configuration errors happen before any byte is
    /// decoded and have no decode kind.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Transport(_) => Some(ErrorKind::Io),
            Self::Protocol(_) | Self::UnsupportedEncoding(_) => Some(ErrorKind::Protocol),
            Self::Decode { source, .. } | Self::Deferred(source) => Some(source.kind()),
            Self::Config(_) => None,
        }
    }

    /// Always true: the update stream has no resynchronisation point, so the
    /// only recovery is a new connection.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfb_encodings::ENCODING_TIGHT;

    #[test]
    fn test_error_kinds() {
        let err = RfbClientError::Transport(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert_eq!(err.kind(), Some(ErrorKind::Io));
        assert_eq!(RfbClientError::UnsupportedEncoding(16).kind(), Some(ErrorKind::Protocol));
        assert_eq!(RfbClientError::Config("bad".into()).kind(), None);

        let err = RfbClientError::Deferred(DecodeError::codec("zlib channel 1: bad header"));
        assert_eq!(err.kind(), Some(ErrorKind::Codec));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_decode_error_display_names_rect() {
        let rect = Rectangle {
            x: 16,
            y: 32,
            width: 64,
            height: 8,
            encoding: ENCODING_TIGHT,
        };
        let err = RfbClientError::Decode {
            rect,
            source: DecodeError::protocol("Tight JPEG: zero-length image"),
        };
        assert_eq!(
            err.to_string(),
            "Failed to decode rectangle 64x8+16+32 (encoding 7): \
             protocol error: Tight JPEG: zero-length image"
        );
        assert_eq!(err.kind(), Some(ErrorKind::Protocol));
    }
}
