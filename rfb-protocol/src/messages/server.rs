//! Server-to-client message framing needed by the decode path.

use crate::io::RfbInStream;
use tokio::io::AsyncRead;

/// Rectangle count meaning "read rectangles until a LastRect pseudo-rectangle".
pub const LAST_RECT_TERMINATED: u16 = 0xFFFF;

/// FramebufferUpdate header, without the leading message-type byte.
///
/// # Wire Format
///
/// - 1 byte: message type (0), already consumed by the caller
/// - 1 byte: padding
/// - 2 bytes: number of rectangles
///
/// The rectangles themselves (header plus payload) follow and are read one at
/// a time by the dispatcher, since payload sizes are only known while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferUpdateHeader {
    pub num_rectangles: u16,
}

impl FramebufferUpdateHeader {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        stream.skip(1).await?; // padding
        Ok(Self {
            num_rectangles: stream.read_u16().await?,
        })
    }

    /// True when the server did not announce a count and will end the update
    /// with a LastRect pseudo-rectangle instead.
    pub fn is_last_rect_terminated(&self) -> bool {
        self.num_rectangles == LAST_RECT_TERMINATED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_update_header() {
        let mut stream = RfbInStream::new(Cursor::new(vec![0x00, 0x00, 0x03]));
        let header = FramebufferUpdateHeader::read_from(&mut stream).await.unwrap();
        assert_eq!(header.num_rectangles, 3);
        assert!(!header.is_last_rect_terminated());
    }

    #[tokio::test]
    async fn test_update_header_last_rect_terminated() {
        let mut stream = RfbInStream::new(Cursor::new(vec![0x00, 0xFF, 0xFF]));
        let header = FramebufferUpdateHeader::read_from(&mut stream).await.unwrap();
        assert!(header.is_last_rect_terminated());
    }
}
