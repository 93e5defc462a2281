//! Buffered input stream for the server-to-client half of an RFB session.
//!
//! Every decoder reads its payload through [`RfbInStream`]: fixed-width
//! integers in network byte order, exact-length byte runs, and the Tight
//! "compact length" varint. The stream keeps a running count of consumed bytes
//! so framing can be checked per rectangle.
//!
//! # Examples
//!
//! ```no_run
//! use rfb_protocol::io::RfbInStream;
//!
//! # async fn example<R: tokio::io::AsyncRead + Unpin>(reader: R) -> std::io::Result<()> {
//! let mut input = RfbInStream::new(reader);
//! let message_type = input.read_u8().await?;
//! input.skip(1).await?;
//! let rect_count = input.read_u16().await?;
//! # Ok(())
//! # }
//! ```

use bytes::{Buf, BytesMut};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest value a three-byte compact length can carry (22 bits).
pub const MAX_COMPACT_LENGTH: usize = (1 << 22) - 1;

/// Buffered input stream for reading RFB protocol data.
///
/// Data is pulled from the underlying reader on demand into an internal
/// `BytesMut` (8KB by default). Reads either complete with exactly the
/// requested number of bytes or fail with `UnexpectedEof`.
pub struct RfbInStream<R> {
    reader: R,
    buffer: BytesMut,
    consumed: u64,
}

impl<R: AsyncRead + Unpin> RfbInStream<R> {
    /// Create a new input stream with default buffer size (8KB).
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, 8192)
    }

    /// Create a new input stream with specified buffer capacity.
    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(capacity),
            consumed: 0,
        }
    }

    /// Ensure at least `n` bytes are available in the buffer.
    async fn ensure_bytes(&mut self, n: usize) -> std::io::Result<()> {
        if self.buffer.capacity() < n {
            self.buffer.reserve(n - self.buffer.len());
        }
        while self.buffer.len() < n {
            let bytes_read = self.reader.read_buf(&mut self.buffer).await?;
            if bytes_read == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("expected {} bytes, got {}", n, self.buffer.len()),
                ));
            }
        }
        Ok(())
    }

    /// Read a single byte.
    pub async fn read_u8(&mut self) -> std::io::Result<u8> {
        self.ensure_bytes(1).await?;
        self.consumed += 1;
        Ok(self.buffer.get_u8())
    }

    /// Read a 16-bit unsigned integer in network byte order (big-endian).
    pub async fn read_u16(&mut self) -> std::io::Result<u16> {
        self.ensure_bytes(2).await?;
        self.consumed += 2;
        Ok(self.buffer.get_u16())
    }

    /// Read a 32-bit unsigned integer in network byte order (big-endian).
    pub async fn read_u32(&mut self) -> std::io::Result<u32> {
        self.ensure_bytes(4).await?;
        self.consumed += 4;
        Ok(self.buffer.get_u32())
    }

    /// Read a 32-bit signed integer in network byte order (big-endian).
    pub async fn read_i32(&mut self) -> std::io::Result<i32> {
        self.ensure_bytes(4).await?;
        self.consumed += 4;
        Ok(self.buffer.get_i32())
    }

    /// Read exactly `buf.len()` bytes into the provided buffer.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedEof` if the stream ends before the buffer is filled.
    /// Bytes that did arrive stay buffered; the session is dead at that point
    /// anyway.
    pub async fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        self.ensure_bytes(buf.len()).await?;
        self.buffer.copy_to_slice(buf);
        self.consumed += buf.len() as u64;
        Ok(())
    }

    /// Skip `n` bytes in the stream.
    pub async fn skip(&mut self, n: usize) -> std::io::Result<()> {
        self.ensure_bytes(n).await?;
        self.buffer.advance(n);
        self.consumed += n as u64;
        Ok(())
    }

    /// Read a Tight compact length: 1 to 3 bytes, 7 bits in each of the first
    /// two (bit 7 set means "another byte follows") and 8 bits in the third.
    ///
    /// ```text
    /// 0xxxxxxx                      -> 0..=127
    /// 1xxxxxxx 0yyyyyyy             -> 0..=16383
    /// 1xxxxxxx 1yyyyyyy zzzzzzzz    -> 0..=4194303
    /// ```
    pub async fn read_compact_length(&mut self) -> std::io::Result<usize> {
        let b0 = self.read_u8().await?;
        let mut len = (b0 & 0x7F) as usize;
        if b0 & 0x80 != 0 {
            let b1 = self.read_u8().await?;
            len |= ((b1 & 0x7F) as usize) << 7;
            if b1 & 0x80 != 0 {
                let b2 = self.read_u8().await?;
                len |= (b2 as usize) << 14;
            }
        }
        Ok(len)
    }

    /// Get the number of bytes currently available in the buffer.
    ///
    /// This indicates how many bytes can be read without performing I/O.
    pub fn available(&self) -> usize {
        self.buffer.len()
    }

    /// Total number of bytes handed out by this stream since it was created.
    pub fn position(&self) -> u64 {
        self.consumed
    }

    /// Get a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Consume the stream and return the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R> fmt::Debug for RfbInStream<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RfbInStream")
            .field("buffered", &self.buffer.len())
            .field("consumed", &self.consumed)
            .finish_non_exhaustive()
    }
}

/// Encode `len` the way [`RfbInStream::read_compact_length`] expects it.
///
/// The client never sends compact lengths; this exists for building server
/// payloads in tests and tools. Values above [`MAX_COMPACT_LENGTH`] are
/// truncated to 22 bits.
pub fn encode_compact_length(len: usize) -> Vec<u8> {
    let len = len & MAX_COMPACT_LENGTH;
    let mut out = vec![(len & 0x7F) as u8];
    if len > 0x7F {
        out[0] |= 0x80;
        out.push(((len >> 7) & 0x7F) as u8);
        if len > 0x3FFF {
            out[1] |= 0x80;
            out.push((len >> 14) as u8);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_read_u8() {
        let data = vec![42u8, 100, 255];
        let mut stream = RfbInStream::new(Cursor::new(data));

        assert_eq!(stream.read_u8().await.unwrap(), 42);
        assert_eq!(stream.read_u8().await.unwrap(), 100);
        assert_eq!(stream.read_u8().await.unwrap(), 255);
        assert_eq!(stream.position(), 3);
    }

    #[tokio::test]
    async fn test_read_integers_big_endian() {
        let data = vec![0x12, 0x34, 0xDE, 0xAD, 0xBE, 0xEF, 0xFF, 0xFF, 0xFF, 0x20];
        let mut stream = RfbInStream::new(Cursor::new(data));

        assert_eq!(stream.read_u16().await.unwrap(), 0x1234);
        assert_eq!(stream.read_u32().await.unwrap(), 0xDEADBEEF);
        assert_eq!(stream.read_i32().await.unwrap(), -224);
        assert_eq!(stream.position(), 10);
    }

    #[tokio::test]
    async fn test_read_bytes_and_skip() {
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let mut stream = RfbInStream::new(Cursor::new(data));

        stream.skip(2).await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_bytes(&mut buf).await.unwrap();
        assert_eq!(buf, [3, 4, 5, 6]);
        assert_eq!(stream.position(), 6);
    }

    #[tokio::test]
    async fn test_read_larger_than_initial_capacity() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let mut stream = RfbInStream::with_capacity(Cursor::new(data.clone()), 16);

        let mut buf = vec![0u8; data.len()];
        stream.read_bytes(&mut buf).await.unwrap();
        assert_eq!(buf, data);
    }

    #[tokio::test]
    async fn test_debug_reports_position() {
        let mut stream = RfbInStream::new(Cursor::new(vec![1u8, 2, 3]));
        stream.read_u8().await.unwrap();

        let text = format!("{stream:?}");
        assert!(text.starts_with("RfbInStream"), "{text}");
        assert!(text.contains("buffered: 2"), "{text}");
        assert!(text.contains("consumed: 1"), "{text}");
    }

    #[tokio::test]
    async fn test_read_eof() {
        let mut stream = RfbInStream::new(Cursor::new(vec![1u8, 2]));
        let mut buf = [0u8; 3];
        let err = stream.read_bytes(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_compact_length_boundaries() {
        let cases: &[(&[u8], usize)] = &[
            (&[0x00], 0),
            (&[0x7F], 127),
            (&[0x80, 0x01], 128),
            (&[0xFF, 0x7F], 16383),
            (&[0x80, 0x80, 0x01], 16384),
            (&[0xFF, 0xFF, 0xFF], MAX_COMPACT_LENGTH),
        ];
        for (bytes, expected) in cases {
            let mut stream = RfbInStream::new(Cursor::new(bytes.to_vec()));
            assert_eq!(stream.read_compact_length().await.unwrap(), *expected);
            assert_eq!(stream.position(), bytes.len() as u64);
        }
    }

    #[tokio::test]
    async fn test_compact_length_truncated() {
        let mut stream = RfbInStream::new(Cursor::new(vec![0x80]));
        assert!(stream.read_compact_length().await.is_err());
    }

    proptest! {
        #[test]
        fn compact_length_encoding_is_read_back(len in 0usize..=MAX_COMPACT_LENGTH) {
            let encoded = encode_compact_length(len);
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let decoded = rt.block_on(async {
                let mut stream = RfbInStream::new(Cursor::new(encoded.clone()));
                stream.read_compact_length().await.unwrap()
            });
            prop_assert_eq!(decoded, len);
            prop_assert!(encoded.len() <= 3);
        }
    }
}
