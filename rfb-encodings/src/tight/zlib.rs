//! The four persistent zlib channels of a Tight session.
//!
//! A channel is created lazily on first use and keeps its inflate history
//! across rectangles until the server resets it through the control byte.
//! Each channel sits behind its own lock; the pool additionally binds channel
//! `c` to worker slot `c % N`, so in practice the lock is never contended and
//! only makes the sharing explicit.

use crate::error::{resize_buffer, DecodeError, Result};
use flate2::{Decompress, FlushDecompress, Status};
use parking_lot::Mutex;

pub const CHANNEL_COUNT: usize = 4;

pub struct ZlibChannelSet {
    channels: [Mutex<Option<Decompress>>; CHANNEL_COUNT],
}

impl Default for ZlibChannelSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ZlibChannelSet {
    pub fn new() -> Self {
        Self {
            channels: std::array::from_fn(|_| Mutex::new(None)),
        }
    }

    pub fn is_active(&self, id: usize) -> bool {
        self.channels[id].lock().is_some()
    }

    /// Tear down channel `id`. Returns false when it was not active.
    ///
    /// The caller must make sure no job on this channel is still pending.
    pub fn reset(&self, id: usize) -> bool {
        match self.channels[id].lock().take() {
            Some(stream) => {
                tracing::debug!(
                    "Tight: zlib channel {} reset (in={}, out={})",
                    id,
                    stream.total_in(),
                    stream.total_out()
                );
                true
            }
            None => false,
        }
    }

    /// Inflate `input` on channel `id` with a sync flush into `output`,
    /// which is resized to exactly `expected` bytes. Anything other than
    /// exactly `expected` bytes of output is a codec error.
    pub fn inflate(
        &self,
        id: usize,
        input: &[u8],
        output: &mut Vec<u8>,
        expected: usize,
    ) -> Result<()> {
        resize_buffer(output, expected)?;

        let mut guard = self.channels[id].lock();
        let stream = guard.get_or_insert_with(|| Decompress::new(true));

        let mut consumed = 0usize;
        let mut produced = 0usize;
        loop {
            let before_in = stream.total_in();
            let before_out = stream.total_out();
            let status = stream
                .decompress(
                    &input[consumed..],
                    &mut output[produced..],
                    FlushDecompress::Sync,
                )
                .map_err(|e| DecodeError::codec(format!("zlib channel {id}: {e}")))?;
            let step_in = (stream.total_in() - before_in) as usize;
            let step_out = (stream.total_out() - before_out) as usize;
            consumed += step_in;
            produced += step_out;

            if produced == expected
                || status == Status::StreamEnd
                || (step_in == 0 && step_out == 0)
            {
                break;
            }
        }

        if produced != expected {
            return Err(DecodeError::codec(format!(
                "zlib channel {id} produced {produced} bytes, expected {expected} (input {} bytes)",
                input.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use flate2::write::ZlibEncoder;
    use flate2::{Compress, Compression, FlushCompress};

    /// Compress each chunk on one persistent stream with a sync flush after
    /// each, the way a server feeds one channel across rectangles.
    fn sync_flushed_chunks(chunks: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut compress = Compress::new(Compression::default(), true);
        chunks
            .iter()
            .map(|chunk| {
                let mut out = Vec::with_capacity(chunk.len() + 64);
                compress
                    .compress_vec(chunk, &mut out, FlushCompress::Sync)
                    .unwrap();
                out
            })
            .collect()
    }

    #[test]
    fn test_inflate_continues_across_calls() {
        let first = vec![0x42u8; 300];
        let second: Vec<u8> = (0..300u32).map(|i| (i % 7) as u8).collect();
        let parts = sync_flushed_chunks(&[&first, &second]);

        let channels = ZlibChannelSet::new();
        assert!(!channels.is_active(2));

        let mut out = Vec::new();
        channels.inflate(2, &parts[0], &mut out, first.len()).unwrap();
        assert_eq!(out, first);
        assert!(channels.is_active(2));

        channels.inflate(2, &parts[1], &mut out, second.len()).unwrap();
        assert_eq!(out, second);
    }

    #[test]
    fn test_second_chunk_fails_on_fresh_stream() {
        let parts = sync_flushed_chunks(&[&[1u8; 100], &[2u8; 100]]);
        let channels = ZlibChannelSet::new();
        let mut out = Vec::new();

        // Without the first chunk the stream header is missing.
        let err = channels.inflate(0, &parts[1], &mut out, 100).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Codec);
    }

    #[test]
    fn test_reset_restarts_stream() {
        let parts = sync_flushed_chunks(&[&[9u8; 64]]);
        let channels = ZlibChannelSet::new();
        let mut out = Vec::new();

        channels.inflate(1, &parts[0], &mut out, 64).unwrap();
        assert!(channels.reset(1));
        assert!(!channels.is_active(1));
        assert!(!channels.reset(1));

        // A new stream accepts a new zlib header.
        channels.inflate(1, &parts[0], &mut out, 64).unwrap();
        assert_eq!(out, vec![9u8; 64]);
    }

    #[test]
    fn test_channels_are_independent() {
        let a = sync_flushed_chunks(&[&[1u8; 50], &[3u8; 50]]);
        let b = sync_flushed_chunks(&[&[2u8; 50]]);
        let channels = ZlibChannelSet::new();
        let mut out = Vec::new();

        channels.inflate(0, &a[0], &mut out, 50).unwrap();
        channels.inflate(3, &b[0], &mut out, 50).unwrap();
        assert!(channels.reset(3));
        channels.inflate(0, &a[1], &mut out, 50).unwrap();
        assert_eq!(out, vec![3u8; 50]);
    }

    #[test]
    fn test_short_output_is_codec_error() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        std::io::Write::write_all(&mut encoder, &[5u8; 20]).unwrap();
        let data = encoder.finish().unwrap();

        let channels = ZlibChannelSet::new();
        let mut out = Vec::new();
        let err = channels.inflate(0, &data, &mut out, 40).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Codec);
    }
}
