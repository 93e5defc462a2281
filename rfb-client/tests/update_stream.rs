//! Whole FramebufferUpdate messages through the dispatcher, with every Tight
//! decode slot count the pool supports.

use flate2::{Compress, Compression, FlushCompress};
use pretty_assertions::assert_eq;
use rfb_client::{Framebuffer, RfbClientError};
use rfb_encodings::{
    ErrorKind, PixelFormat, RfbInStream, ENCODING_HEXTILE, ENCODING_RAW, ENCODING_TIGHT,
    PSEUDO_ENCODING_LAST_RECT,
};
use rfb_protocol::io::encode_compact_length;
use std::io::Cursor;

const THREAD_COUNTS: [usize; 4] = [1, 2, 4, 8];
const WIDTH: u16 = 48;
const HEIGHT: u16 = 16;

/// Builds the body of a FramebufferUpdate (everything after the type byte).
struct UpdateBuilder {
    rects: Vec<u8>,
    count: u16,
    channels: [Compress; 4],
}

impl UpdateBuilder {
    fn new() -> Self {
        Self {
            rects: Vec::new(),
            count: 0,
            channels: std::array::from_fn(|_| Compress::new(Compression::default(), true)),
        }
    }

    fn rect(&mut self, x: u16, y: u16, w: u16, h: u16, encoding: i32, payload: &[u8]) -> &mut Self {
        for v in [x, y, w, h] {
            self.rects.extend(v.to_be_bytes());
        }
        self.rects.extend(encoding.to_be_bytes());
        self.rects.extend_from_slice(payload);
        self.count += 1;
        self
    }

    /// Tight Basic rectangle, Copy filter, compact RGB sent on `channel`.
    fn tight_zlib(&mut self, x: u16, y: u16, w: u16, h: u16, channel: u8, rgb: &[u8]) -> &mut Self {
        let mut compressed = Vec::with_capacity(rgb.len() + 64);
        self.channels[channel as usize]
            .compress_vec(rgb, &mut compressed, FlushCompress::Sync)
            .unwrap();
        let mut payload = vec![channel << 4];
        payload.extend(encode_compact_length(compressed.len()));
        payload.extend(compressed);
        self.rect(x, y, w, h, ENCODING_TIGHT, &payload)
    }

    /// Take the update built so far, with an explicit rectangle count.
    fn finish(&mut self) -> Vec<u8> {
        let mut out = vec![0u8];
        out.extend(self.count.to_be_bytes());
        out.append(&mut self.rects);
        self.count = 0;
        out
    }

    /// Take the update built so far, terminated by a LastRect rectangle.
    fn finish_with_last_rect(&mut self) -> Vec<u8> {
        self.rect(0, 0, 0, 0, PSEUDO_ENCODING_LAST_RECT, &[]);
        let mut out = vec![0u8, 0xFF, 0xFF];
        out.append(&mut self.rects);
        self.count = 0;
        out
    }
}

/// Expected picture, painted the same way as the update.
struct Model {
    pixels: Vec<[u8; 3]>,
}

impl Model {
    fn new() -> Self {
        Self {
            pixels: vec![[0, 0, 0]; WIDTH as usize * HEIGHT as usize],
        }
    }

    fn paint(&mut self, x: u16, y: u16, w: u16, h: u16, color: impl Fn(usize, usize) -> [u8; 3]) {
        for dy in 0..h as usize {
            for dx in 0..w as usize {
                let i = (y as usize + dy) * WIDTH as usize + x as usize + dx;
                self.pixels[i] = color(dx, dy);
            }
        }
    }
}

fn rgb_bytes(w: u16, h: u16, color: impl Fn(usize, usize) -> [u8; 3]) -> Vec<u8> {
    let mut out = Vec::new();
    for dy in 0..h as usize {
        for dx in 0..w as usize {
            out.extend(color(dx, dy));
        }
    }
    out
}

fn snapshot(fb: &Framebuffer) -> Vec<[u8; 3]> {
    let buffer = fb.buffer();
    let buffer = buffer.lock();
    let pf = fb.pixel_format();
    (0..HEIGHT as u32)
        .flat_map(|y| (0..WIDTH as u32).map(move |x| (x, y)))
        .map(|(x, y)| {
            let [r, g, b, _] = pf.to_rgb888(buffer.pixel(x, y).unwrap());
            [r, g, b]
        })
        .collect()
}

/// One update exercising every encoding, plus the picture it should produce.
fn mixed_update(builder: &mut UpdateBuilder, model: &mut Model, seed: u8) -> Vec<u8> {
    // Raw 4x4 in the corner, native little-endian RGB888.
    let raw = |dx: usize, dy: usize| [seed.wrapping_add(dx as u8 * 40), dy as u8 * 60, 7];
    let mut payload = Vec::new();
    for [r, g, b] in rgb_bytes(4, 4, raw).chunks_exact(3).map(|c| [c[0], c[1], c[2]]) {
        payload.extend([b, g, r, 0]);
    }
    builder.rect(0, 0, 4, 4, ENCODING_RAW, &payload);
    model.paint(0, 0, 4, 4, raw);

    // Tight fill next to it.
    let fill = [seed, 0x80, 0xFF];
    let mut payload = vec![0x80];
    payload.extend(fill);
    builder.rect(4, 0, 28, 4, ENCODING_TIGHT, &payload);
    model.paint(4, 0, 28, 4, |_, _| fill);

    // Hextile: one background-only tile.
    let bg = [0x10, 0x20, seed];
    builder.rect(32, 0, 16, 16, ENCODING_HEXTILE, &[0x02, bg[2], bg[1], bg[0], 0]);
    model.paint(32, 0, 16, 16, |_, _| bg);

    // Tight zlib rectangles, one per channel, two rows of them so each
    // channel's history carries over.
    for row in 0..2u16 {
        for channel in 0..4u8 {
            let x = channel as u16 * 8;
            let y = 4 + row * 4;
            let color = move |dx: usize, dy: usize| {
                [
                    (dx * 30) as u8 ^ seed,
                    (dy * 50 + channel as usize) as u8,
                    (row as u8).wrapping_mul(90),
                ]
            };
            builder.tight_zlib(x, y, 8, 4, channel, &rgb_bytes(8, 4, color));
            model.paint(x, y, 8, 4, color);
        }
    }

    // Small Tight rectangle sent without compression.
    let small = |dx: usize, _: usize| [dx as u8, 1, seed];
    let mut payload = vec![0x00];
    payload.extend(rgb_bytes(3, 1, small));
    builder.rect(0, 12, 3, 1, ENCODING_TIGHT, &payload);
    model.paint(0, 12, 3, 1, small);

    builder.finish()
}

#[tokio::test]
async fn mixed_update_is_identical_for_every_thread_count() {
    for threads in THREAD_COUNTS {
        let mut builder = UpdateBuilder::new();
        let mut model = Model::new();
        let bytes = mixed_update(&mut builder, &mut model, 3);
        let len = bytes.len() as u64;

        let mut fb =
            Framebuffer::with_tight_threads(WIDTH, HEIGHT, PixelFormat::rgb888(), threads).unwrap();
        let mut stream = RfbInStream::new(Cursor::new(bytes));
        let damage = fb.apply_update_stream(&mut stream).await.unwrap();

        assert_eq!(damage.len(), 12, "threads={threads}");
        assert_eq!(stream.position(), len, "threads={threads}");
        assert_eq!(snapshot(&fb), model.pixels, "threads={threads}");
    }
}

#[tokio::test]
async fn zlib_history_survives_across_updates() {
    for threads in THREAD_COUNTS {
        let mut builder = UpdateBuilder::new();
        let mut model = Model::new();
        let mut fb =
            Framebuffer::with_tight_threads(WIDTH, HEIGHT, PixelFormat::rgb888(), threads).unwrap();

        for seed in [1u8, 2, 3] {
            let bytes = mixed_update(&mut builder, &mut model, seed);
            let mut stream = RfbInStream::new(Cursor::new(bytes));
            fb.apply_update_stream(&mut stream).await.unwrap();
            assert_eq!(snapshot(&fb), model.pixels, "threads={threads} seed={seed}");
        }
    }
}

#[tokio::test]
async fn last_rect_terminates_update() {
    for threads in THREAD_COUNTS {
        let mut builder = UpdateBuilder::new();
        let mut model = Model::new();
        let color = |dx: usize, dy: usize| [dx as u8, dy as u8, 99];
        for channel in 0..4u8 {
            let x = channel as u16 * 12;
            builder.tight_zlib(x, 2, 12, 6, channel, &rgb_bytes(12, 6, color));
            model.paint(x, 2, 12, 6, color);
        }
        let mut bytes = builder.finish_with_last_rect();
        // Trailing bytes belong to the next message and must stay unread.
        bytes.extend([0xEE, 0xEE]);

        let mut fb =
            Framebuffer::with_tight_threads(WIDTH, HEIGHT, PixelFormat::rgb888(), threads).unwrap();
        let mut stream = RfbInStream::new(Cursor::new(bytes));
        let damage = fb.apply_update_stream(&mut stream).await.unwrap();

        assert_eq!(damage.len(), 4);
        assert_eq!(snapshot(&fb), model.pixels, "threads={threads}");
        assert_eq!(stream.read_u16().await.unwrap(), 0xEEEE);
    }
}

#[tokio::test]
async fn corrupt_zlib_data_fails_the_update() {
    for threads in THREAD_COUNTS {
        let mut builder = UpdateBuilder::new();
        builder.rect(0, 0, 8, 2, ENCODING_TIGHT, &[0x10, 4, 0xDE, 0xAD, 0xBE, 0xEF]);
        let bytes = builder.finish();

        let mut fb =
            Framebuffer::with_tight_threads(WIDTH, HEIGHT, PixelFormat::rgb888(), threads).unwrap();
        let mut stream = RfbInStream::new(Cursor::new(bytes));
        let err = fb.apply_update_stream(&mut stream).await.unwrap_err();

        // With one slot the job runs inline and fails with its rectangle;
        // otherwise the failure comes back from the end-of-update flush.
        match &err {
            RfbClientError::Decode { .. } => assert_eq!(threads, 1),
            RfbClientError::Deferred(_) => assert!(threads > 1),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(err.kind(), Some(ErrorKind::Codec));
        assert!(err.to_string().contains("8x2+0+0"), "{err}");
    }
}

#[tokio::test]
async fn rectangle_outside_framebuffer_is_rejected() {
    let mut builder = UpdateBuilder::new();
    builder.rect(40, 10, 16, 16, ENCODING_RAW, &[]);
    let bytes = builder.finish();

    let mut fb = Framebuffer::with_tight_threads(WIDTH, HEIGHT, PixelFormat::rgb888(), 2).unwrap();
    let mut stream = RfbInStream::new(Cursor::new(bytes));
    let err = fb.apply_update_stream(&mut stream).await.unwrap_err();
    assert!(matches!(err, RfbClientError::Protocol(_)), "{err:?}");
}

#[tokio::test]
async fn truncated_update_is_an_io_failure() {
    let mut builder = UpdateBuilder::new();
    builder.rect(0, 0, 4, 4, ENCODING_RAW, &[0u8; 20]);
    let bytes = builder.finish();

    let mut fb = Framebuffer::with_tight_threads(WIDTH, HEIGHT, PixelFormat::rgb888(), 1).unwrap();
    let mut stream = RfbInStream::new(Cursor::new(bytes));
    let err = fb.apply_update_stream(&mut stream).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Io));
}
