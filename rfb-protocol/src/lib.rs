//! RFB (Remote Framebuffer) protocol plumbing for the decode path.
//!
//! This crate owns the byte-level view of a server-to-client stream: a buffered
//! async reader with exact-length reads, and the framing of FramebufferUpdate
//! messages and their rectangle headers.
//!
//! # Modules
//!
//! - [`io`] - Buffered input stream ([`RfbInStream`]) and the compact-length varint
//! - [`messages`] - FramebufferUpdate header, rectangle header, encoding ids

pub mod io;
pub mod messages;

// Re-export commonly used types
pub use io::RfbInStream;
pub use messages::{FramebufferUpdateHeader, Rectangle};
