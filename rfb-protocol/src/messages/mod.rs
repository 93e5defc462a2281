//! RFB protocol message types for the server-to-client update path.
//!
//! - **Core types** ([`types`]) - Rectangle header and encoding constants
//! - **Server messages** ([`server`]) - FramebufferUpdate header
//!
//! # Wire Format Rules
//!
//! 1. **Big-endian byte order** - All multi-byte integers use network byte order
//! 2. **Fail-fast errors** - Invalid data results in errors, no defensive fallbacks

pub mod server;
pub mod types;

pub use server::{FramebufferUpdateHeader, LAST_RECT_TERMINATED};
pub use types::{
    Rectangle, ENCODING_HEXTILE, ENCODING_RAW, ENCODING_TIGHT, PSEUDO_ENCODING_LAST_RECT,
};
