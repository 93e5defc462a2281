//! RFB pixel buffer types and utilities.
//!
//! This crate provides the negotiated pixel format description and the
//! framebuffer that decoders write into.
//!
//! - [`PixelFormat`] - pixel layout, pack/unpack helpers
//! - [`PixelBuffer`] / [`MutablePixelBuffer`] - buffer access traits
//! - [`ManagedPixelBuffer`] - owned framebuffer storage
//! - [`FramebufferHandle`] - shared, lockable framebuffer used across decode workers

pub mod buffer;
pub mod format;
pub mod managed;

pub use buffer::{MutablePixelBuffer, PixelBuffer};
pub use format::{Channel, PixelFormat};
pub use managed::{FramebufferHandle, ManagedPixelBuffer};
