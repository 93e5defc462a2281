//! Error taxonomy for the decode path.
//!
//! Every failure aborts the session: nothing here is retried. The variants
//! only classify the cause so the caller can report it.

use std::collections::TryReserveError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Coarse classification of a [`DecodeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range data from the server.
    Protocol,
    /// The transport failed or ended mid-payload.
    Io,
    /// Buffer allocation or worker start-up failed.
    Resource,
    /// zlib or JPEG rejected its input.
    Codec,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("out of resources: {0}")]
    Resource(String),

    #[error("codec error: {0}")]
    Codec(String),
}

impl DecodeError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Io { .. } => ErrorKind::Io,
            Self::Resource(_) => ErrorKind::Resource,
            Self::Codec(_) => ErrorKind::Codec,
        }
    }

    /// Prefix the message with the decode sub-path that failed, e.g. "Tight JPEG".
    pub fn within(self, path: &str) -> Self {
        match self {
            Self::Protocol(msg) => Self::Protocol(format!("{path}: {msg}")),
            Self::Io { context, source } => Self::Io {
                context: format!("{path}: {context}"),
                source,
            },
            Self::Resource(msg) => Self::Resource(format!("{path}: {msg}")),
            Self::Codec(msg) => Self::Codec(format!("{path}: {msg}")),
        }
    }

    /// A framebuffer write was rejected (rectangle outside the surface or
    /// short source data).
    pub(crate) fn framebuffer(err: anyhow::Error) -> Self {
        Self::Protocol(format!("framebuffer write rejected: {err:#}"))
    }
}

impl From<TryReserveError> for DecodeError {
    fn from(err: TryReserveError) -> Self {
        Self::Resource(format!("buffer allocation failed: {err}"))
    }
}

/// Attach a description of what was being read to a transport error.
pub(crate) trait ReadContext<T> {
    fn read_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> ReadContext<T> for std::io::Result<T> {
    fn read_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|source| DecodeError::Io {
            context: f().into(),
            source,
        })
    }
}

/// Resize `buf` to exactly `len` zeroed bytes, failing with
/// [`DecodeError::Resource`] instead of aborting when memory runs out.
pub(crate) fn resize_buffer(buf: &mut Vec<u8>, len: usize) -> Result<()> {
    if len > buf.len() {
        buf.try_reserve_exact(len - buf.len())?;
    }
    buf.resize(len, 0);
    Ok(())
}
