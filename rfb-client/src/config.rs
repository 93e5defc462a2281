//! Decoder configuration.
//!
//! Values come from defaults, then an optional TOML document, then the
//! environment:
//!
//! ```toml
//! # Number of Tight decode slots (1..=8). Omit to use the CPU count.
//! decode_threads = 4
//! ```

use crate::errors::RfbClientError;
use rfb_encodings::resolve_thread_count;
use serde::{Deserialize, Serialize};

/// Environment variable overriding [`DecoderConfig::decode_threads`].
pub const DECODE_THREADS_ENV: &str = "RFB_DECODE_THREADS";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecoderConfig {
    /// Requested Tight decode slot count. `None` uses the available
    /// parallelism.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decode_threads: Option<usize>,
}

impl DecoderConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, RfbClientError> {
        let config: Self = toml::from_str(source)
            .map_err(|e| RfbClientError::Config(format!("invalid decoder config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `RFB_DECODE_THREADS` from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_thread_override(std::env::var(DECODE_THREADS_ENV).ok().as_deref())
    }

    /// Apply a raw `RFB_DECODE_THREADS` value. Unusable values are logged and
    /// ignored.
    #[must_use]
    pub fn with_thread_override(mut self, value: Option<&str>) -> Self {
        let Some(value) = value else {
            return self;
        };
        match value.trim().parse::<usize>() {
            Ok(n) if n > 0 => self.decode_threads = Some(n),
            _ => tracing::warn!(
                "Ignoring {}={:?}: expected a positive thread count",
                DECODE_THREADS_ENV,
                value
            ),
        }
        self
    }

    pub fn validate(&self) -> Result<(), RfbClientError> {
        if self.decode_threads == Some(0) {
            return Err(RfbClientError::Config(
                "decode_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Slot count the Tight decoder will actually use on this machine.
    #[must_use]
    pub fn effective_threads(&self) -> usize {
        resolve_thread_count(self.decode_threads)
    }
}
