//! Wire protocol error types.

use thiserror::Error;

/// Errors that can occur while encoding, decoding or transporting frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// The frame is malformed.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The frame exceeds size limits.
    #[error("frame too large: {size} bytes (max {max})")]
    TooLarge {
        /// The actual size.
        size: usize,
        /// The maximum allowed size.
        max: usize,
    },

    /// Invalid magic bytes.
    #[error("invalid magic bytes")]
    InvalidMagic,

    /// The version string could not be parsed.
    #[error("invalid version string: {0:?}")]
    InvalidVersion(String),

    /// JSON body (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The underlying stream failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
