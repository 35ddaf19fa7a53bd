//! Codec error types.

use thiserror::Error;

/// Errors arising from frame or primitive (de)serialization.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A declared value length overruns what remains in the buffer.
    #[error("declared length {declared} overruns the remaining {remaining} bytes")]
    LengthOverrun {
        /// The length the primitive claimed.
        declared: u32,
        /// The bytes actually left to read.
        remaining: usize,
    },

    /// Fewer bytes were available than a fixed-width primitive requires.
    #[error("buffer too short to contain a {0}")]
    Truncated(&'static str),

    /// A `string` primitive's bytes were not valid UTF-8.
    #[error("invalid UTF-8 in string primitive")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A message tag did not match any known message shape.
    #[error("unknown message tag {0}")]
    UnknownTag(u32),

    /// Underlying I/O failure while reading or writing a frame.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, CodecError>;
