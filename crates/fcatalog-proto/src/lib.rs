//! Wire codec for the fcatalog similarity protocol.
//!
//! Three layers, outside in: [`frame`] (length-prefixed byte frames),
//! [`primitives`] (`uint32`/`string`/`blob`), and [`message`] (the four
//! typed message shapes built from those primitives). The codec is
//! protocol-agnostic about which tags a given session direction may send or
//! receive — that rule belongs to the session layer, not here.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod frame;
pub mod message;
pub mod primitives;

pub use error::{CodecError, Result};
pub use frame::{FrameIo, DEFAULT_MAX_FRAME_LENGTH};
pub use message::{Message, SimilarEntry};
