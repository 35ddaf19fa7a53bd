//! Primitive value encoding.
//!
//! All multi-byte integers are little-endian. `string` and `blob` are a
//! `uint32` byte-length followed by that many bytes; `string` additionally
//! requires the bytes to be strict UTF-8.

use bytes::{Buf, BufMut};

use crate::error::{CodecError, Result};

/// Encode a `uint32` (4 little-endian bytes).
pub fn encode_uint32(dst: &mut impl BufMut, value: u32) {
    dst.put_u32_le(value);
}

/// Decode a `uint32` from the front of `src`.
pub fn decode_uint32(src: &mut impl Buf) -> Result<u32> {
    if src.remaining() < 4 {
        return Err(CodecError::Truncated("uint32"));
    }
    Ok(src.get_u32_le())
}

/// Encode a `blob` (length-prefixed raw bytes).
pub fn encode_blob(dst: &mut impl BufMut, bytes: &[u8]) {
    #[allow(clippy::expect_used)]
    let len = u32::try_from(bytes.len())
        .expect("invariant: blobs are bounded by max_frame_length, well under u32::MAX");
    encode_uint32(dst, len);
    dst.put_slice(bytes);
}

/// Decode a `blob` from the front of `src`.
pub fn decode_blob(src: &mut impl Buf) -> Result<Vec<u8>> {
    let declared = decode_uint32(src)?;
    let len = declared as usize;
    if src.remaining() < len {
        return Err(CodecError::LengthOverrun { declared, remaining: src.remaining() });
    }
    let mut out = vec![0u8; len];
    src.copy_to_slice(&mut out);
    Ok(out)
}

/// Encode a `string` (length-prefixed UTF-8 bytes).
pub fn encode_string(dst: &mut impl BufMut, value: &str) {
    encode_blob(dst, value.as_bytes());
}

/// Decode a `string` from the front of `src`.
///
/// # Errors
///
/// Returns [`CodecError::InvalidUtf8`] if the decoded bytes are not strict
/// UTF-8.
pub fn decode_string(src: &mut impl Buf) -> Result<String> {
    let bytes = decode_blob(src)?;
    String::from_utf8(bytes).map_err(CodecError::from)
}
