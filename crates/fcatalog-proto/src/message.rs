//! Message layer: a `uint32` tag followed by the tag's declared primitives.
//!
//! The tag alphabet and body shapes are the protocol's concern, not the
//! codec's — this module decodes whichever shape a tag names, including
//! shapes a particular session direction shouldn't be receiving. Enforcing
//! the allowed-direction-per-tag rule is left to the session layer.

use bytes::{Buf, BufMut};

use crate::{
    error::{CodecError, Result},
    primitives::{decode_blob, decode_string, decode_uint32, encode_blob, encode_string,
        encode_uint32},
};

/// Wire tag for [`Message::ChooseDb`].
pub const TAG_CHOOSE_DB: u32 = 0;
/// Wire tag for [`Message::AddFunction`].
pub const TAG_ADD_FUNCTION: u32 = 1;
/// Wire tag for [`Message::RequestSimilars`].
pub const TAG_REQUEST_SIMILARS: u32 = 2;
/// Wire tag for [`Message::ResponseSimilars`].
pub const TAG_RESPONSE_SIMILARS: u32 = 3;

/// One entry of a [`Message::ResponseSimilars`] body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimilarEntry {
    /// The stored record's name.
    pub name: String,
    /// The stored record's comment.
    pub comment: String,
    /// Number of signature coordinates that agreed with the query.
    pub grade: u32,
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Client selects (opening or creating) a catalog by name.
    ChooseDb {
        /// Requested catalog name, not yet validated against the allowed alphabet.
        db_name: String,
    },
    /// Client adds (or replaces) a record in the chosen catalog.
    AddFunction {
        /// Human name for the record.
        func_name: String,
        /// Free-form comment for the record.
        func_comment: String,
        /// The body bytes to sign and index.
        func_data: Vec<u8>,
    },
    /// Client asks for the top-k most similar records to a body.
    RequestSimilars {
        /// The query body.
        func_data: Vec<u8>,
        /// Maximum number of results requested.
        num_similars: u32,
    },
    /// Server's answer to a [`Message::RequestSimilars`].
    ResponseSimilars {
        /// Ordered (most similar first) results, truncated to the request's `k`.
        similars: Vec<SimilarEntry>,
    },
}

impl Message {
    /// This message's wire tag.
    #[must_use]
    pub fn tag(&self) -> u32 {
        match self {
            Self::ChooseDb { .. } => TAG_CHOOSE_DB,
            Self::AddFunction { .. } => TAG_ADD_FUNCTION,
            Self::RequestSimilars { .. } => TAG_REQUEST_SIMILARS,
            Self::ResponseSimilars { .. } => TAG_RESPONSE_SIMILARS,
        }
    }

    /// Encode this message's tag and body into `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        encode_uint32(dst, self.tag());
        match self {
            Self::ChooseDb { db_name } => encode_string(dst, db_name),
            Self::AddFunction { func_name, func_comment, func_data } => {
                encode_string(dst, func_name);
                encode_string(dst, func_comment);
                encode_blob(dst, func_data);
            },
            Self::RequestSimilars { func_data, num_similars } => {
                encode_blob(dst, func_data);
                encode_uint32(dst, *num_similars);
            },
            Self::ResponseSimilars { similars } => {
                #[allow(clippy::expect_used)]
                let count = u32::try_from(similars.len())
                    .expect("invariant: similars is truncated to a client-requested k");
                encode_uint32(dst, count);
                for entry in similars {
                    encode_string(dst, &entry.name);
                    encode_string(dst, &entry.comment);
                    encode_uint32(dst, entry.grade);
                }
            },
        }
    }

    /// Decode a tag and its body from the front of `src`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownTag`] for a tag outside `0..=3`, or any
    /// primitive decode error for a truncated or malformed body.
    pub fn decode(src: &mut impl Buf) -> Result<Self> {
        let tag = decode_uint32(src)?;
        match tag {
            TAG_CHOOSE_DB => Ok(Self::ChooseDb { db_name: decode_string(src)? }),
            TAG_ADD_FUNCTION => {
                let func_name = decode_string(src)?;
                let func_comment = decode_string(src)?;
                let func_data = decode_blob(src)?;
                Ok(Self::AddFunction { func_name, func_comment, func_data })
            },
            TAG_REQUEST_SIMILARS => {
                let func_data = decode_blob(src)?;
                let num_similars = decode_uint32(src)?;
                Ok(Self::RequestSimilars { func_data, num_similars })
            },
            TAG_RESPONSE_SIMILARS => {
                let count = decode_uint32(src)?;
                let mut similars = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let name = decode_string(src)?;
                    let comment = decode_string(src)?;
                    let grade = decode_uint32(src)?;
                    similars.push(SimilarEntry { name, comment, grade });
                }
                Ok(Self::ResponseSimilars { similars })
            },
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    fn round_trip(msg: &Message) -> Message {
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);
        let mut src = buf.freeze();
        Message::decode(&mut src).expect("decode should succeed")
    }

    #[test]
    fn choose_db_round_trip() {
        let msg = Message::ChooseDb { db_name: "my_db".to_string() };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn add_function_round_trip() {
        let msg = Message::AddFunction {
            func_name: "foo".to_string(),
            func_comment: "does a thing".to_string(),
            func_data: vec![1, 2, 3, 4, 5],
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn request_similars_round_trip() {
        let msg = Message::RequestSimilars { func_data: vec![0xaa; 16], num_similars: 5 };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn response_similars_round_trip() {
        let msg = Message::ResponseSimilars {
            similars: vec![
                SimilarEntry { name: "a".to_string(), comment: "c1".to_string(), grade: 16 },
                SimilarEntry { name: "b".to_string(), comment: "c2".to_string(), grade: 3 },
            ],
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn response_similars_empty_round_trip() {
        let msg = Message::ResponseSimilars { similars: vec![] };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let mut buf = BytesMut::new();
        encode_uint32(&mut buf, 99);
        let mut src = buf.freeze();
        assert!(matches!(Message::decode(&mut src), Err(CodecError::UnknownTag(99))));
    }

    #[test]
    fn truncated_body_is_an_error() {
        let mut buf = BytesMut::new();
        encode_uint32(&mut buf, TAG_CHOOSE_DB);
        encode_uint32(&mut buf, 10); // claims a 10-byte string, supplies none
        let mut src = buf.freeze();
        assert!(Message::decode(&mut src).is_err());
    }
}
