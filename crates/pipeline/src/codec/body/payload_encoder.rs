//! Body framing for outbound messages.
//!
//! A [`PayloadEncoder`] is chosen once, when the head of an outbound message is
//! sealed, and frames every body chunk written after that.

use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::LengthEncoder;
use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BufMut, BytesMut};

use http::{HeaderMap, header};
use tokio_util::codec::Encoder;

/// Frames outbound body bytes according to the sealed head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// content-length payload
    Length(LengthEncoder),

    /// transfer-encoding chunked payload
    Chunked(ChunkedEncoder),

    /// no framing header, bytes go out as written
    Identity,

    /// the message must not carry a body
    NoBody,
}

impl PayloadEncoder {
    /// Creates an encoder that drops every body byte.
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    /// Creates an encoder for `Transfer-Encoding: chunked`.
    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedEncoder::new()) }
    }

    /// Creates an encoder for a body of exactly `size` bytes.
    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthEncoder::new(size)) }
    }

    /// Creates an encoder that writes bytes unframed. Only correct when the
    /// end of the body is marked some other way, e.g. by closing the connection.
    pub fn identity() -> Self {
        Self { kind: Kind::Identity }
    }

    /// Picks the framing declared by `headers`.
    ///
    /// # Arguments
    /// * `headers` - the headers of the sealed head
    ///
    /// # Returns
    /// - a chunked encoder when the last transfer coding is `chunked`
    /// - a fixed length encoder for a valid `Content-Length`
    /// - an identity encoder otherwise
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let chunked = headers
            .get_all(header::TRANSFER_ENCODING)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .next_back()
            .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"));
        if chunked {
            return Self::chunked();
        }

        headers
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map_or_else(Self::identity, Self::fix_length)
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::NoBody)
    }

    pub fn is_fix_length(&self) -> bool {
        matches!(self.kind, Kind::Length(_))
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.kind, Kind::Identity)
    }

    /// Whether the body is complete from the peer's point of view. Never true
    /// for identity bodies, which end with the connection.
    pub fn is_finish(&self) -> bool {
        match &self.kind {
            Kind::Length(encoder) => encoder.is_finish(),
            Kind::Chunked(encoder) => encoder.is_finish(),
            Kind::Identity => false,
            Kind::NoBody => true,
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &mut self.kind {
            Kind::Length(encoder) => encoder.encode(item, dst),
            Kind::Chunked(encoder) => encoder.encode(item, dst),
            Kind::Identity => {
                if let PayloadItem::Chunk(bytes) = item {
                    dst.put(bytes);
                }
                Ok(())
            }
            Kind::NoBody => Ok(()),
        }
    }
}
