//! Decoder for inbound message bodies.
//!
//! Selects the framing strategy from the resolved [`PayloadSize`]:
//! - Content-Length based payloads
//! - Chunked transfer encoding
//! - Bodies that run until the peer closes (responses only)
//! - Messages with no body

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::protocol::{ParseError, PayloadItem, PayloadSize};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Decodes one inbound body with the framing its head declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// Decode payload with a fixed content length
    Length(LengthDecoder),

    /// Decode payload using chunked transfer encoding
    Chunked(ChunkedDecoder),

    /// Everything up to the end of the connection
    UntilClose,

    /// Handle messages with no body
    NoBody,
}

impl PayloadDecoder {
    /// Creates a decoder for a message without a body.
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    /// Creates a decoder for a chunked body.
    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    /// Creates a decoder for a body of exactly `size` bytes.
    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    /// Creates a decoder for a body that ends with the connection.
    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::NoBody)
    }

    pub fn is_until_close(&self) -> bool {
        matches!(self.kind, Kind::UntilClose)
    }

    /// Called when the peer closed its side. Only a read-until-close body
    /// ends cleanly there.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedEof` when a length or chunked body was cut short.
    pub fn finish(&self) -> Result<PayloadItem, ParseError> {
        match &self.kind {
            Kind::UntilClose | Kind::NoBody => Ok(PayloadItem::Eof),
            Kind::Length(decoder) if decoder.remaining() == 0 => Ok(PayloadItem::Eof),
            Kind::Length(decoder) => {
                Err(ParseError::unexpected_eof(format!("connection closed with {} body bytes missing", decoder.remaining())))
            }
            Kind::Chunked(decoder) if decoder.is_finish() => Ok(PayloadItem::Eof),
            Kind::Chunked(_) => Err(ParseError::unexpected_eof("connection closed inside chunked body")),
        }
    }
}

impl From<PayloadSize> for PayloadDecoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(length) => PayloadDecoder::fix_length(length),
            PayloadSize::Chunked => PayloadDecoder::chunked(),
            PayloadSize::UntilClose => PayloadDecoder::until_close(),
            PayloadSize::Empty => PayloadDecoder::empty(),
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(length_decoder) => length_decoder.decode(src),
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(src),
            Kind::UntilClose if src.is_empty() => Ok(None),
            Kind::UntilClose => Ok(Some(PayloadItem::Chunk(src.split().freeze()))),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }
}
