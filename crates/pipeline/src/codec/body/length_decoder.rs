//! Decoder for bodies delimited by `Content-Length`.

use crate::protocol::{ParseError, PayloadItem};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Hands out body bytes until the declared length has been read.
///
/// Bytes past the declared length stay in the buffer; they belong to the
/// next pipelined message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    /// bytes still expected
    length: u64,
}

impl LengthDecoder {
    /// Creates a decoder expecting exactly `length` body bytes.
    pub fn new(length: u64) -> Self {
        Self { length }
    }

    /// Body bytes not received yet.
    pub fn remaining(&self) -> u64 {
        self.length
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    /// Decodes the next part of the body.
    ///
    /// # Returns
    /// - `Ok(Some(PayloadItem::Chunk(bytes)))` with at most the remaining length
    /// - `Ok(Some(PayloadItem::Eof))` once the whole body has been read
    /// - `Ok(None)` when more data is needed
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.length == 0 {
            return Ok(Some(PayloadItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let len = usize::try_from(self.length).map_or(src.len(), |length| length.min(src.len()));
        let bytes = src.split_to(len).freeze();

        self.length -= bytes.len() as u64;
        Ok(Some(PayloadItem::Chunk(bytes)))
    }
}
