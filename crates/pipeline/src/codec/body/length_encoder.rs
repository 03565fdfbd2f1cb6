//! Encoder for bodies framed by a `Content-Length` header.
//!
//! The declared length is a promise to the peer: bytes past it would be read
//! as the start of the next message, and a body that ends early leaves the
//! peer waiting for bytes that never come.

use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

/// Passes body bytes through up to the declared `Content-Length`.
///
/// Writes past the declared length are truncated with a warning. Reaching
/// [`PayloadItem::Eof`] before the declared length is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    length: u64,
}

impl LengthEncoder {
    /// Creates an encoder that expects exactly `length` body bytes.
    pub fn new(length: u64) -> Self {
        Self { length }
    }

    /// Whether every declared byte has been encoded.
    pub fn is_finish(&self) -> bool {
        self.length == 0
    }

    /// Declared bytes not encoded yet.
    pub fn remaining(&self) -> u64 {
        self.length
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    /// Encodes one body item.
    ///
    /// # Arguments
    /// * `item` - a body chunk, or the end of the body
    /// * `dst` - the buffer receiving the encoded bytes
    ///
    /// # Returns
    /// - `Ok(())` when the chunk fitted, was truncated, or the body ended on time
    /// - `Err(SendError::IncompleteBody)` when the body ended short of the declared length
    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) => {
                if !bytes.has_remaining() {
                    return Ok(());
                }

                let remaining = bytes.remaining() as u64;
                if remaining > self.length {
                    warn!(declared_left = self.length, chunk_len = remaining, "body exceeds content-length, truncating");
                }

                let take = remaining.min(self.length);
                dst.put(bytes.take(usize::try_from(take).unwrap_or(usize::MAX)));
                self.length -= take;
                Ok(())
            }
            PayloadItem::Eof if self.length > 0 => Err(SendError::incomplete_body(self.length)),
            PayloadItem::Eof => Ok(()),
        }
    }
}
