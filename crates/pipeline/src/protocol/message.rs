use bytes::{Buf, Bytes};

/// Which side of the exchange a connection parses.
///
/// A server parses requests and writes responses, a client does the opposite.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
}

/// The message handler's verdict on whether the body of a freshly parsed head
/// should be delivered.
///
/// A response to a `HEAD` request declares a length but carries no body, so the
/// client answers [`BodyDecision::SkipBody`] and the tokenizer stops expecting one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum BodyDecision {
    #[default]
    Deliver,
    SkipBody,
}

impl BodyDecision {
    #[inline]
    pub fn is_skip(self) -> bool {
        matches!(self, BodyDecision::SkipBody)
    }
}

impl From<bool> for BodyDecision {
    fn from(skip_body: bool) -> Self {
        if skip_body { BodyDecision::SkipBody } else { BodyDecision::Deliver }
    }
}

/// Represents an item in the HTTP message payload stream.
///
/// This enum is used by the payload decoders to produce either data chunks
/// or signal the end of the payload stream (EOF).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data
    Chunk(Data),
    /// Marks the end of the payload stream
    Eof,
}

/// Represents the size information of an HTTP payload.
///
/// - Known length: process exact number of bytes
/// - Chunked: process using chunked transfer encoding
/// - UntilClose: the body runs until the peer closes (responses without framing)
/// - Empty: no payload to process
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload using chunked transfer encoding
    Chunked,
    /// Payload delimited by the end of the connection
    UntilClose,
    /// Empty payload (no body)
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn new_length(length: u64) -> Self {
        if length == 0 { PayloadSize::Empty } else { PayloadSize::Length(length) }
    }

    #[inline]
    pub fn new_chunked() -> Self {
        PayloadSize::Chunked
    }

    #[inline]
    pub fn new_empty() -> Self {
        PayloadSize::Empty
    }

    /// Returns true if the payload uses chunked transfer encoding
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    /// Returns true if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    /// Returns true if only the end of the connection terminates the payload
    #[inline]
    pub fn is_until_close(&self) -> bool {
        matches!(self, PayloadSize::UntilClose)
    }
}

impl<D: Buf> PayloadItem<D> {
    /// Returns true if this item represents the end of the payload stream
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    /// Returns true if this item contains chunk data
    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    /// Returns a reference to the contained bytes if this is a Chunk
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    /// Consumes the PayloadItem and returns the contained bytes if this is a Chunk
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

impl From<Bytes> for PayloadItem {
    fn from(bytes: Bytes) -> Self {
        PayloadItem::Chunk(bytes)
    }
}
