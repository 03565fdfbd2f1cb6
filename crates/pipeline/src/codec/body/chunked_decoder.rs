//! Decoder for `Transfer-Encoding: chunked` bodies.
//!
//! The body is a series of `size [; ext] CRLF data CRLF` chunks closed by a
//! zero sized chunk, optional trailer lines and an empty line. The decoder
//! consumes exactly the bytes of the body and leaves whatever follows in the
//! buffer for the next message.

use crate::protocol::{ParseError, PayloadItem};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

/// A decoder for HTTP chunked transfer encoding.
///
/// The decoder walks the body one framing byte at a time and hands chunk data
/// out as soon as it is available, so a chunk split across several reads
/// comes out as several [`PayloadItem::Chunk`]s:
/// - each chunk starts with its size in hexadecimal
/// - followed by optional extensions and CRLF
/// - then the chunk data and CRLF
/// - a zero sized chunk, optional trailers and an empty line end the body
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkedDecoder {
    state: State,
    // bytes left in the current chunk while in `Body`, the size being read otherwise
    size: u64,
    size_digits: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    /// Read the chunk size in hex
    #[default]
    Size,
    /// Whitespace after the size
    SizeLws,
    /// Skip chunk extensions
    Extension,
    /// LF after the size line
    SizeLf,
    /// Chunk data
    Body,
    /// CR after chunk data
    BodyCr,
    /// LF after chunk data
    BodyLf,
    /// Trailer field
    Trailer,
    /// LF after a trailer field
    TrailerLf,
    /// CR of the final empty line, or the start of a trailer
    EndCr,
    /// LF of the final empty line
    EndLf,
    /// The whole body has been read
    End,
}

impl ChunkedDecoder {
    /// Creates a decoder ready to read the size of the first chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminating chunk and trailers have been read.
    pub fn is_finish(&self) -> bool {
        self.state == State::End
    }

    /// Advances the framing state machine by one byte outside chunk data.
    ///
    /// # Arguments
    /// * `state` - the current framing state
    /// * `byte` - the next byte of the body
    ///
    /// # Returns
    /// The next state, or `ParseError::InvalidBody` for bytes the framing
    /// does not allow there.
    fn next_state(&mut self, state: State, byte: u8) -> Result<State, ParseError> {
        let next = match (state, byte) {
            (State::Size, b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F') => {
                let digit = u64::from(hex_value(byte));
                self.size = self
                    .size
                    .checked_mul(16)
                    .and_then(|size| size.checked_add(digit))
                    .ok_or_else(|| ParseError::invalid_body("chunk size overflow"))?;
                self.size_digits = true;
                State::Size
            }
            (State::Size, _) if !self.size_digits => return Err(ParseError::invalid_body("missing chunk size")),
            (State::Size | State::SizeLws, b'\t' | b' ') => State::SizeLws,
            (State::Size | State::SizeLws, b';') => State::Extension,
            (State::Size | State::SizeLws | State::Extension, b'\r') => State::SizeLf,
            (State::Size | State::SizeLws, _) => return Err(ParseError::invalid_body("invalid chunk size line")),

            (State::Extension, b'\n') => return Err(ParseError::invalid_body("chunk extension contains newline")),
            (State::Extension, _) => State::Extension,

            (State::SizeLf, b'\n') => {
                self.size_digits = false;
                if self.size == 0 { State::EndCr } else { State::Body }
            }

            (State::BodyCr, b'\r') => State::BodyLf,
            (State::BodyLf, b'\n') => State::Size,

            (State::EndCr, b'\r') => State::EndLf,
            (State::EndCr | State::Trailer, b'\r') => State::TrailerLf,
            (State::EndCr | State::Trailer, _) => State::Trailer,
            (State::TrailerLf, b'\n') => State::EndCr,
            (State::EndLf, b'\n') => State::End,

            (state, byte) => {
                return Err(ParseError::invalid_body(format!("unexpected byte {byte:#04x} in chunked state {state:?}")));
            }
        };
        Ok(next)
    }
}

fn hex_value(byte: u8) -> u8 {
    match byte {
        b'0'..=b'9' => byte - b'0',
        b'a'..=b'f' => byte - b'a' + 10,
        _ => byte - b'A' + 10,
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    /// Decodes chunked transfer encoded data from the input buffer.
    ///
    /// # Returns
    /// - `Ok(Some(PayloadItem::Chunk(bytes)))` when chunk data is available
    /// - `Ok(Some(PayloadItem::Eof))` once the last chunk and trailers were read
    /// - `Ok(None)` when more data is needed
    /// - `Err(ParseError)` if the chunked encoding is invalid
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::End => {
                    trace!("finished reading chunked data");
                    return Ok(Some(PayloadItem::Eof));
                }

                State::Body => {
                    if src.is_empty() {
                        return Ok(None);
                    }

                    let len = usize::try_from(self.size).map_or(src.len(), |size| size.min(src.len()));
                    self.size -= len as u64;
                    if self.size == 0 {
                        self.state = State::BodyCr;
                    }

                    trace!(len, "read chunked bytes");
                    return Ok(Some(PayloadItem::Chunk(src.split_to(len).freeze())));
                }

                state => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let byte = src.get_u8();
                    self.state = self.next_state(state, byte)?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn decode_all(decoder: &mut ChunkedDecoder, buffer: &mut BytesMut) -> (Vec<u8>, bool) {
        let mut body = Vec::new();
        loop {
            match decoder.decode(buffer).unwrap() {
                Some(PayloadItem::Chunk(bytes)) => body.extend_from_slice(&bytes),
                Some(PayloadItem::Eof) => return (body, true),
                None => return (body, false),
            }
        }
    }

    #[test]
    fn multiple_chunks() {
        let mut buffer = BytesMut::from(&b"5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::from_static(b"hello"));

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::from_static(b", world"));

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert!(decoder.is_finish());
    }

    #[test]
    fn extensions_and_trailers() {
        let mut buffer = BytesMut::from(&b"5;name=value\r\nhello\r\n0\r\nExpires: never\r\nX-Sum: 1\r\n\r\nGET /"[..]);
        let mut decoder = ChunkedDecoder::new();

        let (body, eof) = decode_all(&mut decoder, &mut buffer);
        assert_eq!(body, b"hello");
        assert!(eof);
        // the next pipelined message stays in the buffer
        assert_eq!(&buffer[..], b"GET /");
    }

    #[test]
    fn any_fragment_split() {
        let wire: &[u8] = b"A\r\n0123456789\r\n3 ;x\r\nabc\r\n0\r\n\r\n";
        for split in 1..wire.len() {
            let mut decoder = ChunkedDecoder::new();
            let mut buffer = BytesMut::from(&wire[..split]);
            let (mut body, eof) = decode_all(&mut decoder, &mut buffer);
            assert!(!eof, "eof too early at split {split}");

            buffer.extend_from_slice(&wire[split..]);
            let (rest, eof) = decode_all(&mut decoder, &mut buffer);
            body.extend_from_slice(&rest);

            assert!(eof, "no eof at split {split}");
            assert_eq!(body, b"0123456789abc", "split {split}");
            assert!(buffer.is_empty());
        }
    }

    #[test]
    fn rejects_malformed() {
        for wire in [&b"xyz\r\n"[..], b"\r\n", b"5\r\nhelloBad", b"5;ext\n", b"ffffffffffffffffff\r\n"] {
            let mut decoder = ChunkedDecoder::new();
            let mut buffer = BytesMut::from(wire);
            let result = loop {
                match decoder.decode(&mut buffer) {
                    Ok(Some(PayloadItem::Chunk(_))) => continue,
                    other => break other,
                }
            };
            assert!(result.is_err(), "accepted {wire:?}");
        }
    }

    #[test]
    fn zero_size_chunk() {
        let mut buffer = BytesMut::from(&b"0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }
}
