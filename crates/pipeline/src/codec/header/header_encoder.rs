//! Serializes an outbound head into the raw header block.
//!
//! The block is the start line, one `name: value` line per header and the
//! empty line that ends the head. Framing headers are written as the caller
//! set them, the body encoder is chosen from them afterwards.

use crate::protocol::{HeadBuilder, SendError, StartLine};

use bytes::{BufMut, BytesMut};

use http::Version;
use std::io;
use std::io::{ErrorKind, Write};
use tokio_util::codec::Encoder;
use tracing::error;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 1024;

/// Encoder for outbound heads implementing the [`Encoder`] trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderEncoder;

impl Encoder<&HeadBuilder> for HeaderEncoder {
    type Error = SendError;

    /// Encodes the start line and headers of `head` into `dst`.
    ///
    /// # Errors
    ///
    /// Returns error if the head uses an HTTP version other than 1.0 or 1.1.
    fn encode(&mut self, head: &HeadBuilder, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let version = match head.version() {
            Version::HTTP_10 => "HTTP/1.0",
            Version::HTTP_11 => "HTTP/1.1",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(io::Error::from(ErrorKind::Unsupported).into());
            }
        };

        dst.reserve(INIT_HEADER_SIZE);
        let start_line = head.start_line();
        match start_line {
            StartLine::Request { method, path } => {
                write!(FastWrite(dst), "{} {} {}\r\n", method.as_str(), path, version)?;
            }
            StartLine::Status { status, .. } => {
                let reason = start_line.reason().unwrap_or("unknown");
                write!(FastWrite(dst), "{} {} {}\r\n", version, status.as_str(), reason)?;
            }
        }

        for (header_name, header_value) in head.headers() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Fast writer implementation for writing to BytesMut.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};
    use indoc::indoc;

    #[test]
    fn encodes_status_line_and_headers() {
        let mut head = HeadBuilder::new(StartLine::Status { status: StatusCode::NOT_FOUND, reason: None });
        head.headers_mut().insert(http::header::CONTENT_LENGTH, http::HeaderValue::from_static("5"));
        head.headers_mut().insert(http::header::CONTENT_TYPE, "text/plain".parse().unwrap());

        let mut dst = BytesMut::new();
        HeaderEncoder.encode(&head, &mut dst).unwrap();

        let expected = indoc! {"
        HTTP/1.1 404 Not Found\r
        content-length: 5\r
        content-type: text/plain\r
        \r
        "};
        assert_eq!(&dst[..], expected.as_bytes());
    }

    #[test]
    fn encodes_request_line_with_custom_reason_free_status() {
        let mut head = HeadBuilder::new(StartLine::Request { method: Method::PUT, path: "/items/7?force=1".to_string() });
        head.set_version(Version::HTTP_10);

        let mut dst = BytesMut::new();
        HeaderEncoder.encode(&head, &mut dst).unwrap();
        assert_eq!(&dst[..], b"PUT /items/7?force=1 HTTP/1.0\r\n\r\n");
    }

    #[test]
    fn rejects_http2() {
        let mut head = HeadBuilder::default();
        head.set_version(Version::HTTP_2);

        let mut dst = BytesMut::new();
        assert!(HeaderEncoder.encode(&head, &mut dst).is_err());
        assert!(dst.is_empty());
    }
}
