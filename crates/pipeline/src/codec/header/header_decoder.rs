//! Parses a message head from raw bytes.
//!
//! Requests and responses share one decoder; [`MessageKind`] selects which
//! start line is expected. The decoder also resolves how the body is framed
//! and whether the connection may carry another message afterwards.
//!
//! Header values are sliced out of the frozen head bytes, so no header data
//! is copied after `httparse` has validated it.

use bytes::{Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING, UPGRADE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Version};
use httparse::Status;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{HeadLine, HeaderFragment, MessageKind, ParseError, PayloadSize};

/// A parsed head before it is handed to the parser events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHead {
    pub line: HeadLine,
    pub version: Version,
    pub url: Option<String>,
    pub headers: Vec<HeaderFragment>,
    pub payload_size: PayloadSize,
    pub keep_alive: bool,
    pub upgrade: bool,
}

/// Decoder for message heads implementing the [`Decoder`] trait.
#[derive(Debug, Clone)]
pub struct HeaderDecoder {
    kind: MessageKind,
    max_headers: usize,
    max_header_bytes: usize,
}

impl HeaderDecoder {
    pub fn new(kind: MessageKind, max_headers: usize, max_header_bytes: usize) -> Self {
        Self { kind, max_headers, max_header_bytes }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    fn check_partial(&self, src: &BytesMut) -> Result<Option<ParsedHead>, ParseError> {
        ensure!(src.len() <= self.max_header_bytes, ParseError::too_large_header(src.len(), self.max_header_bytes));
        Ok(None)
    }

    fn map_error(&self, e: httparse::Error) -> ParseError {
        match e {
            httparse::Error::TooManyHeaders => ParseError::too_many_headers(self.max_headers),
            httparse::Error::Version => ParseError::InvalidVersion(None),
            httparse::Error::Status => ParseError::InvalidStatus(None),
            httparse::Error::Token if self.kind == MessageKind::Request => ParseError::InvalidMethod,
            e => ParseError::invalid_header(e),
        }
    }
}

impl Decoder for HeaderDecoder {
    type Item = ParsedHead;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut indices = Vec::new();

        let (line, version, body_offset) = match self.kind {
            MessageKind::Request => {
                let mut headers = vec![httparse::EMPTY_HEADER; self.max_headers];
                let mut req = httparse::Request::new(&mut headers);
                let body_offset = match req.parse(src).map_err(|e| self.map_error(e))? {
                    Status::Complete(body_offset) => body_offset,
                    Status::Partial => return self.check_partial(src),
                };

                let method = req.method.ok_or(ParseError::InvalidMethod)?;
                let method = Method::from_bytes(method.as_bytes()).map_err(|_| ParseError::InvalidMethod)?;
                let path = req.path.ok_or(ParseError::InvalidUri)?.to_string();
                HeaderIndex::record(src, req.headers, &mut indices);
                ((HeadLine::Request { method }, Some(path)), req.version, body_offset)
            }
            MessageKind::Response => {
                let mut headers = vec![httparse::EMPTY_HEADER; self.max_headers];
                let mut res = httparse::Response::new(&mut headers);
                let body_offset = match res.parse(src).map_err(|e| self.map_error(e))? {
                    Status::Complete(body_offset) => body_offset,
                    Status::Partial => return self.check_partial(src),
                };

                let code = res.code.ok_or(ParseError::InvalidStatus(None))?;
                let status = StatusCode::from_u16(code).map_err(|_| ParseError::InvalidStatus(Some(code)))?;
                let reason = res.reason.unwrap_or_default().to_string();
                HeaderIndex::record(src, res.headers, &mut indices);
                ((HeadLine::Response { status, reason }, None), res.version, body_offset)
            }
        };
        let (line, url) = line;

        trace!(head_size = body_offset, headers = indices.len(), "parsed message head");
        ensure!(body_offset <= self.max_header_bytes, ParseError::too_large_header(body_offset, self.max_header_bytes));

        let version = match version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            v => return Err(ParseError::InvalidVersion(v)),
        };

        let head_bytes = src.split_to(body_offset).freeze();
        let headers = HeaderIndex::fragments(&head_bytes, &indices)?;

        let mut lookup = HeaderMap::with_capacity(headers.len());
        for (name, value) in &headers {
            lookup.append(name.clone(), value.clone());
        }

        let payload_size = payload_size(&line, &lookup)?;
        let keep_alive = should_keep_alive(version, &lookup) && !payload_size.is_until_close();
        let upgrade = is_upgrade(&line, &lookup);

        Ok(Some(ParsedHead { line, version, url, headers, payload_size, keep_alive, upgrade }))
    }
}

/// Stores the byte range positions of a header's name and value within the head bytes.
#[derive(Debug, Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

impl HeaderIndex {
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut Vec<HeaderIndex>) {
        let bytes_ptr = bytes.as_ptr() as usize;
        indices.extend(headers.iter().map(|header| {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            HeaderIndex {
                name: (name_start, name_start + header.name.len()),
                value: (value_start, value_start + header.value.len()),
            }
        }));
    }

    fn fragments(head_bytes: &Bytes, indices: &[HeaderIndex]) -> Result<Vec<HeaderFragment>, ParseError> {
        indices
            .iter()
            .map(|index| {
                let name = HeaderName::from_bytes(&head_bytes[index.name.0..index.name.1]).map_err(ParseError::invalid_header)?;
                let value = HeaderValue::from_maybe_shared(head_bytes.slice(index.value.0..index.value.1))
                    .map_err(ParseError::invalid_header)?;
                Ok((name, value))
            })
            .collect()
    }
}

/// Resolves the body framing, refer: <https://www.rfc-editor.org/rfc/rfc9112.html#name-message-body-length>
fn payload_size(line: &HeadLine, headers: &HeaderMap) -> Result<PayloadSize, ParseError> {
    if let HeadLine::Response { status, .. } = line
        && (status.is_informational() || *status == StatusCode::NO_CONTENT || *status == StatusCode::NOT_MODIFIED)
    {
        return Ok(PayloadSize::new_empty());
    }

    let te_header = headers.get(TRANSFER_ENCODING);
    let cl_header = headers.get(CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => match line {
            HeadLine::Request { .. } => Ok(PayloadSize::new_empty()),
            HeadLine::Response { .. } => Ok(PayloadSize::UntilClose),
        },

        (Some(te_value), None) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::new_chunked())
            } else {
                match line {
                    HeadLine::Request { .. } => Err(ParseError::invalid_header("transfer-encoding without final chunked")),
                    HeadLine::Response { .. } => Ok(PayloadSize::UntilClose),
                }
            }
        }

        (None, Some(cl_value)) => {
            let cl_str = cl_value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;

            let length =
                cl_str.trim().parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

            Ok(PayloadSize::new_length(length))
        }

        (Some(_), Some(_)) => Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers")),
    }
}

/// Chunked must be the last transfer coding if present.
fn is_chunked(header_value: &HeaderValue) -> bool {
    header_value
        .as_bytes()
        .rsplit(|b| *b == b',')
        .next()
        .is_some_and(|coding| coding.trim_ascii().eq_ignore_ascii_case(b"chunked"))
}

fn connection_has(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| item.trim().eq_ignore_ascii_case(token))
}

/// HTTP/1.1 connections persist unless closed explicitly, HTTP/1.0 ones only when asked to.
fn should_keep_alive(version: Version, headers: &HeaderMap) -> bool {
    if version == Version::HTTP_11 {
        !connection_has(headers, "close")
    } else {
        connection_has(headers, "keep-alive")
    }
}

fn is_upgrade(line: &HeadLine, headers: &HeaderMap) -> bool {
    match line {
        HeadLine::Request { method } if *method == Method::CONNECT => true,
        HeadLine::Response { status, .. } if *status == StatusCode::SWITCHING_PROTOCOLS => true,
        _ => headers.contains_key(UPGRADE) && connection_has(headers, "upgrade"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn request_decoder() -> HeaderDecoder {
        HeaderDecoder::new(MessageKind::Request, 64, 8 * 1024)
    }

    fn response_decoder() -> HeaderDecoder {
        HeaderDecoder::new(MessageKind::Response, 64, 8 * 1024)
    }

    #[test]
    fn check_is_chunked() {
        assert!(is_chunked(&HeaderValue::from_static("gzip, chunked")));
        assert!(is_chunked(&HeaderValue::from_static("Chunked")));
        assert!(!is_chunked(&HeaderValue::from_static("chunked, gzip")));
        assert!(!is_chunked(&HeaderValue::from_static("gzip")));
    }

    #[test]
    fn leaves_body_in_buffer() {
        let str = indoc! {"
        POST /index.html HTTP/1.1\r
        Host: 127.0.0.1:8080\r
        Content-Length: 3\r
        \r
        123"};

        let mut bytes = BytesMut::from(str);
        let head = request_decoder().decode(&mut bytes).unwrap().unwrap();

        assert_eq!(&bytes[..], b"123");
        assert_eq!(head.payload_size, PayloadSize::Length(3));
        assert_eq!(head.url.as_deref(), Some("/index.html"));
        assert_eq!(head.line, HeadLine::Request { method: Method::POST });
        assert!(head.keep_alive);
    }

    #[test]
    fn from_curl() {
        let str = indoc! {"
        GET /index.html?a=1 HTTP/1.1\r
        Host: 127.0.0.1:8080\r
        User-Agent: curl/7.79.1\r
        Accept: */*\r
        \r
        "};

        let mut buf = BytesMut::from(str);
        let head = request_decoder().decode(&mut buf).unwrap().unwrap();

        assert!(head.payload_size.is_empty());
        assert_eq!(head.version, Version::HTTP_11);
        assert_eq!(head.headers.len(), 3);
        assert_eq!(head.headers[0], (http::header::HOST, HeaderValue::from_static("127.0.0.1:8080")));
        assert_eq!(head.headers[2], (http::header::ACCEPT, HeaderValue::from_static("*/*")));
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_head_waits() {
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\nHost: exa");
        assert!(request_decoder().decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 25);
    }

    #[test]
    fn limits() {
        let mut decoder = HeaderDecoder::new(MessageKind::Request, 2, 64);

        let mut buf = BytesMut::from("GET / HTTP/1.1\r\na: 1\r\nb: 2\r\nc: 3\r\n\r\n");
        assert_eq!(decoder.decode(&mut buf), Err(ParseError::too_many_headers(2)));

        let mut buf = BytesMut::from(format!("GET /{} HTTP/1.1\r\n", "x".repeat(80)).as_str());
        assert!(matches!(decoder.decode(&mut buf), Err(ParseError::TooLargeHeader { .. })));
    }

    #[test]
    fn keep_alive_rules() {
        let mut buf = BytesMut::from("GET / HTTP/1.0\r\n\r\n");
        assert!(!request_decoder().decode(&mut buf).unwrap().unwrap().keep_alive);

        let mut buf = BytesMut::from("GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n");
        assert!(request_decoder().decode(&mut buf).unwrap().unwrap().keep_alive);

        let mut buf = BytesMut::from("GET / HTTP/1.1\r\nConnection: close\r\n\r\n");
        assert!(!request_decoder().decode(&mut buf).unwrap().unwrap().keep_alive);

        let mut buf = BytesMut::from("HTTP/1.1 200 OK\r\n\r\n");
        let head = response_decoder().decode(&mut buf).unwrap().unwrap();
        assert!(head.payload_size.is_until_close());
        assert!(!head.keep_alive);
    }

    #[test]
    fn response_framing() {
        let mut buf = BytesMut::from("HTTP/1.1 204 No Content\r\nContent-Length: 10\r\n\r\n");
        let head = response_decoder().decode(&mut buf).unwrap().unwrap();
        assert!(head.payload_size.is_empty());
        assert_eq!(head.line, HeadLine::Response { status: StatusCode::NO_CONTENT, reason: "No Content".to_string() });

        let mut buf = BytesMut::from("HTTP/1.1 200 Fine\r\nTransfer-Encoding: chunked\r\n\r\n");
        let head = response_decoder().decode(&mut buf).unwrap().unwrap();
        assert!(head.payload_size.is_chunked());
        assert_eq!(head.url, None);

        let mut buf = BytesMut::from("HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n");
        assert!(response_decoder().decode(&mut buf).unwrap().unwrap().upgrade);
    }

    #[test]
    fn rejects_conflicting_framing() {
        let mut buf = BytesMut::from("POST / HTTP/1.1\r\nContent-Length: 1\r\nTransfer-Encoding: chunked\r\n\r\n");
        assert!(matches!(request_decoder().decode(&mut buf), Err(ParseError::InvalidContentLength { .. })));

        let mut buf = BytesMut::from("POST / HTTP/1.1\r\nContent-Length: ten\r\n\r\n");
        assert!(matches!(request_decoder().decode(&mut buf), Err(ParseError::InvalidContentLength { .. })));
    }
}
