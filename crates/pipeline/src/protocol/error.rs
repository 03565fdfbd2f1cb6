use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("parse error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("send error: {source}")]
    Send {
        #[from]
        source: SendError,
    },

    #[error("usage error: {source}")]
    Usage {
        #[from]
        source: UsageError,
    },

    #[error("transport error: {source}")]
    Transport {
        #[from]
        source: TransportError,
    },
}

/// Malformed or unacceptable wire bytes.
///
/// `Clone` so the same failure can be handed to the in-flight message and
/// returned to whoever fed the bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid http status: {0:?}")]
    InvalidStatus(Option<u16>),

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("unexpected eof: {reason}")]
    UnexpectedEof { reason: String },

    #[error("parser already failed, input ignored")]
    Abandoned,

    #[error("io error ({kind:?}): {reason}")]
    Io { kind: io::ErrorKind, reason: String },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn unexpected_eof<S: ToString>(str: S) -> Self {
        Self::UnexpectedEof { reason: str.to_string() }
    }
}

// required by `tokio_util::codec::Decoder`
impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        Self::Io { kind: e.kind(), reason: e.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("body ended {remaining} bytes short of its content-length")]
    IncompleteBody { remaining: u64 },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn incomplete_body(remaining: u64) -> Self {
        Self::IncompleteBody { remaining }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Programming errors reported synchronously to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("invalid header name: {name:?}")]
    InvalidHeaderName { name: String },

    #[error("invalid value for header {name:?}")]
    InvalidHeaderValue { name: String },

    #[error("headers already sealed, can't modify {name:?}")]
    HeadersSealed { name: String },
}

impl UsageError {
    pub fn invalid_header_name<S: ToString>(name: S) -> Self {
        Self::InvalidHeaderName { name: name.to_string() }
    }

    pub fn invalid_header_value<S: ToString>(name: S) -> Self {
        Self::InvalidHeaderValue { name: name.to_string() }
    }

    pub fn headers_sealed<S: ToString>(name: S) -> Self {
        Self::HeadersSealed { name: name.to_string() }
    }
}

/// A failure of the underlying connection, shared by both directions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {reason}")]
pub struct TransportError {
    kind: io::ErrorKind,
    reason: String,
}

impl TransportError {
    pub fn new<S: ToString>(kind: io::ErrorKind, reason: S) -> Self {
        Self { kind, reason: reason.to_string() }
    }

    pub fn closed() -> Self {
        Self::new(io::ErrorKind::ConnectionAborted, "connection closed before message complete")
    }

    pub fn timed_out() -> Self {
        Self::new(io::ErrorKind::TimedOut, "connection timed out")
    }

    pub fn kind(&self) -> io::ErrorKind {
        self.kind
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<&io::Error> for TransportError {
    fn from(e: &io::Error) -> Self {
        Self::new(e.kind(), e)
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        Self::from(&e)
    }
}
