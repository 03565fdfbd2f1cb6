//! Message head types shared by the tokenizer, the parser adapter and the
//! outbound side.

use http::{HeaderName, HeaderValue, Method, StatusCode, Version};

/// One header name/value pair as produced by the tokenizer.
pub type HeaderFragment = (HeaderName, HeaderValue);

/// The first line of a parsed head, minus the request target which travels
/// separately as the url fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadLine {
    Request { method: Method },
    Response { status: StatusCode, reason: String },
}

/// Everything the tokenizer resolved when a head is complete.
///
/// `headers` and `url` only carry what was not already flushed through
/// `on_headers`; when the head was large enough to be flushed in batches both
/// are empty.
#[derive(Debug, Clone)]
pub struct HeadInfo {
    pub line: HeadLine,
    pub version: Version,
    pub headers: Vec<HeaderFragment>,
    pub url: Option<String>,
    pub keep_alive: bool,
    pub upgrade: bool,
}

impl HeadInfo {
    pub fn status(&self) -> Option<StatusCode> {
        match &self.line {
            HeadLine::Request { .. } => None,
            HeadLine::Response { status, .. } => Some(*status),
        }
    }
}

/// Role specific fields of a received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingRole {
    Request { method: Method, url: String },
    Response { status: StatusCode, reason: String },
}

impl IncomingRole {
    pub(crate) fn from_line(line: HeadLine, url: String) -> Self {
        match line {
            HeadLine::Request { method } => IncomingRole::Request { method, url },
            HeadLine::Response { status, reason } => IncomingRole::Response { status, reason },
        }
    }
}

/// The first line of a message to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request { method: Method, path: String },
    Status { status: StatusCode, reason: Option<String> },
}

impl StartLine {
    /// Whether a message with this start line may carry a body at all.
    ///
    /// Informational, `204 No Content` and `304 Not Modified` responses never do.
    pub fn permits_body(&self) -> bool {
        match self {
            StartLine::Request { .. } => true,
            StartLine::Status { status, .. } => {
                !(status.is_informational() || *status == StatusCode::NO_CONTENT || *status == StatusCode::NOT_MODIFIED)
            }
        }
    }

    /// Whether a body of unknown length goes out chunked by default.
    ///
    /// Requests whose methods rarely carry a body (`GET`, `HEAD`, `DELETE`,
    /// `OPTIONS`, `TRACE`, `CONNECT`) are sent without implicit framing.
    pub fn chunked_by_default(&self) -> bool {
        match self {
            StartLine::Request { method, .. } => {
                ![Method::GET, Method::HEAD, Method::DELETE, Method::OPTIONS, Method::TRACE, Method::CONNECT]
                    .contains(method)
            }
            StartLine::Status { .. } => true,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, StartLine::Request { .. })
    }

    /// Reason phrase written on a status line, `unknown` for unregistered codes.
    pub fn reason(&self) -> Option<&str> {
        match self {
            StartLine::Request { .. } => None,
            StartLine::Status { reason: Some(reason), .. } => Some(reason),
            StartLine::Status { status, reason: None } => Some(status.canonical_reason().unwrap_or("unknown")),
        }
    }
}

impl Default for StartLine {
    fn default() -> Self {
        StartLine::Status { status: StatusCode::OK, reason: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodyless_statuses() {
        let line = |code: u16| StartLine::Status { status: StatusCode::from_u16(code).unwrap(), reason: None };
        assert!(!line(100).permits_body());
        assert!(!line(204).permits_body());
        assert!(!line(304).permits_body());
        assert!(line(200).permits_body());
        assert!(line(404).permits_body());
    }

    #[test]
    fn implicit_chunking_by_method() {
        let request = |method: Method| StartLine::Request { method, path: "/".to_string() };
        assert!(request(Method::POST).chunked_by_default());
        assert!(request(Method::PUT).chunked_by_default());
        assert!(!request(Method::GET).chunked_by_default());
        assert!(!request(Method::HEAD).chunked_by_default());
        assert!(StartLine::default().chunked_by_default());
    }

    #[test]
    fn reason_defaults() {
        let line = StartLine::Status { status: StatusCode::NOT_FOUND, reason: None };
        assert_eq!(line.reason(), Some("Not Found"));

        let line = StartLine::Status { status: StatusCode::from_u16(599).unwrap(), reason: None };
        assert_eq!(line.reason(), Some("unknown"));

        let line = StartLine::Status { status: StatusCode::OK, reason: Some("Fine".to_string()) };
        assert_eq!(line.reason(), Some("Fine"));
    }
}
