use std::time::Duration;

use bytes::Bytes;
use http::header::{AsHeaderName, CONNECTION};
use http::{HeaderName, HeaderValue, Method, StatusCode, Version};
use tracing::trace;

use crate::connection::Transport;
use crate::protocol::{HeaderFragment, HttpError, IncomingMessage, OutgoingMessage, StartLine, UsageError};

/// The answer to one received request.
///
/// Starts as `200` with the canonical reason phrase. The status line is fixed
/// by [`ServerResponse::write_head`] or implicitly by the first write. A
/// response to a request that is not kept alive carries `Connection: close`
/// and ends the transport once it has been handed over completely. An HTTP/1.0
/// peer never gets an implicitly chunked body; a body of unknown length closes
/// the connection instead.
#[derive(Debug)]
pub struct ServerResponse<T> {
    message: OutgoingMessage<T>,
    keep_alive: bool,
}

impl<T> ServerResponse<T>
where
    T: Transport + Clone + Send + 'static,
{
    pub fn new(request: &IncomingMessage, transport: Option<T>) -> Self {
        let mut message = OutgoingMessage::new(StartLine::default());
        if request.method() == Some(&Method::HEAD) {
            message.suppress_body();
        }

        if request.version() < Version::HTTP_11 {
            message.disallow_chunked();
        }

        let keep_alive = request.keep_alive();
        if !keep_alive && let Some(builder) = message.head_builder_mut() {
            builder.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
            message.close_after_finish();
        }

        if let Some(transport) = transport {
            message.assign_transport(transport);
        }
        Self { message, keep_alive }
    }

    pub fn status(&self) -> StatusCode {
        match self.message.header_block().start_line() {
            StartLine::Status { status, .. } => *status,
            StartLine::Request { .. } => StatusCode::OK,
        }
    }

    /// Changes the status, keeping the canonical reason phrase.
    ///
    /// # Errors
    ///
    /// Fails once the head has been sealed.
    pub fn set_status(&mut self, status: StatusCode) -> Result<(), UsageError> {
        self.set_status_line(status, None)
    }

    fn set_status_line(&mut self, status: StatusCode, reason: Option<&str>) -> Result<(), UsageError> {
        let builder = self.message.head_builder_mut().ok_or_else(|| UsageError::headers_sealed(":status"))?;
        builder.set_start_line(StartLine::Status { status, reason: reason.map(str::to_string) });
        Ok(())
    }

    /// Sets the status line and extra headers, then seals the head.
    ///
    /// Without `reason` the canonical phrase is used, `unknown` for
    /// unregistered codes.
    ///
    /// # Errors
    ///
    /// Fails when the head was already sealed or can't be serialized.
    pub fn write_head<I>(&mut self, status: StatusCode, reason: Option<&str>, headers: I) -> Result<(), HttpError>
    where
        I: IntoIterator<Item = HeaderFragment>,
    {
        self.set_status_line(status, reason)?;
        if let Some(builder) = self.message.head_builder_mut() {
            builder.headers_mut().extend(headers);
        }
        self.message.seal()?;
        self.message.flush();
        Ok(())
    }

    /// # Errors
    ///
    /// See [`OutgoingMessage::set_header`].
    pub fn set_header<K, V>(&mut self, name: K, value: V) -> Result<(), UsageError>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        self.message.set_header(name, value)
    }

    pub fn get_header<K: AsHeaderName>(&self, name: K) -> Option<&HeaderValue> {
        self.message.get_header(name)
    }

    /// # Errors
    ///
    /// See [`OutgoingMessage::remove_header`].
    pub fn remove_header<K>(&mut self, name: K) -> Result<Option<HeaderValue>, UsageError>
    where
        K: TryInto<HeaderName>,
    {
        self.message.remove_header(name)
    }

    pub fn write(&mut self, chunk: impl Into<Bytes>) -> bool {
        self.message.write(chunk)
    }

    /// Ends the response. See [`OutgoingMessage::end`].
    pub fn end(&mut self, data: Option<Bytes>) -> bool {
        self.message.end(data)
    }

    /// Ends the response, `on_finish` runs once every byte has been handed to
    /// the transport.
    pub fn end_with<F>(&mut self, data: Option<Bytes>, on_finish: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.message.end_with(data, on_finish)
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.message.set_timeout(timeout);
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn is_finished(&self) -> bool {
        self.message.is_finished()
    }

    pub fn error(&self) -> Option<&HttpError> {
        self.message.error()
    }

    pub fn message(&self) -> &OutgoingMessage<T> {
        &self.message
    }

    pub fn message_mut(&mut self) -> &mut OutgoingMessage<T> {
        &mut self.message
    }

    /// Attaches the response to a transport when it was created without one.
    pub fn assign_transport(&mut self, transport: T) -> bool {
        trace!("response attached to transport");
        self.message.assign_transport(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MemoryTransport;
    use crate::protocol::IncomingRole;
    use crate::protocol::body::{body_channel, flow_channel};
    use http::header::CONTENT_LENGTH;
    use indoc::indoc;

    fn request(method: Method, keep_alive: bool) -> IncomingMessage {
        request_with_version(method, Version::HTTP_11, keep_alive)
    }

    fn request_with_version(method: Method, version: Version, keep_alive: bool) -> IncomingMessage {
        let (flow, _) = flow_channel();
        let (_sender, receiver) = body_channel(flow, 1024);
        let role = IncomingRole::Request { method, url: "/".to_string() };
        IncomingMessage::new(role, version, keep_alive, false, receiver)
    }

    #[test]
    fn implicit_ok_head() {
        let transport = MemoryTransport::new();
        let mut response = ServerResponse::new(&request(Method::GET, true), Some(transport.clone()));
        response.set_header(CONTENT_LENGTH, "5").unwrap();
        response.end(Some(Bytes::from_static(b"hello")));

        let expected = indoc! {"
        HTTP/1.1 200 OK\r
        content-length: 5\r
        \r
        hello"};
        assert_eq!(transport.output(), Bytes::from(expected));
        assert!(!transport.is_ended());
    }

    #[test]
    fn write_head_with_reason_and_headers() {
        let transport = MemoryTransport::new();
        let mut response = ServerResponse::new(&request(Method::GET, true), Some(transport.clone()));
        let headers = [(HeaderName::from_static("x-trace"), HeaderValue::from_static("7"))];
        response.write_head(StatusCode::from_u16(299).unwrap(), None, headers).unwrap();

        assert_eq!(transport.output(), Bytes::from_static(b"HTTP/1.1 299 unknown\r\nx-trace: 7\r\ntransfer-encoding: chunked\r\n\r\n"));
        assert!(response.set_status(StatusCode::NOT_FOUND).is_err());
        assert!(response.write_head(StatusCode::OK, Some("Again"), Vec::<HeaderFragment>::new()).is_err());
    }

    #[test]
    fn head_request_gets_no_body() {
        let transport = MemoryTransport::new();
        let mut response = ServerResponse::new(&request(Method::HEAD, true), Some(transport.clone()));
        response.set_header(CONTENT_LENGTH, "4").unwrap();
        response.end(Some(Bytes::from_static(b"body")));

        assert_eq!(transport.output(), Bytes::from_static(b"HTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\n"));
    }

    #[test]
    fn closes_when_not_kept_alive() {
        let transport = MemoryTransport::new();
        let mut response = ServerResponse::new(&request(Method::GET, false), Some(transport.clone()));
        response.set_status(StatusCode::NO_CONTENT).unwrap();
        assert!(response.end(None));

        assert_eq!(transport.output(), Bytes::from_static(b"HTTP/1.1 204 No Content\r\nconnection: close\r\n\r\n"));
        assert!(transport.is_ended());
        assert!(!response.end(None));
    }

    #[test]
    fn whole_body_at_end_gets_content_length() {
        let transport = MemoryTransport::new();
        let mut response = ServerResponse::new(&request(Method::GET, true), Some(transport.clone()));
        assert!(response.end(Some(Bytes::from_static(b"hi"))));

        assert_eq!(transport.output(), Bytes::from_static(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nhi"));
        assert!(!transport.is_ended());
    }

    #[test]
    fn streamed_body_is_chunked() {
        let transport = MemoryTransport::new();
        let mut response = ServerResponse::new(&request(Method::GET, true), Some(transport.clone()));
        response.write("ab");
        response.end(Some(Bytes::from_static(b"c")));

        let expected = indoc! {"
        HTTP/1.1 200 OK\r
        transfer-encoding: chunked\r
        \r
        2\r
        ab\r
        1\r
        c\r
        0\r
        \r
        "};
        assert_eq!(transport.output(), Bytes::from(expected));
        assert!(!transport.is_ended());
    }

    #[test]
    fn http10_streamed_body_closes_connection() {
        let transport = MemoryTransport::new();
        let request = request_with_version(Method::GET, Version::HTTP_10, true);
        let mut response = ServerResponse::new(&request, Some(transport.clone()));
        response.write("ab");
        assert!(!transport.is_ended());
        response.end(Some(Bytes::from_static(b"c")));

        assert_eq!(transport.output(), Bytes::from_static(b"HTTP/1.1 200 OK\r\nconnection: close\r\n\r\nabc"));
        assert!(transport.is_ended());
    }

    #[test]
    fn short_body_destroys_transport() {
        let transport = MemoryTransport::new();
        let mut response = ServerResponse::new(&request(Method::GET, true), Some(transport.clone()));
        response.set_header(CONTENT_LENGTH, "10").unwrap();

        assert!(!response.end(Some(Bytes::from_static(b"abc"))));
        assert_eq!(transport.output(), Bytes::from_static(b"HTTP/1.1 200 OK\r\ncontent-length: 10\r\n\r\nabc"));
        assert!(transport.is_destroyed());
        assert!(matches!(
            response.error(),
            Some(HttpError::Send { source: crate::protocol::SendError::IncompleteBody { remaining: 7 } })
        ));
        assert!(!response.end(None));
    }
}
