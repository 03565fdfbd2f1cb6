use std::time::Duration;

use bytes::Bytes;
use http::header::AsHeaderName;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use tracing::trace;

use crate::connection::Transport;
use crate::handler::ResponseHandler;
use crate::protocol::{HttpError, IncomingMessage, OutgoingMessage, StartLine, UsageError};

/// Request line and initial headers of a [`ClientRequest`].
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self { method: Method::GET, path: "/".to_string(), headers: HeaderMap::new() }
    }
}

impl RequestOptions {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), headers: HeaderMap::new() }
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// One request sent by a client.
///
/// Headers stay mutable until the request is written to or attached to a
/// transport; on attach the head is flushed right away even without a body
/// write. The response arrives through the [`ResponseHandler`] returned by
/// [`ClientRequest::new`], which belongs in the connection's binding.
#[derive(Debug)]
pub struct ClientRequest<T> {
    message: OutgoingMessage<T>,
    method: Method,
}

impl<T> ClientRequest<T>
where
    T: Transport,
{
    pub fn new<F>(options: RequestOptions, on_response: F) -> (Self, ResponseHandler<F>)
    where
        F: FnMut(IncomingMessage),
    {
        let RequestOptions { method, path, headers } = options;
        let mut message = OutgoingMessage::new(StartLine::Request { method: method.clone(), path });
        if let Some(builder) = message.head_builder_mut() {
            builder.headers_mut().extend(headers);
        }
        message.seal_on_attach();

        let handler = ResponseHandler::new(method.clone(), on_response);
        (Self { message, method }, handler)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        match self.message.header_block().start_line() {
            StartLine::Request { path, .. } => path,
            StartLine::Status { .. } => "/",
        }
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

    pub fn end(&mut self, data: Option<Bytes>) -> bool {
        self.message.end(data)
    }

    pub fn end_with<F>(&mut self, data: Option<Bytes>, on_finish: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.message.end_with(data, on_finish)
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.message.set_timeout(timeout);
    }

    pub fn assign_transport(&mut self, transport: T) -> bool {
        trace!(method = %self.method, "request attached to transport");
        self.message.assign_transport(transport)
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
}
