use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use http::{HeaderMap, Method, StatusCode, Version};
use http_body::{Body, Frame};

use crate::protocol::body::BodyReceiver;
use crate::protocol::header_accumulator::fold_into;
use crate::protocol::{HeaderFragment, HttpError, IncomingRole};

/// A received message: the resolved head plus a pull-based body.
///
/// On a server this is a request, on a client a response. The body can be
/// consumed either by polling [`IncomingMessage::read`], or asynchronously
/// through its [`Stream`] and [`Body`] implementations.
#[derive(Debug)]
pub struct IncomingMessage {
    role: IncomingRole,
    version: Version,
    headers: HeaderMap,
    keep_alive: bool,
    upgrade: bool,
    body: BodyReceiver,
}

impl IncomingMessage {
    pub(crate) fn new(role: IncomingRole, version: Version, keep_alive: bool, upgrade: bool, body: BodyReceiver) -> Self {
        Self { role, version, headers: HeaderMap::new(), keep_alive, upgrade, body }
    }

    pub fn role(&self) -> &IncomingRole {
        &self.role
    }

    /// Request method, `None` for responses.
    pub fn method(&self) -> Option<&Method> {
        match &self.role {
            IncomingRole::Request { method, .. } => Some(method),
            IncomingRole::Response { .. } => None,
        }
    }

    /// Request target as it appeared on the request line.
    pub fn url(&self) -> Option<&str> {
        match &self.role {
            IncomingRole::Request { url, .. } => Some(url),
            IncomingRole::Response { .. } => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match &self.role {
            IncomingRole::Request { .. } => None,
            IncomingRole::Response { status, .. } => Some(*status),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match &self.role {
            IncomingRole::Request { .. } => None,
            IncomingRole::Response { reason, .. } => Some(reason),
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// The peer asked for a protocol switch. Reported only, never performed.
    pub fn upgrade(&self) -> bool {
        self.upgrade
    }

    /// Folds raw header pairs into the header map, a repeated name keeps the last value.
    pub fn add_headers<I>(&mut self, fragments: I)
    where
        I: IntoIterator<Item = HeaderFragment>,
    {
        fold_into(&mut self.headers, fragments);
    }

    /// Returns every body byte queued so far without waiting.
    ///
    /// `None` means nothing is queued right now; check [`IncomingMessage::is_complete`]
    /// to tell "wait for more" apart from "the body is over", and
    /// [`IncomingMessage::is_failed`] to tell a regular end from a failure.
    pub fn read(&self) -> Option<Bytes> {
        self.body.read()
    }

    /// Whether the end of the body has been parsed.
    pub fn is_complete(&self) -> bool {
        self.body.is_complete()
    }

    /// Whether the body ended with a parse or transport error instead of its regular end.
    pub fn is_failed(&self) -> bool {
        self.body.is_failed()
    }

    /// Takes the error that ended the body.
    ///
    /// The error is handed out once: after this the [`Stream`] ends without
    /// yielding it, while [`IncomingMessage::is_failed`] keeps reporting it.
    pub fn take_error(&self) -> Option<HttpError> {
        self.body.take_error()
    }

    pub fn pause(&self) {
        self.body.pause();
    }

    pub fn resume(&self) {
        self.body.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.body.is_paused()
    }

    /// Arms the transport idle timeout, `on_timeout` runs if it fires while
    /// this message is the one being parsed.
    pub fn set_timeout<F>(&self, timeout: Duration, on_timeout: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.body.set_timeout(Some(timeout), on_timeout);
    }

    pub fn clear_timeout(&self) {
        self.body.set_timeout(None, || {});
    }

    /// Reads the remaining body into one buffer.
    pub async fn collect_body(&mut self) -> Result<Bytes, HttpError> {
        use futures::StreamExt;

        let mut collected = bytes::BytesMut::new();
        while let Some(chunk) = self.next().await {
            collected.extend_from_slice(&chunk?);
        }
        Ok(collected.freeze())
    }
}

impl Stream for IncomingMessage {
    type Item = Result<Bytes, HttpError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.body.poll_chunk(cx)
    }
}

impl Body for IncomingMessage {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.body.poll_chunk(cx).map(|chunk| chunk.map(|result| result.map(Frame::data)))
    }

    fn is_end_stream(&self) -> bool {
        self.body.is_drained()
    }
}
