//! Push-based outbound message.
//!
//! An [`OutgoingMessage`] accepts body writes before a transport exists,
//! keeps them in submission order, and serializes its head exactly once. The
//! head is sealed by the first write, by `end`, or by an explicit
//! [`OutgoingMessage::seal`]; after that header mutation fails.
//!
//! A body is always framed. When the application declared neither
//! `Content-Length` nor `Transfer-Encoding`, sealing picks the framing:
//! - the length of the whole body when `end` supplies it before anything was written
//! - `Transfer-Encoding: chunked` when the length is unknown
//! - for a response that can't be chunked, `Connection: close`, and the
//!   transport is ended once the response has been handed over

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http::header::{AsHeaderName, CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Version};
use tokio_util::codec::Encoder;
use tracing::{debug, error, trace, warn};

use crate::codec::{HeaderEncoder, PayloadEncoder};
use crate::connection::Transport;
use crate::protocol::{HttpError, PayloadItem, SendError, StartLine, UsageError};

type FinishCallback = Box<dyn FnOnce() + Send>;

/// The mutable head of a message that has not been sealed yet.
#[derive(Debug, Clone, Default)]
pub struct HeadBuilder {
    start_line: StartLine,
    version: Version,
    headers: HeaderMap,
}

impl HeadBuilder {
    /// Creates an HTTP/1.1 head without headers.
    pub fn new(start_line: StartLine) -> Self {
        Self { start_line, version: Version::HTTP_11, headers: HeaderMap::new() }
    }

    pub fn start_line(&self) -> &StartLine {
        &self.start_line
    }

    pub fn set_start_line(&mut self, start_line: StartLine) {
        self.start_line = start_line;
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Sets the version written on the start line. Bodies of unknown length
    /// are only chunked for HTTP/1.1.
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }
}

/// A head that has been serialized. Its bytes never change.
#[derive(Debug)]
pub struct SealedHead {
    start_line: StartLine,
    headers: HeaderMap,
    block: Bytes,
    encoder: PayloadEncoder,
}

impl SealedHead {
    /// The serialized start line and headers, terminated by an empty line.
    pub fn block(&self) -> &Bytes {
        &self.block
    }

    pub fn start_line(&self) -> &StartLine {
        &self.start_line
    }
}

/// The head of an outbound message, in one of its two states.
#[derive(Debug)]
pub enum HeaderBlock {
    /// Headers may still change.
    Mutable(HeadBuilder),
    /// Serialized; the builder was consumed.
    Sealed(SealedHead),
}

impl HeaderBlock {
    fn headers(&self) -> &HeaderMap {
        match self {
            HeaderBlock::Mutable(builder) => &builder.headers,
            HeaderBlock::Sealed(sealed) => &sealed.headers,
        }
    }

    pub fn start_line(&self) -> &StartLine {
        match self {
            HeaderBlock::Mutable(builder) => &builder.start_line,
            HeaderBlock::Sealed(sealed) => &sealed.start_line,
        }
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self, HeaderBlock::Sealed(_))
    }
}

/// One outbound message: a request on a client, a response on a server.
///
/// Writes are accepted before a transport exists. They are framed as soon as
/// the head is sealed and queued in order; attaching a transport hands over
/// the head first, then the queue. The finish callbacks run once, when the
/// ended message has been handed over completely.
pub struct OutgoingMessage<T> {
    head: HeaderBlock,
    queue: VecDeque<Bytes>,
    transport: Option<T>,
    has_body: bool,
    chunked_allowed: bool,
    close_after_finish: bool,
    seal_on_attach: bool,
    header_sent: bool,
    finished: bool,
    finish_emitted: bool,
    on_finish: Vec<FinishCallback>,
    error: Option<HttpError>,
    timeout: Option<Duration>,
}

impl<T> OutgoingMessage<T>
where
    T: Transport,
{
    /// Creates a message with an empty, mutable head.
    ///
    /// # Arguments
    /// * `start_line` - the request line or status line to send
    pub fn new(start_line: StartLine) -> Self {
        let has_body = start_line.permits_body();
        Self {
            head: HeaderBlock::Mutable(HeadBuilder::new(start_line)),
            queue: VecDeque::new(),
            transport: None,
            has_body,
            chunked_allowed: true,
            close_after_finish: false,
            seal_on_attach: false,
            header_sent: false,
            finished: false,
            finish_emitted: false,
            on_finish: Vec::new(),
            error: None,
            timeout: None,
        }
    }

    /// Sets a header, replacing any previous value for the name.
    ///
    /// # Errors
    ///
    /// Fails when the name or value is invalid, or the head has already been sealed.
    pub fn set_header<K, V>(&mut self, name: K, value: V) -> Result<(), UsageError>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let name = name.try_into().map_err(|_| UsageError::invalid_header_name("<unparsable>"))?;
        let value = value.try_into().map_err(|_| UsageError::invalid_header_value(&name))?;
        let builder = self.builder_mut(&name)?;
        builder.headers.insert(name, value);
        Ok(())
    }

    /// Returns the current value of a header, sealed or not.
    pub fn get_header<K: AsHeaderName>(&self, name: K) -> Option<&HeaderValue> {
        self.head.headers().get(name)
    }

    /// Removes a header, returning its value.
    ///
    /// # Errors
    ///
    /// Fails when the head has already been sealed.
    pub fn remove_header<K>(&mut self, name: K) -> Result<Option<HeaderValue>, UsageError>
    where
        K: TryInto<HeaderName>,
    {
        let name = name.try_into().map_err(|_| UsageError::invalid_header_name("<unparsable>"))?;
        let builder = self.builder_mut(&name)?;
        Ok(builder.headers.remove(&name))
    }

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    pub(crate) fn head_builder_mut(&mut self) -> Option<&mut HeadBuilder> {
        match &mut self.head {
            HeaderBlock::Mutable(builder) => Some(builder),
            HeaderBlock::Sealed(_) => None,
        }
    }

    fn builder_mut(&mut self, name: &HeaderName) -> Result<&mut HeadBuilder, UsageError> {
        match &mut self.head {
            HeaderBlock::Mutable(builder) => Ok(builder),
            HeaderBlock::Sealed(_) => {
                warn!(header = %name, "headers already sealed");
                Err(UsageError::headers_sealed(name))
            }
        }
    }

    /// The head, mutable or already serialized.
    pub fn header_block(&self) -> &HeaderBlock {
        &self.head
    }

    pub fn is_sealed(&self) -> bool {
        self.head.is_sealed()
    }

    /// Serializes the head if it is still mutable. Later header changes fail.
    ///
    /// Without a framing header the body is sent chunked, see the module docs.
    ///
    /// # Errors
    ///
    /// Fails when the head can't be serialized; the message is failed as well.
    pub fn seal(&mut self) -> Result<(), HttpError> {
        self.seal_with_length(None)
    }

    /// Seals the head; `known_length` is the whole body length when `end`
    /// supplies it before any write.
    fn seal_with_length(&mut self, known_length: Option<u64>) -> Result<(), HttpError> {
        let HeaderBlock::Mutable(builder) = &mut self.head else {
            return Ok(());
        };

        let mut builder = std::mem::take(builder);
        let encoder = if self.has_body && builder.start_line.permits_body() {
            self.frame_body(&mut builder, known_length)
        } else {
            PayloadEncoder::empty()
        };

        let mut block = BytesMut::new();
        if let Err(e) = HeaderEncoder.encode(&builder, &mut block) {
            error!(cause = %e, "failed to serialize message head");
            self.error = Some(SendError::invalid_body(format!("can't serialize head: {e}")).into());
            self.head = HeaderBlock::Mutable(builder);
            return Err(e.into());
        }

        trace!(len = block.len(), chunked = encoder.is_chunked(), "sealed message head");
        self.head = HeaderBlock::Sealed(SealedHead {
            start_line: builder.start_line,
            headers: builder.headers,
            block: block.freeze(),
            encoder,
        });
        Ok(())
    }

    /// Picks the body framing, adding a framing header when the application set none.
    fn frame_body(&mut self, builder: &mut HeadBuilder, known_length: Option<u64>) -> PayloadEncoder {
        let encoder = PayloadEncoder::from_headers(&builder.headers);
        if !encoder.is_identity() {
            return encoder;
        }

        let is_request = builder.start_line.is_request();
        if !builder.headers.contains_key(TRANSFER_ENCODING) {
            match known_length {
                Some(0) if is_request && !builder.start_line.chunked_by_default() => return encoder,
                Some(length) => {
                    builder.headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
                    return PayloadEncoder::fix_length(length);
                }
                None if self.chunked_allowed
                    && builder.version == Version::HTTP_11
                    && builder.start_line.chunked_by_default() =>
                {
                    builder.headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
                    return PayloadEncoder::chunked();
                }
                None => {}
            }
        }

        if !is_request {
            debug!("body length unknown, connection closes after the response");
            builder.headers.insert(CONNECTION, HeaderValue::from_static("close"));
            self.close_after_finish = true;
        }
        encoder
    }

    /// Marks the message as one that never carries a body, e.g. the response to a `HEAD` request.
    pub fn suppress_body(&mut self) {
        self.has_body = false;
    }

    pub fn has_body(&self) -> bool {
        self.has_body
    }

    /// Never frames the body with `Transfer-Encoding: chunked` implicitly, for
    /// peers that don't speak HTTP/1.1.
    pub fn disallow_chunked(&mut self) {
        self.chunked_allowed = false;
    }

    /// Ends the transport once the whole message has been handed to it.
    pub fn close_after_finish(&mut self) {
        self.close_after_finish = true;
    }

    /// Whether finishing this message ends the transport.
    pub fn closes_after_finish(&self) -> bool {
        self.close_after_finish
    }

    pub(crate) fn seal_on_attach(&mut self) {
        self.seal_on_attach = true;
    }

    /// Queues one body chunk and flushes what the transport can take.
    ///
    /// Returns `true` only when a transport is attached and accepted every
    /// queued byte without buffering.
    pub fn write(&mut self, chunk: impl Into<Bytes>) -> bool {
        if self.finished {
            warn!("write after end, chunk dropped");
            return false;
        }
        if self.error.is_some() {
            debug!("write on failed message, chunk dropped");
            return false;
        }
        if self.seal().is_err() || self.enqueue(PayloadItem::Chunk(chunk.into())).is_err() {
            return false;
        }
        self.flush()
    }

    /// Finishes the message with an optional last chunk.
    ///
    /// Returns `false`, and does nothing, when the message already ended or
    /// failed. Also returns `false` when the body falls short of its declared
    /// `Content-Length`: the message fails and the transport is destroyed, as
    /// the peer could never tell where the body ends.
    pub fn end(&mut self, data: Option<Bytes>) -> bool {
        self.finish_with(data, None)
    }

    /// Like [`OutgoingMessage::end`], and runs `on_finish` once the whole
    /// message has been handed to a transport.
    pub fn end_with<F>(&mut self, data: Option<Bytes>, on_finish: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.finish_with(data, Some(Box::new(on_finish)))
    }

    fn finish_with(&mut self, data: Option<Bytes>, on_finish: Option<FinishCallback>) -> bool {
        if self.finished {
            debug!("message already ended");
            return false;
        }
        if self.error.is_some() {
            debug!("end on failed message ignored");
            return false;
        }

        let known_length = (!self.is_sealed())
            .then(|| data.as_ref().map_or(0, |data| u64::try_from(data.len()).unwrap_or(u64::MAX)));
        if self.seal_with_length(known_length).is_err() {
            return false;
        }

        if let Some(data) = data
            && self.enqueue(PayloadItem::Chunk(data)).is_err()
        {
            return false;
        }

        if let Err(e) = self.enqueue(PayloadItem::Eof) {
            self.flush();
            self.finished = true;
            self.fail(e);
            if let Some(transport) = &self.transport {
                transport.destroy();
            }
            return false;
        }

        self.finished = true;
        self.on_finish.extend(on_finish);
        self.flush();
        true
    }

    fn enqueue(&mut self, item: PayloadItem) -> Result<(), SendError> {
        let HeaderBlock::Sealed(sealed) = &mut self.head else {
            return Ok(());
        };

        let mut dst = BytesMut::new();
        if let Err(e) = sealed.encoder.encode(item, &mut dst) {
            error!(cause = %e, "failed to encode body");
            return Err(e);
        }
        if !dst.is_empty() {
            self.queue.push_back(dst.freeze());
        }
        Ok(())
    }

    /// Hands the sealed head (once) and every queued chunk to the transport in order.
    ///
    /// Returns `false` when no transport is attached or the transport signalled backpressure.
    pub fn flush(&mut self) -> bool {
        if self.error.is_some() {
            trace!("message failed, nothing flushed");
            return false;
        }
        let Some(transport) = &self.transport else {
            trace!(queued = self.queue.len(), "no transport yet, keep queued");
            return false;
        };

        let mut accepted = true;
        if !self.header_sent
            && let HeaderBlock::Sealed(sealed) = &self.head
        {
            accepted = transport.write(sealed.block.clone());
            self.header_sent = true;
        }

        if self.header_sent {
            while let Some(chunk) = self.queue.pop_front() {
                trace!(len = chunk.len(), "forward chunk");
                accepted = transport.write(chunk) && accepted;
            }
        }

        if self.finished && self.header_sent && self.queue.is_empty() {
            self.emit_finish();
        }

        accepted
    }

    fn emit_finish(&mut self) {
        if self.finish_emitted {
            return;
        }
        self.finish_emitted = true;
        debug!("message finished");
        for callback in self.on_finish.drain(..) {
            callback();
        }

        if self.close_after_finish
            && let Some(transport) = &self.transport
        {
            debug!("message finished, ending connection");
            transport.end(None);
        }
    }

    /// Attaches the transport and flushes everything queued so far.
    pub fn assign_transport(&mut self, transport: T) -> bool {
        if let Some(timeout) = self.timeout.take() {
            transport.set_timeout(Some(timeout));
        }
        self.transport = Some(transport);

        if self.seal_on_attach && !self.finished && self.seal().is_err() {
            return false;
        }
        self.flush()
    }

    /// Releases the transport; later writes queue again.
    pub fn detach_transport(&mut self) -> Option<T> {
        self.transport.take()
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Sets the transport idle timeout now, or when the transport attaches.
    pub fn set_timeout(&mut self, timeout: Duration) {
        match &self.transport {
            Some(transport) => transport.set_timeout(Some(timeout)),
            None => self.timeout = Some(timeout),
        }
    }

    /// Records a transport failure, later writes are refused.
    pub fn fail(&mut self, error: impl Into<HttpError>) {
        let error = error.into();
        if self.finish_emitted {
            trace!(cause = %error, "message already finished, error ignored");
            return;
        }
        warn!(cause = %error, "outgoing message failed");
        self.error = Some(error);
    }

    /// The failure recorded by [`OutgoingMessage::fail`], if any.
    pub fn error(&self) -> Option<&HttpError> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<HttpError> {
        self.error.take()
    }

    /// Whether `end` was called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether the head has been handed to a transport.
    pub fn is_header_sent(&self) -> bool {
        self.header_sent
    }

    /// Number of chunks waiting for a transport.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl<T> fmt::Debug for OutgoingMessage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutgoingMessage")
            .field("head", &self.head)
            .field("queued", &self.queue.len())
            .field("connected", &self.transport.is_some())
            .field("header_sent", &self.header_sent)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
