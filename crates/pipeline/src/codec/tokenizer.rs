//! Byte stream to parser events.
//!
//! The tokenizer owns the read buffer of one connection. Every call to
//! [`Tokenizer::execute`] appends a fragment and reports as many events as
//! the buffered bytes allow; incomplete heads and chunk lines stay buffered
//! until the next fragment.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::codec::{HeaderDecoder, ParsedHead, PayloadDecoder};
use crate::config::PipelineConfig;
use crate::protocol::{BodyDecision, HeadInfo, HeaderFragment, MessageKind, ParseError, PayloadItem};

/// Callbacks a tokenizer reports to, in wire order.
pub trait TokenizerEvents {
    /// A batch of header fields, and the first time also the request target,
    /// flushed before the head is complete.
    fn on_headers(&mut self, fragments: Vec<HeaderFragment>, url: Option<String>);

    /// The head is complete. [`BodyDecision::SkipBody`] makes the tokenizer
    /// treat the message as bodyless whatever its framing headers say.
    fn on_headers_complete(&mut self, info: HeadInfo) -> BodyDecision;

    fn on_body(&mut self, chunk: Bytes);

    fn on_message_complete(&mut self);
}

pub trait Tokenizer {
    /// Feeds one fragment of wire bytes.
    ///
    /// # Errors
    ///
    /// Returns the parse error that stopped tokenizing; every later call fails too.
    fn execute<E: TokenizerEvents>(&mut self, data: &[u8], events: &mut E) -> Result<(), ParseError>;

    /// Signals that the peer will send nothing more.
    ///
    /// # Errors
    ///
    /// Fails when a message was cut short.
    fn finish<E: TokenizerEvents>(&mut self, events: &mut E) -> Result<(), ParseError>;

    /// No message is partially parsed.
    fn is_idle(&self) -> bool;
}

#[derive(Debug)]
enum State {
    Head,
    Body { decoder: PayloadDecoder, keep_alive: bool },
    // a message without keep-alive completed, nothing more is parsed
    Closed,
    Failed,
}

/// [`Tokenizer`] for HTTP/1.0 and HTTP/1.1 built on the crate's decoders.
#[derive(Debug)]
pub struct HttpTokenizer {
    header_decoder: HeaderDecoder,
    header_batch_size: usize,
    buffer: BytesMut,
    state: State,
}

impl HttpTokenizer {
    pub fn new(kind: MessageKind, config: &PipelineConfig) -> Self {
        Self {
            header_decoder: HeaderDecoder::new(kind, config.max_headers(), config.max_header_bytes()),
            header_batch_size: config.header_batch_size(),
            buffer: BytesMut::with_capacity(config.read_buffer_size()),
            state: State::Head,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.header_decoder.kind()
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, State::Failed)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    fn run<E: TokenizerEvents>(&mut self, events: &mut E) -> Result<(), ParseError> {
        loop {
            match &mut self.state {
                State::Head => {
                    let Some(head) = self.header_decoder.decode(&mut self.buffer)? else {
                        return Ok(());
                    };

                    let keep_alive = head.keep_alive;
                    let payload_size = head.payload_size;
                    let decoder = if self.dispatch_head(head, events).is_skip() {
                        trace!(?payload_size, "body skipped");
                        PayloadDecoder::empty()
                    } else {
                        payload_size.into()
                    };
                    self.state = State::Body { decoder, keep_alive };
                }

                State::Body { decoder, keep_alive } => match decoder.decode(&mut self.buffer)? {
                    Some(PayloadItem::Chunk(bytes)) => events.on_body(bytes),
                    Some(PayloadItem::Eof) => {
                        let keep_alive = *keep_alive;
                        self.complete(keep_alive, events);
                    }
                    None => return Ok(()),
                },

                State::Closed => {
                    if !self.buffer.is_empty() {
                        debug!(len = self.buffer.len(), "connection not kept alive, trailing bytes dropped");
                        self.buffer.clear();
                    }
                    return Ok(());
                }

                State::Failed => return Err(ParseError::Abandoned),
            }
        }
    }

    /// Reports the head, in `header_batch_size` batches when it is large.
    fn dispatch_head<E: TokenizerEvents>(&self, head: ParsedHead, events: &mut E) -> BodyDecision {
        let ParsedHead { line, version, mut url, headers, keep_alive, upgrade, .. } = head;

        let headers = if headers.len() > self.header_batch_size {
            let mut fragments = headers.into_iter().peekable();
            while fragments.peek().is_some() {
                let batch = fragments.by_ref().take(self.header_batch_size).collect();
                events.on_headers(batch, url.take());
            }
            Vec::new()
        } else {
            headers
        };

        events.on_headers_complete(HeadInfo { line, version, headers, url, keep_alive, upgrade })
    }

    fn complete<E: TokenizerEvents>(&mut self, keep_alive: bool, events: &mut E) {
        events.on_message_complete();
        self.state = if keep_alive { State::Head } else { State::Closed };
    }
}

impl Tokenizer for HttpTokenizer {
    fn execute<E: TokenizerEvents>(&mut self, data: &[u8], events: &mut E) -> Result<(), ParseError> {
        match self.state {
            State::Failed => return Err(ParseError::Abandoned),
            State::Closed => {
                trace!(len = data.len(), "connection not kept alive, input ignored");
                return Ok(());
            }
            State::Head | State::Body { .. } => {}
        }

        self.buffer.extend_from_slice(data);
        let result = self.run(events);
        if result.is_err() {
            self.state = State::Failed;
            self.buffer.clear();
        }
        result
    }

    fn finish<E: TokenizerEvents>(&mut self, events: &mut E) -> Result<(), ParseError> {
        let result = match &self.state {
            State::Failed => Err(ParseError::Abandoned),
            State::Closed => Ok(()),
            State::Head if self.buffer.is_empty() => Ok(()),
            State::Head => Err(ParseError::unexpected_eof("connection closed inside message head")),
            State::Body { decoder, .. } => decoder.finish().map(|_| events.on_message_complete()),
        };

        self.state = if result.is_ok() { State::Closed } else { State::Failed };
        self.buffer.clear();
        result
    }

    fn is_idle(&self) -> bool {
        match self.state {
            State::Head => self.buffer.is_empty(),
            State::Body { .. } => false,
            State::Closed | State::Failed => true,
        }
    }
}
