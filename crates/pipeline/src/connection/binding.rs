use std::io;
use std::time::Duration;

use bytes::Bytes;
use futures::{FutureExt, StreamExt};
use tracing::{debug, error, info, trace, warn};

use crate::codec::{HttpTokenizer, Tokenizer};
use crate::config::PipelineConfig;
use crate::connection::{ParserAdapter, Transport, TransportEvent};
use crate::handler::MessageHandler;
use crate::protocol::body::{FlowReceiver, FlowSignal};
use crate::protocol::{HttpError, MessageKind, OutgoingMessage, TransportError};

/// Glues one transport to the tokenizer, the parser adapter and the outbound
/// messages of a connection.
///
/// The binding is the only code that pauses, resumes or arms the timeout of
/// the transport's read side. It does so in reaction to [`FlowSignal`]s sent
/// by inbound bodies, applied after every fragment by
/// [`TransportBinding::apply_flow_signals`] or one at a time through
/// [`TransportBinding::next_flow_signal`] when the binding is driven by an
/// event loop.
///
/// A completed message that is not kept alive puts the binding into a closing
/// state: later data is ignored and on the client side the transport is ended.
#[derive(Debug)]
pub struct TransportBinding<T, H> {
    kind: MessageKind,
    transport: Option<T>,
    tokenizer: HttpTokenizer,
    adapter: ParserAdapter<T, H>,
    flow: FlowReceiver,
    paused: bool,
    timeout: Option<Duration>,
    closing: bool,
}

impl<T, H> TransportBinding<T, H>
where
    T: Transport + Clone,
    H: MessageHandler<T>,
{
    pub fn new(kind: MessageKind, handler: H, config: &PipelineConfig) -> Self {
        let (adapter, flow) = ParserAdapter::new(kind, handler, config);
        Self {
            kind,
            transport: None,
            tokenizer: HttpTokenizer::new(kind, config),
            adapter,
            flow,
            paused: false,
            timeout: None,
            closing: false,
        }
    }

    /// Binding of a server connection: parses requests.
    pub fn server(handler: H, config: &PipelineConfig) -> Self {
        Self::new(MessageKind::Request, handler, config)
    }

    /// Binding of a client connection: parses responses.
    pub fn client(handler: H, config: &PipelineConfig) -> Self {
        Self::new(MessageKind::Response, handler, config)
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    pub fn handler(&self) -> &H {
        self.adapter.handler()
    }

    pub fn handler_mut(&mut self) -> &mut H {
        self.adapter.handler_mut()
    }

    /// Whether reading is currently paused for flow control.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// No inbound message is partially parsed.
    pub fn is_idle(&self) -> bool {
        self.tokenizer.is_idle() && !self.adapter.is_in_flight()
    }

    /// Binds the connected transport, re-applies flow state requested before
    /// the connection existed, then flushes `outgoing` so bytes written before
    /// the connection go out first.
    pub fn on_connect(&mut self, transport: T, outgoing: Option<&mut OutgoingMessage<T>>) {
        info!(kind = ?self.kind, "transport connected");
        if self.paused {
            transport.pause();
        }
        if let Some(timeout) = self.timeout.take() {
            transport.set_timeout(Some(timeout));
        }

        self.adapter.set_transport(Some(transport.clone()));
        if let Some(outgoing) = outgoing {
            outgoing.assign_transport(transport.clone());
        }
        self.transport = Some(transport);
        self.apply_flow_signals();
    }

    /// Attaches an outbound message to the connected transport.
    ///
    /// Returns `false` when there is no transport yet or it signalled backpressure.
    pub fn attach(&self, outgoing: &mut OutgoingMessage<T>) -> bool {
        match &self.transport {
            Some(transport) => outgoing.assign_transport(transport.clone()),
            None => {
                warn!("no transport connected, outgoing message stays queued");
                false
            }
        }
    }

    /// Parses one fragment of received bytes.
    ///
    /// # Errors
    ///
    /// Returns the parse error that abandoned parsing; the in-flight message
    /// fails with the same error.
    pub fn on_data(&mut self, bytes: Bytes) -> Result<(), HttpError> {
        if self.closing {
            trace!(len = bytes.len(), "connection closing, data ignored");
            return Ok(());
        }

        trace!(len = bytes.len(), "data received");
        let result = self.tokenizer.execute(&bytes, &mut self.adapter);
        if let Err(e) = &result {
            error!(cause = %e, "failed to parse message, parsing abandoned");
            self.adapter.fail(e.clone().into());
        }
        self.apply_flow_signals();
        result.map_err(HttpError::from)
    }

    /// The peer sent its last byte. Completes a body delimited by the end of
    /// the connection.
    ///
    /// # Errors
    ///
    /// Fails when a message was cut short.
    pub fn on_end(&mut self) -> Result<(), HttpError> {
        debug!("peer ended the connection");
        let result = self.tokenizer.finish(&mut self.adapter);
        if let Err(e) = &result {
            warn!(cause = %e, "connection ended inside a message");
            self.adapter.fail(e.clone().into());
        }
        self.apply_flow_signals();
        result.map_err(HttpError::from)
    }

    /// Propagates a transport failure to the inbound and the given outbound message.
    pub fn on_error(&mut self, error: &io::Error, outgoing: Option<&mut OutgoingMessage<T>>) {
        error!(cause = %error, "transport error");
        let error = TransportError::from(error);
        self.adapter.fail(error.clone().into());
        if let Some(outgoing) = outgoing {
            outgoing.fail(error);
        }
    }

    /// Runs the timeout callback of the current inbound message.
    pub fn on_timeout(&mut self) {
        if !self.adapter.fire_timeout() {
            debug!("transport timed out, no timeout callback registered");
        }
    }

    /// The transport is gone: an unfinished inbound body and `outgoing` fail,
    /// and the transport handle is released.
    pub fn on_close(&mut self, outgoing: Option<&mut OutgoingMessage<T>>) {
        info!(kind = ?self.kind, "transport closed");
        self.adapter.close();
        if let Some(outgoing) = outgoing {
            outgoing.fail(TransportError::closed());
            outgoing.detach_transport();
        }
        self.adapter.set_transport(None);
        self.transport = None;
    }

    /// Dispatches one transport notification to the matching `on_*` method.
    ///
    /// # Errors
    ///
    /// Returns parse errors from `Data` and `End`.
    pub fn handle_event(
        &mut self,
        event: TransportEvent<T>,
        outgoing: Option<&mut OutgoingMessage<T>>,
    ) -> Result<(), HttpError> {
        match event {
            TransportEvent::Connect(transport) => self.on_connect(transport, outgoing),
            TransportEvent::Data(bytes) => return self.on_data(bytes),
            TransportEvent::End => return self.on_end(),
            TransportEvent::Error(e) => self.on_error(&e, outgoing),
            TransportEvent::Timeout => self.on_timeout(),
            TransportEvent::Close => self.on_close(outgoing),
        }
        Ok(())
    }

    /// Applies every flow signal queued so far.
    pub fn apply_flow_signals(&mut self) {
        while let Some(Some(signal)) = self.flow.next().now_or_never() {
            self.apply_flow(signal);
        }
    }

    /// Waits for the next flow signal. Pending forever while the adapter is alive and quiet.
    pub async fn next_flow_signal(&mut self) -> Option<FlowSignal> {
        self.flow.next().await
    }

    pub fn apply_flow(&mut self, signal: FlowSignal) {
        match signal {
            FlowSignal::Pause => self.pause(),
            FlowSignal::Resume => self.resume(),
            FlowSignal::Timeout(timeout) => match &self.transport {
                Some(transport) => transport.set_timeout(timeout),
                None => self.timeout = timeout,
            },
            FlowSignal::MessageComplete { keep_alive } => {
                self.resume();
                if !keep_alive {
                    self.closing = true;
                    debug!(kind = ?self.kind, "message not kept alive, connection closing");
                    if self.kind == MessageKind::Response
                        && let Some(transport) = &self.transport
                    {
                        transport.end(None);
                    }
                }
            }
        }
    }

    fn pause(&mut self) {
        if self.paused {
            return;
        }
        self.paused = true;
        debug!("pause reading");
        if let Some(transport) = &self.transport {
            transport.pause();
        }
    }

    fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        debug!("resume reading");
        if let Some(transport) = &self.transport {
            transport.resume();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MemoryTransport;
    use crate::handler::{ServerHandler, make_handler};
    use crate::protocol::{BodyDecision, ClientRequest, IncomingMessage, ParseError, RequestOptions, ServerResponse};
    use http::{Method, StatusCode};
    use indoc::indoc;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Received = Rc<RefCell<Vec<IncomingMessage>>>;

    fn collecting_server(
        config: &PipelineConfig,
    ) -> (TransportBinding<MemoryTransport, impl MessageHandler<MemoryTransport> + use<>>, Received) {
        let received: Received = Rc::default();
        let sink = Rc::clone(&received);
        let handler = make_handler(move |message: IncomingMessage, _: Option<&MemoryTransport>| {
            sink.borrow_mut().push(message);
            BodyDecision::Deliver
        });
        (TransportBinding::server(handler, config), received)
    }

    #[test]
    fn pipelined_requests_each_get_a_response() {
        let transport = MemoryTransport::new();
        let handler = ServerHandler::new(|request: IncomingMessage, mut response: ServerResponse<MemoryTransport>| {
            let body = format!("you asked for {}", request.url().unwrap_or_default());
            response.set_header("content-length", body.len()).unwrap();
            response.end(Some(Bytes::from(body)));
        });
        let mut binding = TransportBinding::server(handler, &PipelineConfig::default());
        binding.on_connect(transport.clone(), None);

        binding.on_data(Bytes::from_static(b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n")).unwrap();

        let expected = indoc! {"
        HTTP/1.1 200 OK\r
        content-length: 16\r
        \r
        you asked for /aHTTP/1.1 200 OK\r
        content-length: 16\r
        \r
        you asked for /b"};
        assert_eq!(transport.output(), Bytes::from(expected));
        assert!(binding.is_idle());
    }

    #[test]
    fn high_water_mark_pauses_transport() {
        let config = PipelineConfig::default().with_read_high_water_mark(4);
        let (mut binding, received) = collecting_server(&config);
        let transport = MemoryTransport::new();
        binding.on_connect(transport.clone(), None);

        binding.on_data(Bytes::from_static(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\n12345")).unwrap();
        assert!(transport.is_paused());
        assert!(binding.is_paused());

        assert_eq!(received.borrow()[0].read(), Some(Bytes::from_static(b"12345")));
        binding.apply_flow_signals();
        assert!(!transport.is_paused());

        binding.on_data(Bytes::from_static(b"67890")).unwrap();
        assert!(!transport.is_paused());
        assert!(received.borrow()[0].is_complete());
        assert_eq!(transport.pause_count(), 2);
        assert_eq!(transport.resume_count(), 2);
    }

    #[test]
    fn consumer_pause_outlives_fragments() {
        let (mut binding, received) = collecting_server(&PipelineConfig::default());
        let transport = MemoryTransport::new();
        binding.on_connect(transport.clone(), None);

        binding.on_data(Bytes::from_static(b"POST / HTTP/1.1\r\nContent-Length: 6\r\n\r\nab")).unwrap();
        received.borrow()[0].pause();
        binding.apply_flow_signals();
        assert!(transport.is_paused());

        binding.on_data(Bytes::from_static(b"cdef")).unwrap();
        assert!(!transport.is_paused(), "message complete resumes reading for the next message");
        assert_eq!(received.borrow()[0].read(), Some(Bytes::from_static(b"abcdef")));
    }

    #[test]
    fn flow_requested_before_connect_is_reapplied() {
        let (mut binding, _received) = collecting_server(&PipelineConfig::default());
        binding.apply_flow(FlowSignal::Pause);
        binding.apply_flow(FlowSignal::Timeout(Some(Duration::from_secs(3))));

        let transport = MemoryTransport::new();
        binding.on_connect(transport.clone(), None);
        assert!(transport.is_paused());
        assert_eq!(transport.timeout(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn parse_error_fails_message_and_stops_parsing() {
        let (mut binding, received) = collecting_server(&PipelineConfig::default());
        binding.on_connect(MemoryTransport::new(), None);

        binding.on_data(Bytes::from_static(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n")).unwrap();
        let result = binding.on_data(Bytes::from_static(b"zz\r\n"));
        assert!(matches!(result, Err(HttpError::Parse { .. })));
        assert!(received.borrow()[0].is_complete());

        let result = binding.on_data(Bytes::from_static(b"GET / HTTP/1.1\r\n\r\n"));
        assert!(matches!(result, Err(HttpError::Parse { source: ParseError::Abandoned })));
        assert_eq!(received.borrow().len(), 1);
    }

    #[test]
    fn end_completes_body_until_close() {
        let received: Received = Rc::default();
        let sink = Rc::clone(&received);
        let handler = make_handler(move |message: IncomingMessage, _: Option<&MemoryTransport>| {
            sink.borrow_mut().push(message);
            BodyDecision::Deliver
        });
        let mut binding = TransportBinding::client(handler, &PipelineConfig::default());
        binding.on_connect(MemoryTransport::new(), None);

        binding.handle_event(TransportEvent::Data(Bytes::from_static(b"HTTP/1.0 200 OK\r\n\r\nstream")), None).unwrap();
        assert!(!received.borrow()[0].is_complete());

        binding.handle_event(TransportEvent::End, None).unwrap();
        assert!(received.borrow()[0].is_complete());
        assert_eq!(received.borrow()[0].read(), Some(Bytes::from_static(b"stream")));
    }

    #[test]
    fn truncated_message_fails_on_end() {
        let (mut binding, received) = collecting_server(&PipelineConfig::default());
        binding.on_connect(MemoryTransport::new(), None);

        binding.on_data(Bytes::from_static(b"PUT / HTTP/1.1\r\nContent-Length: 9\r\n\r\nabc")).unwrap();
        assert!(binding.on_end().is_err());

        let messages = received.borrow();
        let message = &messages[0];
        assert!(message.is_complete());
        assert_eq!(message.read(), Some(Bytes::from_static(b"abc")));
        assert!(message.is_failed());
        assert!(matches!(
            message.take_error(),
            Some(HttpError::Parse { source: ParseError::UnexpectedEof { .. } })
        ));
    }

    #[test]
    fn pipelined_bodies_stay_with_their_message() {
        let (mut binding, received) = collecting_server(&PipelineConfig::default());
        let transport = MemoryTransport::new();
        binding.on_connect(transport.clone(), None);

        let wire = indoc! {"
        POST /first HTTP/1.1\r
        Content-Length: 5\r
        \r
        helloPOST /second HTTP/1.1\r
        Transfer-Encoding: chunked\r
        \r
        3\r
        abc\r
        0\r
        \r
        PUT /third HTTP/1.1\r
        Content-Length: 3\r
        \r
        xyz"};

        binding.on_data(Bytes::from_static(b"POST /zero HTTP/1.1\r\nContent-Length: 4\r\n\r\n")).unwrap();
        received.borrow()[0].pause();
        binding.apply_flow_signals();
        assert!(transport.is_paused());

        binding.on_data(Bytes::from(format!("body{wire}"))).unwrap();

        let messages = received.borrow();
        let urls: Vec<_> = messages.iter().map(|message| message.url().unwrap_or_default().to_string()).collect();
        assert_eq!(urls, ["/zero", "/first", "/second", "/third"]);

        let bodies: Vec<_> = messages.iter().map(IncomingMessage::read).collect();
        assert_eq!(bodies, [
            Some(Bytes::from_static(b"body")),
            Some(Bytes::from_static(b"hello")),
            Some(Bytes::from_static(b"abc")),
            Some(Bytes::from_static(b"xyz")),
        ]);
        assert!(messages.iter().all(|message| message.is_complete() && !message.is_failed()));
        assert!(binding.is_idle());
    }

    #[test]
    fn unframed_responses_stay_parseable_when_pipelined() {
        let transport = MemoryTransport::new();
        let handler = ServerHandler::new(|_request: IncomingMessage, mut response: ServerResponse<MemoryTransport>| {
            response.end(Some(Bytes::from_static(b"hi")));
        });
        let mut server = TransportBinding::server(handler, &PipelineConfig::default());
        server.on_connect(transport.clone(), None);
        server.on_data(Bytes::from_static(b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n")).unwrap();
        assert!(!transport.is_ended());

        let received: Received = Rc::default();
        let sink = Rc::clone(&received);
        let handler = make_handler(move |message: IncomingMessage, _: Option<&MemoryTransport>| {
            sink.borrow_mut().push(message);
            BodyDecision::Deliver
        });
        let mut client = TransportBinding::client(handler, &PipelineConfig::default());
        client.on_connect(MemoryTransport::new(), None);
        client.on_data(transport.output()).unwrap();

        let responses = received.borrow();
        assert_eq!(responses.len(), 2);
        for response in responses.iter() {
            assert!(response.is_complete());
            assert_eq!(response.read(), Some(Bytes::from_static(b"hi")));
        }
    }

    #[test]
    fn client_request_then_response() {
        let statuses = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&statuses);
        let (mut request, handler) = ClientRequest::new(RequestOptions::new(Method::GET, "/doc"), move |mut response| {
            response.pause();
            sink.borrow_mut().push((response.status(), response));
        });
        request.end(None);

        let transport = MemoryTransport::new();
        let mut binding = TransportBinding::client(handler, &PipelineConfig::default());
        binding.on_connect(transport.clone(), Some(request.message_mut()));
        assert_eq!(transport.output(), Bytes::from_static(b"GET /doc HTTP/1.1\r\n\r\n"));

        binding.on_data(Bytes::from_static(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nte")).unwrap();
        assert!(transport.is_paused());
        binding.on_data(Bytes::from_static(b"xt")).unwrap();

        let received = statuses.borrow();
        assert_eq!(received[0].0, Some(StatusCode::OK));
        assert_eq!(received[0].1.read(), Some(Bytes::from_static(b"text")));
        assert!(!binding.is_closing());
        assert!(!transport.is_ended());
    }

    #[test]
    fn client_ends_transport_after_closing_response() {
        let (mut request, handler) = ClientRequest::new(RequestOptions::new(Method::HEAD, "/doc"), |_| {});
        request.end(None);

        let transport = MemoryTransport::new();
        let mut binding = TransportBinding::client(handler, &PipelineConfig::default());
        binding.on_connect(transport.clone(), Some(request.message_mut()));
        assert_eq!(transport.output(), Bytes::from_static(b"HEAD /doc HTTP/1.1\r\n\r\n"));

        binding
            .on_data(Bytes::from_static(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\n"))
            .unwrap();
        assert!(binding.is_closing());
        assert!(transport.is_ended());
        assert!(binding.handler().has_responded());

        binding.on_data(Bytes::from_static(b"HTTP/1.1 500 Oops\r\n\r\n")).unwrap();
        assert!(!transport.is_destroyed());
    }

    #[test]
    fn close_fails_unfinished_outgoing() {
        let (mut binding, _received) = collecting_server(&PipelineConfig::default());
        let transport = MemoryTransport::new();
        binding.on_connect(transport.clone(), None);

        let mut response: OutgoingMessage<MemoryTransport> =
            OutgoingMessage::new(crate::protocol::StartLine::Status { status: StatusCode::OK, reason: None });
        assert!(binding.attach(&mut response));
        binding.handle_event(TransportEvent::Close, Some(&mut response)).unwrap();

        assert!(matches!(response.error(), Some(HttpError::Transport { .. })));
        assert!(!response.is_connected());
        assert!(binding.transport().is_none());
    }
}
