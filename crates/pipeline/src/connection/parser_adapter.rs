use std::mem;

use bytes::Bytes;
use http::StatusCode;
use tracing::{debug, trace, warn};

use crate::codec::TokenizerEvents;
use crate::config::PipelineConfig;
use crate::handler::MessageHandler;
use crate::protocol::body::{BodySender, FlowReceiver, FlowSender, FlowSignal, body_channel, flow_channel};
use crate::protocol::{
    BodyDecision, HeadInfo, HeadLine, HeaderAccumulator, HeaderFragment, HttpError, IncomingMessage, IncomingRole,
    MessageKind, TransportError,
};

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    // fields flushed before the head completed
    Headers(HeaderAccumulator),
    Body {
        sender: BodySender,
        decision: BodyDecision,
        keep_alive: bool,
    },
    // body ended, kept for a late timeout callback
    Complete(BodySender),
    // a `100 Continue` the client never sees
    Interim,
    Failed,
}

/// Turns tokenizer events into [`IncomingMessage`]s.
///
/// One adapter serves one connection and one message at a time. The message
/// is handed to the [`MessageHandler`] when its head completes; body bytes are
/// pushed into it afterwards, and consumption state flows back to the
/// transport binding through the [`FlowReceiver`] returned by
/// [`ParserAdapter::new`].
#[derive(Debug)]
pub struct ParserAdapter<T, H> {
    kind: MessageKind,
    handler: H,
    transport: Option<T>,
    flow: FlowSender,
    read_high_water_mark: usize,
    state: State,
}

impl<T, H> ParserAdapter<T, H>
where
    H: MessageHandler<T>,
{
    pub fn new(kind: MessageKind, handler: H, config: &PipelineConfig) -> (Self, FlowReceiver) {
        let (flow, receiver) = flow_channel();
        let adapter = Self {
            kind,
            handler,
            transport: None,
            flow,
            read_high_water_mark: config.read_high_water_mark(),
            state: State::Idle,
        };
        (adapter, receiver)
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// The transport handed to the handler with every message.
    pub fn set_transport(&mut self, transport: Option<T>) {
        self.transport = transport;
    }

    /// A message head or body is being parsed.
    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, State::Headers(_) | State::Body { .. } | State::Interim)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, State::Failed)
    }

    /// Ends the in-flight body with `error`; the adapter accepts no more events.
    pub fn fail(&mut self, error: HttpError) {
        match mem::replace(&mut self.state, State::Failed) {
            State::Body { sender, .. } => sender.fail(error),
            State::Headers(_) | State::Interim => debug!(cause = %error, "message failed before its head completed"),
            State::Idle | State::Complete(_) | State::Failed => trace!(cause = %error, "no message in flight"),
        }
    }

    /// Runs the timeout callback of the current message, `false` when there is none.
    pub fn fire_timeout(&mut self) -> bool {
        match &self.state {
            State::Body { sender, .. } | State::Complete(sender) => sender.fire_timeout(),
            _ => false,
        }
    }

    /// The transport closed: a body still in flight fails as truncated.
    pub fn close(&mut self) {
        if self.is_in_flight() {
            self.fail(TransportError::closed().into());
        }
    }

    fn send_flow(&self, signal: FlowSignal) {
        if self.flow.unbounded_send(signal).is_err() {
            trace!(?signal, "transport binding gone, flow signal dropped");
        }
    }
}

impl<T, H> TokenizerEvents for ParserAdapter<T, H>
where
    H: MessageHandler<T>,
{
    fn on_headers(&mut self, fragments: Vec<HeaderFragment>, url: Option<String>) {
        match &mut self.state {
            State::Headers(accumulator) => accumulator.append(fragments, url.as_deref()),
            State::Idle | State::Complete(_) => {
                let mut accumulator = HeaderAccumulator::new();
                accumulator.append(fragments, url.as_deref());
                self.state = State::Headers(accumulator);
            }
            State::Body { .. } | State::Interim | State::Failed => {
                warn!(len = fragments.len(), "header fields outside of a message head, ignored");
            }
        }
    }

    fn on_headers_complete(&mut self, info: HeadInfo) -> BodyDecision {
        let accumulator = match mem::take(&mut self.state) {
            State::Headers(accumulator) => Some(accumulator),
            State::Failed => {
                self.state = State::Failed;
                return BodyDecision::SkipBody;
            }
            _ => None,
        };

        let HeadInfo { line, version, headers, url, keep_alive, upgrade } = info;
        if let HeadLine::Response { status, .. } = &line
            && *status == StatusCode::CONTINUE
        {
            debug!("interim 100 continue swallowed");
            self.state = State::Interim;
            return BodyDecision::Deliver;
        }

        let (mut header_map, accumulated_url) = accumulator.map(HeaderAccumulator::finish).unwrap_or_default();
        let url = url.unwrap_or(accumulated_url);
        let role = IncomingRole::from_line(line, url);

        let (sender, receiver) = body_channel(self.flow.clone(), self.read_high_water_mark);
        let mut message = IncomingMessage::new(role, version, keep_alive, upgrade, receiver);
        mem::swap(message.headers_mut(), &mut header_map);
        message.add_headers(headers);

        debug!(role = ?message.role(), ?version, keep_alive, "message head complete");
        let decision = self.handler.on_message(message, self.transport.as_ref());
        self.state = State::Body { sender, decision, keep_alive };
        decision
    }

    fn on_body(&mut self, chunk: Bytes) {
        match &self.state {
            State::Body { sender, decision: BodyDecision::Deliver, .. } => {
                trace!(len = chunk.len(), "body chunk");
                sender.push(chunk);
            }
            State::Body { decision: BodyDecision::SkipBody, .. } => {
                trace!(len = chunk.len(), "body skipped, chunk dropped");
            }
            _ => warn!(len = chunk.len(), "body bytes outside of a message, ignored"),
        }
    }

    fn on_message_complete(&mut self) {
        match mem::take(&mut self.state) {
            State::Body { sender, keep_alive, .. } => {
                sender.complete();
                self.send_flow(FlowSignal::MessageComplete { keep_alive });
                self.state = State::Complete(sender);
            }
            State::Interim => trace!("interim response complete"),
            State::Failed => self.state = State::Failed,
            State::Idle | State::Headers(_) | State::Complete(_) => warn!("message complete without a message head"),
        }
    }
}
