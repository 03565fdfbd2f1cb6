use tracing::trace;

use crate::connection::Transport;
use crate::handler::MessageHandler;
use crate::protocol::{BodyDecision, IncomingMessage, ServerResponse};

/// Pairs every received request with a [`ServerResponse`] attached to the
/// same transport and passes both to `f`.
#[derive(Debug)]
pub struct ServerHandler<F> {
    f: F,
}

impl<F> ServerHandler<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<T, F> MessageHandler<T> for ServerHandler<F>
where
    T: Transport + Clone + Send + 'static,
    F: FnMut(IncomingMessage, ServerResponse<T>),
{
    fn on_message(&mut self, request: IncomingMessage, transport: Option<&T>) -> BodyDecision {
        trace!(method = ?request.method(), url = ?request.url(), "dispatch request");
        let response = ServerResponse::new(&request, transport.cloned());
        (self.f)(request, response);

        // request bodies are framed by their own headers
        BodyDecision::Deliver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MemoryTransport;
    use crate::protocol::IncomingRole;
    use crate::protocol::body::{body_channel, flow_channel};
    use bytes::Bytes;
    use http::{Method, Version};

    #[test]
    fn response_is_attached_to_request_transport() {
        let transport = MemoryTransport::new();
        let mut handler = ServerHandler::new(|request: IncomingMessage, mut response: ServerResponse<MemoryTransport>| {
            assert_eq!(request.url(), Some("/ping"));
            response.end(Some(Bytes::from_static(b"pong")));
        });

        let (flow, _) = flow_channel();
        let (_sender, receiver) = body_channel(flow, 1024);
        let role = IncomingRole::Request { method: Method::GET, url: "/ping".to_string() };
        let request = IncomingMessage::new(role, Version::HTTP_11, true, false, receiver);

        assert_eq!(handler.on_message(request, Some(&transport)), BodyDecision::Deliver);
        assert_eq!(transport.output(), Bytes::from_static(b"HTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\npong"));
    }
}
