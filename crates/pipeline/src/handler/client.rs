use http::Method;
use tracing::{debug, warn};

use crate::connection::Transport;
use crate::handler::MessageHandler;
use crate::protocol::{BodyDecision, IncomingMessage};

/// Delivers the response to one [`ClientRequest`](crate::protocol::ClientRequest).
///
/// The response to a `HEAD` request is parsed without a body. A second
/// response on the same connection is a protocol violation and destroys
/// the transport.
#[derive(Debug)]
pub struct ResponseHandler<F> {
    method: Method,
    on_response: F,
    responded: bool,
}

impl<F> ResponseHandler<F> {
    pub(crate) fn new(method: Method, on_response: F) -> Self {
        Self { method, on_response, responded: false }
    }

    pub fn has_responded(&self) -> bool {
        self.responded
    }
}

impl<T, F> MessageHandler<T> for ResponseHandler<F>
where
    T: Transport,
    F: FnMut(IncomingMessage),
{
    fn on_message(&mut self, response: IncomingMessage, transport: Option<&T>) -> BodyDecision {
        if self.responded {
            warn!(status = ?response.status(), "server sent a second response, destroying connection");
            if let Some(transport) = transport {
                transport.destroy();
            }
            return BodyDecision::SkipBody;
        }

        self.responded = true;
        debug!(status = ?response.status(), "response received");
        (self.on_response)(response);

        BodyDecision::from(self.method == Method::HEAD)
    }
}
