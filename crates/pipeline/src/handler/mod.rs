//! Receivers of parsed messages.
//!
//! The parser adapter hands every received message to a [`MessageHandler`]
//! as soon as its head is complete, before any body byte arrives. The handler
//! answers with a [`BodyDecision`] telling the tokenizer whether a body follows.
//!
//! Besides plain closures (see [`make_handler`]) two handlers implement the
//! usual roles: [`ServerHandler`] pairs every request with a
//! [`ServerResponse`](crate::protocol::ServerResponse), and [`ResponseHandler`]
//! routes the answer to a [`ClientRequest`](crate::protocol::ClientRequest).

mod client;
mod server;

pub use client::ResponseHandler;
pub use server::ServerHandler;

use crate::protocol::{BodyDecision, IncomingMessage};

pub trait MessageHandler<T> {
    /// Called once per message with its resolved head; `transport` is the
    /// connection the message arrived on.
    fn on_message(&mut self, message: IncomingMessage, transport: Option<&T>) -> BodyDecision;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<T, F> MessageHandler<T> for HandlerFn<F>
where
    F: FnMut(IncomingMessage, Option<&T>) -> BodyDecision,
{
    fn on_message(&mut self, message: IncomingMessage, transport: Option<&T>) -> BodyDecision {
        (self.f)(message, transport)
    }
}

pub fn make_handler<F>(f: F) -> HandlerFn<F> {
    HandlerFn { f }
}
