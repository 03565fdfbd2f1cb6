//! Message level building blocks.
//!
//! The protocol module holds everything that describes one HTTP message,
//! independent of how bytes reach the connection:
//!
//! - **Heads** ([`head`]): [`HeadInfo`] reported by the tokenizer, the
//!   [`IncomingRole`] of a received message and the [`StartLine`] of one to send
//! - **Header assembly** ([`HeaderAccumulator`]): joins header fields flushed in
//!   several batches
//! - **Inbound** ([`IncomingMessage`]): resolved head plus a pull based,
//!   backpressure aware body ([`body`])
//! - **Outbound** ([`OutgoingMessage`]): push based sink that queues until a
//!   transport is attached, with the role specific [`ServerResponse`] and
//!   [`ClientRequest`] on top
//! - **Errors** ([`HttpError`] and its sources)

mod message;
pub use message::BodyDecision;
pub use message::MessageKind;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod head;
pub use head::HeadInfo;
pub use head::HeadLine;
pub use head::HeaderFragment;
pub use head::IncomingRole;
pub use head::StartLine;

mod header_accumulator;
pub use header_accumulator::HeaderAccumulator;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
pub use error::TransportError;
pub use error::UsageError;

pub mod body;

mod incoming;
pub use incoming::IncomingMessage;

mod outgoing;
pub use outgoing::HeadBuilder;
pub use outgoing::HeaderBlock;
pub use outgoing::OutgoingMessage;
pub use outgoing::SealedHead;

mod request;
pub use request::ClientRequest;
pub use request::RequestOptions;

mod response;
pub use response::ServerResponse;
