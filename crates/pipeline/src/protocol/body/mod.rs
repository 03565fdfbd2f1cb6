//! Inbound body streaming.
//!
//! A body is split in two halves sharing one queue:
//!
//! - [`BodySender`]: the producer, owned by the parser adapter while the body
//!   is being parsed
//! - [`BodyReceiver`]: the consumer, owned by the [`IncomingMessage`](crate::protocol::IncomingMessage)
//!
//! Consumption state (pause, resume, high-water mark, timeout requests) is
//! reported to the transport binding as [`FlowSignal`]s, so the binding stays
//! the only code that touches the transport's read side.

mod body_channel;

pub use body_channel::BodyReceiver;
pub use body_channel::FlowReceiver;
pub use body_channel::FlowSignal;

pub(crate) use body_channel::BodySender;
pub(crate) use body_channel::FlowSender;
pub(crate) use body_channel::body_channel;
pub(crate) use body_channel::flow_channel;
