//! Body framing for both directions.
//!
//! ## Decoders
//! - [`PayloadDecoder`]: picks [`ChunkedDecoder`](chunked_decoder::ChunkedDecoder),
//!   [`LengthDecoder`](length_decoder::LengthDecoder) or read-until-close from the head
//!
//! ## Encoders
//! - [`PayloadEncoder`]: chunked, fixed length, identity or no body, chosen from
//!   the framing headers of a sealed head

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
