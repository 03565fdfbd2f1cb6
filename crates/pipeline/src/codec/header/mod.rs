//! Message head encoding and decoding.
//!
//! - [`HeaderDecoder`]: parses request or response heads with `httparse`,
//!   enforces the size and count limits and resolves body framing
//! - [`HeaderEncoder`]: serializes an outbound head into its header block

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub use header_decoder::ParsedHead;
pub use header_encoder::HeaderEncoder;
