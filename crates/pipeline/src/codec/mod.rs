//! Wire format handling.
//!
//! The [`HttpTokenizer`] turns raw bytes into [`TokenizerEvents`] callbacks. It
//! combines the [`HeaderDecoder`] for heads with a [`PayloadDecoder`] per body,
//! both implemented as `tokio_util` decoders over one `BytesMut` buffer. The
//! outbound side uses the [`HeaderEncoder`] and [`PayloadEncoder`].

mod body;
mod header;
mod tokenizer;

pub use body::PayloadDecoder;
pub use body::PayloadEncoder;
pub use header::HeaderDecoder;
pub use header::HeaderEncoder;
pub use header::ParsedHead;
pub use tokenizer::HttpTokenizer;
pub use tokenizer::Tokenizer;
pub use tokenizer::TokenizerEvents;
