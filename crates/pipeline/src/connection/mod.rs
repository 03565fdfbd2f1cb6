//! Connection level plumbing.
//!
//! - [`Transport`]: the duplex byte connection as the pipeline sees it, and
//!   the [`TransportEvent`]s it reports
//! - [`ParserAdapter`]: receives tokenizer events and builds inbound messages
//! - [`TransportBinding`]: ties one transport to a tokenizer, an adapter and
//!   outbound messages, and owns read side flow control
//! - [`IoDriver`] / [`IoTransport`]: runs a binding over tokio I/O halves
//! - [`MemoryTransport`]: records what the pipeline does to a connection

mod binding;
mod io;
mod memory;
mod parser_adapter;
mod transport;

pub use binding::TransportBinding;
pub use io::IoDriver;
pub use io::IoTransport;
pub use memory::MemoryTransport;
pub use parser_adapter::ParserAdapter;
pub use transport::Transport;
pub use transport::TransportEvent;
