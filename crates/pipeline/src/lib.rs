//! A per-connection HTTP/1.x message streaming pipeline.
//!
//! This crate turns a raw, arbitrarily fragmented byte connection into discrete
//! inbound messages (requests on a server, responses on a client) whose bodies
//! can be consumed at the application's own pace, and turns application writes
//! back into ordered, correctly framed bytes on the same connection.
//!
//! # Features
//!
//! - Streaming bodies with backpressure: a paused or full inbound body pauses
//!   reading from the connection, without losing or duplicating bytes
//! - Outbound messages that accept writes before a connection exists and
//!   serialize their head exactly once
//! - Pipelined messages, keep-alive, chunked transfer encoding
//! - Header blocks flushed in batches for very large heads
//! - Transport agnostic core, with a tokio driver for `AsyncRead`/`AsyncWrite`
//!   pairs and an in-memory transport for tests
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use micro_pipeline::PipelineConfig;
//! use micro_pipeline::connection::{IoDriver, IoTransport, TransportBinding};
//! use micro_pipeline::handler::ServerHandler;
//! use micro_pipeline::protocol::{IncomingMessage, ServerResponse};
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn, Level};
//! use tracing_subscriber::FmtSubscriber;
//!
//! #[tokio::main]
//! async fn main() {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
//!
//!     info!(port = 8080, "start listening");
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     let config = PipelineConfig::default();
//!     loop {
//!         let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             let handler = ServerHandler::new(hello_world);
//!             let driver = IoDriver::new(reader, writer, TransportBinding::server(handler, &config), &config);
//!             match driver.run().await {
//!                 Ok(()) => info!("finished process, connection shutdown"),
//!                 Err(e) => error!(cause = %e, "connection shutdown with error"),
//!             }
//!         });
//!     }
//! }
//!
//! fn hello_world(request: IncomingMessage, mut response: ServerResponse<IoTransport>) {
//!     info!(url = request.url(), "request received");
//!
//!     let body = "Hello World!\r\n";
//!     if let Err(e) = response.set_header(http::header::CONTENT_LENGTH, body.len()) {
//!         warn!(cause = %e, "can't set content-length");
//!     }
//!     response.end(Some(Bytes::from_static(body.as_bytes())));
//! }
//! ```
//!
//! # Architecture
//!
//! - [`codec`]: the tokenizer and the head and body encoders/decoders
//! - [`protocol`]: message types, header assembly, inbound and outbound messages, errors
//! - [`connection`]: the transport abstraction, parser adapter, transport binding and drivers
//! - [`handler`]: receivers of parsed messages, including the server and client roles
//!
//! Bytes flow from the transport through
//! [`TransportBinding::on_data`](connection::TransportBinding::on_data) into the
//! [`HttpTokenizer`](codec::HttpTokenizer), whose events the
//! [`ParserAdapter`](connection::ParserAdapter) turns into
//! [`IncomingMessage`](protocol::IncomingMessage)s. Application writes go
//! through an [`OutgoingMessage`](protocol::OutgoingMessage) straight to the
//! transport once one is attached.
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 only
//! - No TLS, connection pooling or redirects
//! - Protocol upgrades are reported, never performed

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;

mod config;
pub use config::PipelineConfig;

mod utils;
pub(crate) use utils::ensure;
