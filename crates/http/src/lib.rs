//! The asynchronous HTTP/1.1 engine that `tandem` handlers run on.
//!
//! Each request is handed to a [`handler::Handler`] as a [`ctx::RequestCtx`]:
//! the parsed head with its raw request-target, the fully buffered body and the
//! connection it came from. The handler fills in a native response on the same
//! context, either
//!
//! - a complete body ([`ctx::RequestCtx::set_body`]),
//! - a body stream callback writing chunks to a [`ctx::BodySink`]
//!   ([`ctx::RequestCtx::set_body_stream_callback`]), sent chunked with every
//!   chunk flushed as it arrives, or
//! - a hijack ([`ctx::RequestCtx::hijack_connection`]), which hands the raw
//!   connection to the handler and keeps the connection task alive until it is
//!   released.
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use tandem_http::ctx::RequestCtx;
//! use tandem_http::handler::make_handler;
//! use tandem_http::server::Server;
//!
//! #[tokio::main]
//! async fn main() {
//!     let handler = make_handler(|ctx: &mut RequestCtx| {
//!         ctx.set_body(Bytes::from_static(b"Hello World!\r\n"));
//!         std::future::ready(())
//!     });
//!
//!     let server = Server::builder().address("127.0.0.1:8080").unwrap().build().unwrap();
//!     server.start(handler).await.unwrap();
//! }
//! ```
//!
//! # Modules
//!
//! - [`codec`]: request decoding and response encoding
//! - [`connection`]: the per-connection request loop
//! - [`ctx`]: native request context, body sink, hijacked connection
//! - [`handler`]: the handler trait
//! - [`protocol`]: protocol types and errors
//! - [`server`]: TCP accept loop
//!
//! # Limitations
//!
//! - HTTP/1.1 only
//! - No TLS termination; a listener that terminates TLS can report it through
//!   [`ctx::ConnInfo`]
//! - Maximum header size: 8KB, maximum number of headers: 64
//! - Request bodies are buffered in full, up to a configurable limit

pub mod codec;
pub mod connection;
pub mod ctx;
pub mod handler;
pub mod protocol;
pub mod server;

mod utils;
pub(crate) use utils::ensure;
