//! Runs conventional, blocking HTTP handlers on the asynchronous `tandem-http`
//! engine.
//!
//! A [`SyncHandler`] gets a [`Request`] with its body already buffered and a
//! [`ResponseBridge`] to write to. It runs on a blocking thread and may:
//!
//! - write and return: the response is sent with a fixed length
//! - [`flush`](std::io::Write::flush): the head and everything written so far go
//!   out, further writes stream through to the peer as they happen
//! - [`hijack`](ResponseBridge::hijack): take the raw connection over
//! - panic: the panic is raised again on the engine task
//!
//! Whatever it does first decides the response; there is exactly one such
//! decision per request. A missing `Content-Type` is sniffed from the bytes
//! buffered before that decision; `Content-Length` is always left to the engine.
//!
//! # Modules
//!
//! - [`Adaptor`]: the engine [`Handler`](tandem_http::handler::Handler) wiring it all up
//! - [`project_request`]: native request context to [`Request`]
//! - [`ResponseBridge`]: the per-request response state machine
//! - [`HandlerRunner`]: runs the handler and acts on the mode it settles into
//! - [`pool`]: reusable response storage
//! - [`sniff`]: content type sniffing

mod adaptor;
mod bridge;
mod config;
mod error;
mod latch;
mod pipe;
pub mod pool;
mod request;
mod runner;
pub mod sniff;

pub use adaptor::Adaptor;
pub use bridge::{Hijacked, ResponseBridge};
pub use config::{AdaptorConfig, AdaptorConfigBuilder, DEFAULT_INITIAL_BODY_CAPACITY, DEFAULT_STREAM_CHUNK_SIZE};
pub use error::{HijackError, ProjectionError};
pub use request::{Request, SyncHandler, project_request};
pub use runner::{HandlerRunner, run_handler};
pub use tandem_http::ctx::TlsInfo;
